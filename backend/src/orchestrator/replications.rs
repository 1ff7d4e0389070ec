//! Independent replications
//!
//! Runs the same compiled model several times with derived seeds on the
//! rayon thread pool. Each replication owns its state; the model is shared
//! read-only. A fatal error ends only the replication it happened in.

use crate::orchestrator::compile::CompiledModel;
use crate::orchestrator::engine::{CancelToken, Simulation};
use crate::orchestrator::report::{RunReport, StatisticsReport};
use crate::orchestrator::stats::RunStatistics;
use crate::rng::RngManager;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicationFailure {
    pub index: usize,
    pub seed: u64,
    pub message: String,
}

/// Outcome of a batch of replications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicationSummary {
    pub model_name: String,
    pub model_hash: String,
    pub base_seed: u64,
    pub replications: usize,
    /// Reports of the successful replications, in index order
    pub reports: Vec<RunReport>,
    pub failures: Vec<ReplicationFailure>,
    /// Indicators of all successful replications merged together
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooled: Option<StatisticsReport>,
}

/// Run `count` replications of `model`
///
/// Replication `i` uses `RngManager::replication_seed(base_seed, i)`, so a
/// batch is reproducible regardless of thread scheduling.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::orchestrator::{compile, run_replications, CancelToken, ModelConfig};
/// use std::sync::Arc;
///
/// let config: ModelConfig = serde_json::from_str(r#"{
///     "stations": [
///         {"name": "In", "type": "source", "next": "Out",
///          "arrivals": {"client_type": "a", "inter_arrival": {"type": "exponential", "mean": 1.0}}},
///         {"name": "Out", "type": "dispose"}
///     ],
///     "limits": {"end_time": 50.0}
/// }"#).unwrap();
/// let model = Arc::new(compile(&config).unwrap());
///
/// let summary = run_replications(model, 4, 11, &CancelToken::new());
/// assert_eq!(summary.reports.len(), 4);
/// assert!(summary.failures.is_empty());
/// ```
pub fn run_replications(
    model: Arc<CompiledModel>,
    count: usize,
    base_seed: u64,
    cancel: &CancelToken,
) -> ReplicationSummary {
    info!(model = %model.name, replications = count, base_seed, "replications started");

    let outcomes: Vec<Result<(RunReport, RunStatistics), ReplicationFailure>> = (0..count)
        .into_par_iter()
        .map(|index| {
            let seed = RngManager::replication_seed(base_seed, index as u64);
            let failure = |message: String| ReplicationFailure {
                index,
                seed,
                message,
            };
            let mut sim = Simulation::new(Arc::clone(&model), seed)
                .map_err(|e| failure(e.to_string()))?
                .with_cancel_token(cancel.clone());
            let report = sim.run().map_err(|e| failure(e.to_string()))?;
            Ok((report, sim.into_statistics()))
        })
        .collect();

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    let mut pooled: Option<RunStatistics> = None;
    for outcome in outcomes {
        match outcome {
            Ok((report, stats)) => {
                match pooled.as_mut() {
                    Some(total) => total.merge(&stats),
                    None => pooled = Some(stats),
                }
                reports.push(report);
            }
            Err(failure) => {
                warn!(
                    replication = failure.index,
                    seed = failure.seed,
                    error = %failure.message,
                    "replication failed"
                );
                failures.push(failure);
            }
        }
    }

    info!(
        model = %model.name,
        succeeded = reports.len(),
        failed = failures.len(),
        "replications finished"
    );

    ReplicationSummary {
        model_name: model.name.clone(),
        model_hash: model.model_hash.clone(),
        base_seed,
        replications: count,
        reports,
        failures,
        pooled: pooled.map(|stats| StatisticsReport::build(&model, &stats)),
    }
}
