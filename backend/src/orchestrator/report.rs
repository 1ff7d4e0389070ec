//! Run reports
//!
//! Serializable summaries of a finished (or cancelled) run. Indicators are
//! reduced to snapshots and a fixed set of quantiles; the raw indicators
//! stay in [`RunStatistics`](crate::orchestrator::RunStatistics).

use crate::orchestrator::compile::{CompiledKind, CompiledModel};
use crate::orchestrator::engine::{Simulation, TerminationReason};
use crate::orchestrator::stats::{ContinuousStatistics, RunStatistics, StationStatistics};
use crate::statistics::{
    DataIndicator, Quantile, ShortDistribution, Snapshot, TimeIndicator, REPORT_QUANTILES,
};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot plus report quantiles of one indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorReport {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub quantiles: Vec<Quantile>,
    /// Some observations were above the histogram cap
    pub hit_max: bool,
}

impl IndicatorReport {
    pub fn from_data(indicator: &DataIndicator) -> Self {
        Self {
            snapshot: indicator.snapshot(),
            quantiles: REPORT_QUANTILES
                .iter()
                .map(|&p| indicator.quantile(p))
                .collect(),
            hit_max: indicator.hit_max(),
        }
    }

    pub fn from_time(indicator: &TimeIndicator) -> Self {
        Self {
            snapshot: indicator.snapshot(),
            quantiles: REPORT_QUANTILES
                .iter()
                .map(|&p| indicator.quantile(p))
                .collect(),
            hit_max: indicator.hit_max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationCount {
    pub destination: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationReport {
    pub name: String,
    pub kind: String,
    pub arrivals: u64,
    pub waiting_time: IndicatorReport,
    pub service_time: IndicatorReport,
    pub residence_time: IndicatorReport,
    pub queue_length: IndicatorReport,
    pub clients: IndicatorReport,
    /// Time share of queue lengths 0..=k
    pub queue_distribution: ShortDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<Vec<DestinationCount>>,
    pub evaluation_errors: u64,
}

impl StationReport {
    pub fn build(model: &CompiledModel, stats: &StationStatistics, distribution_states: usize) -> Self {
        let routing = stats.routing.as_ref().map(|counts| {
            let destinations = model
                .stations
                .iter()
                .find(|s| s.name == stats.name)
                .and_then(|s| match &s.kind {
                    CompiledKind::Decide { destinations, .. } => Some(destinations.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            counts
                .iter()
                .enumerate()
                .map(|(i, &count)| DestinationCount {
                    destination: destinations
                        .get(i)
                        .and_then(|&d| model.station(d))
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| format!("#{}", i)),
                    count,
                })
                .collect()
        });

        Self {
            name: stats.name.clone(),
            kind: stats.kind.to_string(),
            arrivals: stats.arrivals,
            waiting_time: IndicatorReport::from_data(&stats.waiting_time),
            service_time: IndicatorReport::from_data(&stats.service_time),
            residence_time: IndicatorReport::from_data(&stats.residence_time),
            queue_length: IndicatorReport::from_time(&stats.queue_length),
            clients: IndicatorReport::from_time(&stats.clients),
            queue_distribution: stats.queue_length.short_distribution(distribution_states),
            routing,
            evaluation_errors: stats.evaluation_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuousReport {
    pub name: String,
    pub final_value: f64,
    pub level: IndicatorReport,
    pub notifications: u64,
    pub flow_in: f64,
    pub flow_out: f64,
}

impl ContinuousReport {
    pub fn build(stats: &ContinuousStatistics) -> Self {
        Self {
            name: stats.name.clone(),
            final_value: stats.final_value,
            level: IndicatorReport::from_time(&stats.level),
            notifications: stats.notifications,
            flow_in: stats.flow_in,
            flow_out: stats.flow_out,
        }
    }
}

/// Statistics part of a report, shared by single runs and pooled
/// replications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub clients_created: u64,
    pub clients_disposed: u64,
    pub time_in_system: IndicatorReport,
    /// Clients in the system
    pub wip: IndicatorReport,
    pub stations: Vec<StationReport>,
    pub continuous: Vec<ContinuousReport>,
    pub evaluation_errors: u64,
}

impl StatisticsReport {
    pub fn build(model: &CompiledModel, stats: &RunStatistics) -> Self {
        let states = model.statistics.distribution_states;
        Self {
            clients_created: stats.clients_created,
            clients_disposed: stats.clients_disposed,
            time_in_system: IndicatorReport::from_data(&stats.time_in_system),
            wip: IndicatorReport::from_time(&stats.wip),
            stations: stats
                .stations
                .iter()
                .map(|s| StationReport::build(model, s, states))
                .collect(),
            continuous: stats.continuous.iter().map(ContinuousReport::build).collect(),
            evaluation_errors: stats.evaluation_errors(),
        }
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub model_name: String,
    pub model_hash: String,
    pub seed: u64,
    pub termination: TerminationReason,
    /// Simulated time at which the run stopped
    pub end_time: f64,
    pub events_processed: u64,
    pub clients_created: u64,
    pub clients_disposed: u64,
    /// Clients still in the system at the end
    pub clients_in_system: usize,
    pub statistics: StatisticsReport,
    /// Final values of the global numeric variables
    pub variables: BTreeMap<String, f64>,
    /// Final values of the global text variables
    pub texts: BTreeMap<String, String>,
    pub evaluation_errors: u64,
}

impl RunReport {
    /// Summarise a simulation in its current state
    ///
    /// A run that has not terminated reports `NoMoreEvents` only when its
    /// event list is empty; use it on finished runs.
    pub fn build(sim: &Simulation) -> Self {
        let model = sim.model();
        let stats = sim.statistics();
        let statistics = StatisticsReport::build(model, stats);
        Self {
            run_id: Uuid::new_v4().to_string(),
            model_name: model.name.clone(),
            model_hash: model.model_hash.clone(),
            seed: sim.seed(),
            termination: sim
                .termination()
                .cloned()
                .unwrap_or(TerminationReason::NoMoreEvents),
            end_time: sim.now(),
            events_processed: sim.events_processed(),
            clients_created: stats.clients_created,
            clients_disposed: stats.clients_disposed,
            clients_in_system: sim.state().num_clients(),
            evaluation_errors: statistics.evaluation_errors,
            statistics,
            variables: sim.variables().numbers().clone(),
            texts: sim.variables().texts().clone(),
        }
    }

    /// Station report by name
    pub fn station(&self, name: &str) -> Option<&StationReport> {
        self.statistics
            .stations
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
