//! Replication tests
//!
//! Parallel runs must be reproducible, independent and poolable.

use queuesim_core_rs::orchestrator::{
    compile, run_replications, CancelToken, CompiledModel, ModelConfig, Simulation,
    TerminationReason,
};
use queuesim_core_rs::RngManager;
use serde_json::json;
use std::sync::Arc;

fn model(end_time: f64) -> Arc<CompiledModel> {
    let config: ModelConfig = serde_json::from_value(json!({
        "name": "shop",
        "stations": [
            {"name": "Door", "type": "source", "next": "Till",
             "arrivals": {"client_type": "a",
                          "inter_arrival": {"type": "exponential", "mean": 1.0}}},
            {"name": "Till", "type": "process", "servers": 2, "next": "Exit",
             "service": {"type": "exponential", "mean": 1.6}},
            {"name": "Exit", "type": "dispose"}
        ],
        "limits": {"end_time": end_time}
    }))
    .unwrap();
    Arc::new(compile(&config).unwrap())
}

#[test]
fn test_reports_in_index_order() {
    let summary = run_replications(model(200.0), 8, 31, &CancelToken::new());

    assert_eq!(summary.replications, 8);
    assert_eq!(summary.reports.len(), 8);
    assert!(summary.failures.is_empty());
    for (i, report) in summary.reports.iter().enumerate() {
        assert_eq!(report.seed, RngManager::replication_seed(31, i as u64));
        assert_eq!(report.termination, TerminationReason::EndTime);
    }
}

#[test]
fn test_batch_is_reproducible() {
    let first = run_replications(model(200.0), 6, 5, &CancelToken::new());
    let second = run_replications(model(200.0), 6, 5, &CancelToken::new());

    let stats = |s: &queuesim_core_rs::orchestrator::ReplicationSummary| {
        s.reports
            .iter()
            .map(|r| r.statistics.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(stats(&first), stats(&second));
    assert_eq!(first.pooled, second.pooled);
}

#[test]
fn test_replication_matches_single_run_with_same_seed() {
    let compiled = model(150.0);
    let summary = run_replications(Arc::clone(&compiled), 3, 99, &CancelToken::new());

    let seed = RngManager::replication_seed(99, 2);
    let single = Simulation::new(compiled, seed).unwrap().run().unwrap();
    assert_eq!(summary.reports[2].statistics, single.statistics);
}

#[test]
fn test_replications_differ() {
    let summary = run_replications(model(200.0), 2, 1, &CancelToken::new());
    assert_ne!(
        summary.reports[0].statistics,
        summary.reports[1].statistics
    );
}

#[test]
fn test_pooled_counts_are_sums() {
    let summary = run_replications(model(100.0), 4, 17, &CancelToken::new());
    let pooled = summary.pooled.as_ref().unwrap();

    let created: u64 = summary.reports.iter().map(|r| r.clients_created).sum();
    let disposed: u64 = summary.reports.iter().map(|r| r.clients_disposed).sum();
    assert_eq!(pooled.clients_created, created);
    assert_eq!(pooled.clients_disposed, disposed);

    let served: u64 = summary
        .reports
        .iter()
        .map(|r| r.station("Till").unwrap().service_time.snapshot.count)
        .sum();
    assert_eq!(pooled.stations[1].service_time.snapshot.count, served);
}

#[test]
fn test_cancelled_batch_stops_every_run() {
    let token = CancelToken::new();
    token.cancel();
    let summary = run_replications(model(1.0e6), 4, 3, &token);

    assert_eq!(summary.reports.len(), 4);
    for report in &summary.reports {
        assert_eq!(report.termination, TerminationReason::Cancelled);
        assert_eq!(report.events_processed, 0);
    }
}

#[test]
fn test_zero_replications() {
    let summary = run_replications(model(10.0), 0, 1, &CancelToken::new());
    assert!(summary.reports.is_empty());
    assert!(summary.pooled.is_none());
}
