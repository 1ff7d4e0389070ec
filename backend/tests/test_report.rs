//! Run report tests
//!
//! JSON shape, identity fields and per-station summaries.

use queuesim_core_rs::orchestrator::{model_hash, ModelConfig, RunReport, Simulation};
use serde_json::{json, Value};

fn model() -> ModelConfig {
    serde_json::from_value(json!({
        "name": "bank",
        "seed": 12,
        "variables": {"numbers": {"served": 0.0}, "texts": {"branch": "north"}},
        "stations": [
            {"name": "Door", "type": "source", "next": "Split",
             "arrivals": {"client_type": "a", "max_arrivals": 6,
                          "inter_arrival": {"type": "fixed", "value": 1.0}}},
            {"name": "Split", "type": "decide", "destinations": ["Teller", "Atm"],
             "policy": {"mode": "sequence", "multiplicity": [2, 1]}},
            {"name": "Teller", "type": "process", "next": "Count",
             "service": {"type": "fixed", "value": 3.0}},
            {"name": "Atm", "type": "delay", "next": "Count",
             "delay": {"type": "fixed", "value": 1.0}},
            {"name": "Count", "type": "assign", "next": "Exit",
             "assignments": [{"target": {"type": "variable", "name": "served"},
                              "expression": "served + 1"}]},
            {"name": "Exit", "type": "dispose"}
        ],
        "limits": {"end_time": 100.0}
    }))
    .unwrap()
}

fn run() -> RunReport {
    Simulation::from_config(&model()).unwrap().run().unwrap()
}

fn as_json(report: &RunReport) -> Value {
    serde_json::from_str(&report.to_json().unwrap()).unwrap()
}

#[test]
fn test_report_identity() {
    let report = run();
    assert_eq!(report.model_name, "bank");
    assert_eq!(report.seed, 12);
    assert_eq!(report.model_hash.len(), 64);
    assert!(report.model_hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(report.model_hash, model_hash(&model()));

    // Same model, new run id
    let again = run();
    assert_eq!(again.model_hash, report.model_hash);
    assert_ne!(again.run_id, report.run_id);
}

#[test]
fn test_report_json_shape() {
    let report = run();
    let value = as_json(&report);

    assert_eq!(value["termination"], json!({"reason": "no_more_events"}));
    assert_eq!(value["clients_created"], 6);
    assert_eq!(value["variables"]["served"], 6.0);
    assert_eq!(value["texts"]["branch"], "north");

    let stations = value["statistics"]["stations"].as_array().unwrap();
    assert_eq!(stations.len(), 6);
    assert_eq!(stations[2]["kind"], "process");
    // Mean, quantiles and the overflow flag sit side by side
    let waiting = &stations[2]["waiting_time"];
    assert!(waiting["mean"].is_number());
    assert!(waiting["quantiles"].is_array());
    assert_eq!(waiting["hit_max"], false);
    // Only decide stations carry routing counts
    assert!(stations[2].get("routing").is_none());
    assert!(stations[1]["routing"].is_array());
}

#[test]
fn test_end_time_termination_serialises_as_tag() {
    let mut config = model();
    config.limits.end_time = Some(2.5);
    let report = Simulation::from_config(&config).unwrap().run().unwrap();
    assert_eq!(as_json(&report)["termination"], json!({"reason": "end_time"}));
    assert_eq!(report.end_time, 2.5);
}

#[test]
fn test_sequence_routing_names_destinations() {
    let report = run();
    let routing = report.station("split").unwrap().routing.clone().unwrap();
    let pairs: Vec<(String, u64)> = routing
        .into_iter()
        .map(|c| (c.destination, c.count))
        .collect();
    assert_eq!(pairs, vec![("Teller".into(), 4), ("Atm".into(), 2)]);
    assert!(report.station("Nowhere").is_none());
}

#[test]
fn test_queue_distribution_shares() {
    let report = run();
    let teller = report.station("Teller").unwrap();
    let total: f64 = teller.queue_distribution.parts.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(!teller.queue_distribution.truncated);
    assert!(teller.queue_length.snapshot.max >= 1.0);
}
