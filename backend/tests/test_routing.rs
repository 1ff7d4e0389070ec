//! Routing policy tests
//!
//! Each policy is compiled from its configuration and bound to a router
//! the way decide stations are built.

use queuesim_core_rs::expression::{EmptySystem, EvalContext, KnownSymbols};
use queuesim_core_rs::routing::{
    compile_policy, LoadView, Lookahead, NoLoad, Router, RoutingError, RoutingPolicyConfig,
    TieBreak,
};
use queuesim_core_rs::{Client, RngManager, StationId, VariableEnvironment};
use std::collections::HashMap;

// ============================================================================
// Test Helpers
// ============================================================================

fn router(config: RoutingPolicyConfig, n: usize, symbols: &KnownSymbols) -> Router {
    let policy = compile_policy(&config, n, symbols, true).unwrap();
    Router::new((0..n).map(StationId).collect(), policy, TieBreak::LowestIndex).unwrap()
}

fn decide(
    router: &mut Router,
    client: &Client,
    variables: &VariableEnvironment,
    load: &dyn LoadView,
    rng: &mut RngManager,
) -> usize {
    let ctx = EvalContext::new(variables, &EmptySystem, 0.0).with_client(client);
    router.decide(client, &ctx, load, rng).unwrap()
}

fn decide_simple(router: &mut Router, client: &Client) -> usize {
    let variables = VariableEnvironment::new();
    let mut rng = RngManager::new(1);
    decide(router, client, &variables, &NoLoad, &mut rng)
}

/// Fixed station loads; `forward` maps pass-through stations to their successor
#[derive(Default)]
struct Loads {
    queue: HashMap<usize, usize>,
    clients: HashMap<usize, usize>,
    forward: HashMap<usize, usize>,
}

impl LoadView for Loads {
    fn queue_length(&self, station: StationId) -> usize {
        self.queue.get(&station.0).copied().unwrap_or(0)
    }

    fn client_count(&self, station: StationId) -> usize {
        self.clients.get(&station.0).copied().unwrap_or(0)
    }

    fn pass_through_successor(&self, station: StationId) -> Option<StationId> {
        self.forward.get(&station.0).map(|&s| StationId(s))
    }
}

// ============================================================================
// Probabilistic
// ============================================================================

#[test]
fn test_probabilistic_converges_to_rates() {
    let mut router = router(
        RoutingPolicyConfig::Probabilistic {
            rates: vec![1.0, 1.0, 2.0],
        },
        3,
        &KnownSymbols::default(),
    );
    let client = Client::new(1, "a", 0.0);
    let variables = VariableEnvironment::new();
    let mut rng = RngManager::new(20240611);

    let trials = 10_000;
    let mut counts = [0usize; 3];
    for _ in 0..trials {
        counts[decide(&mut router, &client, &variables, &NoLoad, &mut rng)] += 1;
    }

    // Index 2 takes half of the clients, within 5%
    let share = counts[2] as f64 / trials as f64;
    assert!((share - 0.5).abs() < 0.025, "share {} from {:?}", share, counts);

    // Chi-squared with 2 degrees of freedom, 0.1% critical value
    let expected = [0.25, 0.25, 0.5].map(|p| p * trials as f64);
    let chi2: f64 = counts
        .iter()
        .zip(expected)
        .map(|(&o, e)| (o as f64 - e).powi(2) / e)
        .sum();
    assert!(chi2 < 13.82, "chi-squared {} for {:?}", chi2, counts);

    assert_eq!(router.selections().iter().sum::<u64>(), trials as u64);
}

#[test]
fn test_probabilistic_validation() {
    let symbols = KnownSymbols::default();

    let negative = RoutingPolicyConfig::Probabilistic {
        rates: vec![1.0, -1.0],
    };
    assert_eq!(
        compile_policy(&negative, 2, &symbols, true).unwrap_err(),
        vec![RoutingError::InvalidRate {
            index: 1,
            rate: -1.0
        }]
    );
    // Lenient mode clamps to 0
    assert!(compile_policy(&negative, 2, &symbols, false).is_ok());

    let too_many = RoutingPolicyConfig::Probabilistic {
        rates: vec![1.0, 1.0, 1.0],
    };
    assert!(matches!(
        compile_policy(&too_many, 2, &symbols, true).unwrap_err()[0],
        RoutingError::TooManyEntries { found: 3, .. }
    ));
}

// ============================================================================
// Conditional
// ============================================================================

#[test]
fn test_conditional_first_true_wins() {
    let symbols = KnownSymbols::new(["x"]);
    let mut router = router(
        RoutingPolicyConfig::Conditional {
            conditions: vec!["x > 10".into(), "x > 0".into()],
        },
        3,
        &symbols,
    );
    let client = Client::new(1, "a", 0.0);
    let mut rng = RngManager::new(1);
    let mut variables = VariableEnvironment::new();

    variables.set_number("x", 5.0);
    assert_eq!(decide(&mut router, &client, &variables, &NoLoad, &mut rng), 1);

    variables.set_number("x", 50.0);
    assert_eq!(decide(&mut router, &client, &variables, &NoLoad, &mut rng), 0);

    // None true: implicit else
    variables.set_number("x", -3.0);
    assert_eq!(decide(&mut router, &client, &variables, &NoLoad, &mut rng), 2);
}

#[test]
fn test_conditional_error_is_false_and_counted() {
    let symbols = KnownSymbols::new(["x"]);
    let mut router = router(
        RoutingPolicyConfig::Conditional {
            conditions: vec!["1 / x > 1".into()],
        },
        2,
        &symbols,
    );
    let client = Client::new(1, "a", 0.0);
    let mut rng = RngManager::new(1);
    let mut variables = VariableEnvironment::new();
    variables.set_number("x", 0.0);

    assert_eq!(decide(&mut router, &client, &variables, &NoLoad, &mut rng), 1);
    assert_eq!(router.evaluation_errors(), 1);
}

#[test]
fn test_conditional_reports_error_positions() {
    let symbols = KnownSymbols::new(["x"]);
    let config = RoutingPolicyConfig::Conditional {
        conditions: vec!["x > 1".into(), "x > y".into()],
    };
    let errors = compile_policy(&config, 3, &symbols, true).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RoutingError::InvalidCondition { index: 1, .. }));
    assert_eq!(errors[0].position(), Some(4));
}

// ============================================================================
// Client type, sequence, key/value
// ============================================================================

#[test]
fn test_by_client_type() {
    let mut router = router(
        RoutingPolicyConfig::ByClientType {
            client_types: vec![vec!["gold".into()], vec!["silver".into(), "bronze".into()]],
        },
        3,
        &KnownSymbols::default(),
    );
    assert_eq!(decide_simple(&mut router, &Client::new(1, "bronze", 0.0)), 1);
    assert_eq!(decide_simple(&mut router, &Client::new(2, "gold", 0.0)), 0);
    // Case-sensitive
    assert_eq!(decide_simple(&mut router, &Client::new(3, "Gold", 0.0)), 2);
}

#[test]
fn test_sequence_honours_multiplicity() {
    let mut router = router(
        RoutingPolicyConfig::Sequence {
            multiplicity: vec![2, 1],
        },
        3,
        &KnownSymbols::default(),
    );
    let client = Client::new(1, "a", 0.0);
    let picks: Vec<usize> = (0..8).map(|_| decide_simple(&mut router, &client)).collect();
    // Missing multiplicity defaults to 1
    assert_eq!(picks, vec![0, 0, 1, 2, 0, 0, 1, 2]);
}

#[test]
fn test_sequence_rejects_zero_multiplicity() {
    let config = RoutingPolicyConfig::Sequence {
        multiplicity: vec![1, 0],
    };
    assert_eq!(
        compile_policy(&config, 2, &KnownSymbols::default(), true).unwrap_err(),
        vec![RoutingError::ZeroMultiplicity { index: 1 }]
    );
}

#[test]
fn test_key_value_match() {
    let mut router = router(
        RoutingPolicyConfig::KeyValue {
            key: "type".into(),
            values: vec!["gold".into(), "silver".into()],
            multi_values: false,
        },
        3,
        &KnownSymbols::default(),
    );
    let mut client = Client::new(1, "a", 0.0);
    client.set_text("type", "silver");
    assert_eq!(decide_simple(&mut router, &client), 1);

    client.set_text("type", "copper");
    assert_eq!(decide_simple(&mut router, &client), 2);
}

#[test]
fn test_key_value_multi_values() {
    let mut router = router(
        RoutingPolicyConfig::KeyValue {
            key: "region".into(),
            values: vec!["north ; east".into()],
            multi_values: true,
        },
        2,
        &KnownSymbols::default(),
    );
    let mut client = Client::new(1, "a", 0.0);
    client.set_text("region", "east");
    assert_eq!(decide_simple(&mut router, &client), 0);
}

#[test]
fn test_empty_destinations_rejected_for_every_mode() {
    let symbols = KnownSymbols::default();
    let configs = vec![
        RoutingPolicyConfig::Probabilistic { rates: vec![] },
        RoutingPolicyConfig::Conditional { conditions: vec![] },
        RoutingPolicyConfig::ShortestQueue {
            lookahead: Lookahead::NextStation,
        },
        RoutingPolicyConfig::KeyValue {
            key: "k".into(),
            values: vec![],
            multi_values: false,
        },
    ];
    for config in configs {
        assert_eq!(
            compile_policy(&config, 0, &symbols, true).unwrap_err(),
            vec![RoutingError::NoDestinations]
        );
    }
}

// ============================================================================
// Load based
// ============================================================================

#[test]
fn test_shortest_queue_and_longest_queue() {
    let symbols = KnownSymbols::default();
    let mut loads = Loads::default();
    loads.queue.insert(0, 4);
    loads.queue.insert(1, 1);
    loads.queue.insert(2, 6);

    let client = Client::new(1, "a", 0.0);
    let variables = VariableEnvironment::new();
    let mut rng = RngManager::new(1);

    let mut shortest = router(
        RoutingPolicyConfig::ShortestQueue {
            lookahead: Lookahead::NextStation,
        },
        3,
        &symbols,
    );
    assert_eq!(decide(&mut shortest, &client, &variables, &loads, &mut rng), 1);

    let mut longest = router(
        RoutingPolicyConfig::LongestQueue {
            lookahead: Lookahead::NextStation,
        },
        3,
        &symbols,
    );
    assert_eq!(decide(&mut longest, &client, &variables, &loads, &mut rng), 2);
}

#[test]
fn test_fewest_clients_through_pass_through_stations() {
    let symbols = KnownSymbols::default();
    // Destination 0 is a pass-through leading to station 5, which is busy
    let mut loads = Loads::default();
    loads.forward.insert(0, 5);
    loads.clients.insert(5, 3);
    loads.clients.insert(1, 1);

    let client = Client::new(1, "a", 0.0);
    let variables = VariableEnvironment::new();
    let mut rng = RngManager::new(1);

    let mut next_only = router(
        RoutingPolicyConfig::FewestClients {
            lookahead: Lookahead::NextStation,
        },
        2,
        &symbols,
    );
    assert_eq!(decide(&mut next_only, &client, &variables, &loads, &mut rng), 0);

    let mut next_process = router(
        RoutingPolicyConfig::FewestClients {
            lookahead: Lookahead::NextProcessStation,
        },
        2,
        &symbols,
    );
    assert_eq!(decide(&mut next_process, &client, &variables, &loads, &mut rng), 1);
}

#[test]
fn test_ties_go_to_lowest_index() {
    let mut most = router(
        RoutingPolicyConfig::MostClients {
            lookahead: Lookahead::NextStation,
        },
        4,
        &KnownSymbols::default(),
    );
    assert_eq!(decide_simple(&mut most, &Client::new(1, "a", 0.0)), 0);
}

#[test]
fn test_random_tie_break_spreads_choices() {
    let policy = compile_policy(
        &RoutingPolicyConfig::ShortestQueue {
            lookahead: Lookahead::NextStation,
        },
        3,
        &KnownSymbols::default(),
        true,
    )
    .unwrap();
    let mut router = Router::new((0..3).map(StationId).collect(), policy, TieBreak::Random).unwrap();
    let client = Client::new(1, "a", 0.0);
    let variables = VariableEnvironment::new();
    let mut rng = RngManager::new(77);

    for _ in 0..300 {
        decide(&mut router, &client, &variables, &NoLoad, &mut rng);
    }
    assert!(router.selections().iter().all(|&count| count > 50));
}

#[test]
fn test_policy_config_from_json() {
    let config: RoutingPolicyConfig =
        serde_json::from_str(r#"{"mode": "shortest_queue", "lookahead": "next_process_station"}"#)
            .unwrap();
    assert_eq!(
        config,
        RoutingPolicyConfig::ShortestQueue {
            lookahead: Lookahead::NextProcessStation
        }
    );

    let config: RoutingPolicyConfig =
        serde_json::from_str(r#"{"mode": "probabilistic"}"#).unwrap();
    assert_eq!(config, RoutingPolicyConfig::Probabilistic { rates: vec![] });
}
