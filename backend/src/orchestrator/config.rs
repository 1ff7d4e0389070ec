//! Model configuration
//!
//! The serde-facing description of a queueing network. A [`ModelConfig`]
//! is checked and resolved into an immutable
//! [`CompiledModel`](crate::orchestrator::CompiledModel) by
//! [`compile`](crate::orchestrator::compile); nothing here is used at run
//! time directly.
//!
//! # Example
//!
//! ```rust
//! use queuesim_core_rs::orchestrator::ModelConfig;
//!
//! let json = r#"{
//!     "name": "single counter",
//!     "seed": 7,
//!     "stations": [
//!         {"name": "Door", "type": "source", "next": "Counter",
//!          "arrivals": {"client_type": "walk-in",
//!                       "inter_arrival": {"type": "exponential", "mean": 60.0}}},
//!         {"name": "Counter", "type": "process", "next": "Exit",
//!          "service": {"type": "exponential", "mean": 50.0}},
//!         {"name": "Exit", "type": "dispose"}
//!     ],
//!     "limits": {"end_time": 3600.0}
//! }"#;
//!
//! let config: ModelConfig = serde_json::from_str(json).unwrap();
//! assert_eq!(config.stations.len(), 3);
//! assert!(config.strict_validation);
//! ```

use crate::arrivals::{ArrivalConfig, Distribution};
use crate::continuous::{ContinuousConfig, SensorConfig, TankFlowConfig};
use crate::feed::{FeedSettings, FeedSourceConfig, FeedTarget};
use crate::routing::{RoutingPolicyConfig, TieBreak};
use crate::statistics::data::{DEFAULT_STEPS, DEFAULT_UPPER_BOUND};
use crate::statistics::time::DEFAULT_MAX_STATE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Model
// ============================================================================

/// Complete description of one simulation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,

    /// Base RNG seed; replications derive their own seeds from it
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Declared global variables and their initial values
    #[serde(default)]
    pub variables: VariablesConfig,

    pub stations: Vec<StationConfig>,

    /// Tanks and analog values
    #[serde(default)]
    pub continuous: Vec<ContinuousConfig>,

    /// Threshold sensors on tanks and analog values
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    #[serde(default)]
    pub limits: RunLimits,

    #[serde(default)]
    pub statistics: StatisticsSettings,

    /// Keep the full event log in memory
    #[serde(default)]
    pub record_events: bool,

    /// Reject questionable routing rates instead of clamping them
    #[serde(default = "default_true")]
    pub strict_validation: bool,
}

fn default_seed() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

/// Global variables with their initial values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablesConfig {
    #[serde(default)]
    pub numbers: BTreeMap<String, f64>,
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
}

/// When a run stops on its own
///
/// A run without any limit ends when no events are left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Simulated time at which the run ends
    #[serde(default)]
    pub end_time: Option<f64>,

    /// Number of dispatched events after which the run ends
    #[serde(default)]
    pub max_events: Option<u64>,
}

/// Layout of the statistics histograms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSettings {
    /// Largest duration resolved by the data indicators' density
    #[serde(default = "default_upper_bound")]
    pub data_upper_bound: f64,

    /// Number of density buckets below `data_upper_bound`
    #[serde(default = "default_steps")]
    pub data_steps: usize,

    /// Largest state resolved by the time indicators' density
    #[serde(default = "default_max_state")]
    pub max_state: usize,

    /// Number of states in reported short distributions (0..=k)
    #[serde(default = "default_distribution_states")]
    pub distribution_states: usize,
}

fn default_upper_bound() -> f64 {
    DEFAULT_UPPER_BOUND
}

fn default_steps() -> usize {
    DEFAULT_STEPS
}

fn default_max_state() -> usize {
    DEFAULT_MAX_STATE
}

fn default_distribution_states() -> usize {
    10
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            data_upper_bound: DEFAULT_UPPER_BOUND,
            data_steps: DEFAULT_STEPS,
            max_state: DEFAULT_MAX_STATE,
            distribution_states: default_distribution_states(),
        }
    }
}

// ============================================================================
// Stations
// ============================================================================

/// One station of the network, referenced by name from other stations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: StationKind,
}

impl StationConfig {
    pub fn new(name: impl Into<String>, kind: StationKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Station behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationKind {
    /// Creates clients
    Source { arrivals: ArrivalConfig, next: String },

    /// FIFO queue in front of `servers` identical servers
    Process {
        #[serde(default = "default_servers")]
        servers: usize,
        service: Distribution,
        next: String,
    },

    /// Holds every client for a sampled time, no queueing
    Delay { delay: Distribution, next: String },

    /// Routes each client to one of several destinations
    Decide {
        destinations: Vec<String>,
        policy: RoutingPolicyConfig,
        #[serde(default)]
        tie_break: TieBreak,
        /// Client type given on the way to each destination; empty keeps it
        #[serde(default)]
        new_client_types: Vec<String>,
    },

    /// Evaluates expressions and stores the results
    Assign {
        assignments: Vec<AssignmentConfig>,
        next: String,
    },

    /// Reads the next value of an external table
    Input {
        source: FeedSourceConfig,
        #[serde(flatten)]
        settings: FeedSettings,
        target: FeedTarget,
        next: String,
    },

    /// Sets the flow rate of a tank or analog value valve
    Valve {
        entity: String,
        valve: usize,
        flow_rate: String,
        next: String,
    },

    /// Starts a transfer between continuous entities for every client
    Flow {
        #[serde(flatten)]
        flow: TankFlowConfig,
        next: String,
    },

    /// Raises a named signal for every client
    Signal { signal: String, next: String },

    /// Removes clients from the system
    Dispose,
}

fn default_servers() -> usize {
    1
}

impl StationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StationKind::Source { .. } => "source",
            StationKind::Process { .. } => "process",
            StationKind::Delay { .. } => "delay",
            StationKind::Decide { .. } => "decide",
            StationKind::Assign { .. } => "assign",
            StationKind::Input { .. } => "input",
            StationKind::Valve { .. } => "valve",
            StationKind::Flow { .. } => "flow",
            StationKind::Signal { .. } => "signal",
            StationKind::Dispose => "dispose",
        }
    }
}

/// `target := expression`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    pub target: FeedTarget,
    pub expression: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuous::FlowStop;
    use crate::feed::EofPolicy;
    use crate::routing::Lookahead;

    #[test]
    fn test_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"stations": [{"name": "Exit", "type": "dispose"}]}"#).unwrap();
        assert_eq!(config.seed, 1);
        assert!(config.strict_validation);
        assert!(!config.record_events);
        assert_eq!(config.limits, RunLimits::default());
        assert_eq!(config.statistics, StatisticsSettings::default());
    }

    #[test]
    fn test_decide_station_parses_policy() {
        let station: StationConfig = serde_json::from_str(
            r#"{"name": "Split", "type": "decide", "destinations": ["A", "B"],
                "policy": {"mode": "shortest_queue", "lookahead": "next_process_station"}}"#,
        )
        .unwrap();
        match station.kind {
            StationKind::Decide {
                destinations,
                policy,
                tie_break,
                new_client_types,
            } => {
                assert_eq!(destinations, vec!["A", "B"]);
                assert!(new_client_types.is_empty());
                assert_eq!(
                    policy,
                    RoutingPolicyConfig::ShortestQueue {
                        lookahead: Lookahead::NextProcessStation
                    }
                );
                assert_eq!(tie_break, TieBreak::LowestIndex);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_input_station_flattens_settings() {
        let station: StationConfig = serde_json::from_str(
            r#"{"name": "Read", "type": "input", "next": "Exit",
                "source": {"type": "table", "columns": ["v"], "rows": [["1"]]},
                "load_column": "v", "eof": "loop",
                "target": {"type": "client_number", "name": "size"}}"#,
        )
        .unwrap();
        match station.kind {
            StationKind::Input {
                settings, target, ..
            } => {
                assert_eq!(settings.load_column, "v");
                assert_eq!(settings.eof, EofPolicy::Loop);
                assert_eq!(target, FeedTarget::ClientNumber("size".into()));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_flow_station_flattens_transfer() {
        let station: StationConfig = serde_json::from_str(
            r#"{"name": "Pump", "type": "flow", "next": "Exit",
                "source": "Silo", "rate": 2.5,
                "stop": {"type": "quantity", "amount": 10}}"#,
        )
        .unwrap();
        match station.kind {
            StationKind::Flow { flow, next } => {
                assert_eq!(flow.source.as_deref(), Some("Silo"));
                assert_eq!(flow.destination, None);
                assert_eq!(flow.stop, FlowStop::Quantity { amount: 10.0 });
                assert_eq!(next, "Exit");
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_process_defaults_to_one_server() {
        let station: StationConfig = serde_json::from_str(
            r#"{"name": "P", "type": "process", "next": "X",
                "service": {"type": "fixed", "value": 2.0}}"#,
        )
        .unwrap();
        assert!(matches!(station.kind, StationKind::Process { servers: 1, .. }));
    }
}
