// Routing - type definitions
//
// Configuration records (as read from a model file) and the compiled
// policy used at run time.

use crate::expression::Expression;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How far to look when comparing destination load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookahead {
    /// Measure the destination itself
    #[default]
    NextStation,
    /// Follow pass-through stations (decide, assign, ...) to the station
    /// that actually holds clients
    NextProcessStation,
}

/// Which destination wins when several share the best load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    LowestIndex,
    Random,
}

/// Routing policy as configured
///
/// Parallel lists are indexed like the destination list. Shorter lists are
/// allowed; longer lists are rejected.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::routing::RoutingPolicyConfig;
///
/// let json = r#"{"mode": "conditional", "conditions": ["x > 10", "x > 0"]}"#;
/// let policy: RoutingPolicyConfig = serde_json::from_str(json).unwrap();
/// assert!(matches!(policy, RoutingPolicyConfig::Conditional { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoutingPolicyConfig {
    /// Random split proportional to rates; missing rates count as 1
    Probabilistic {
        #[serde(default)]
        rates: Vec<f64>,
    },

    /// First true condition wins; the last destination is the else branch
    Conditional { conditions: Vec<String> },

    /// First destination whose list contains the client type
    ByClientType { client_types: Vec<Vec<String>> },

    /// Round robin, destination i taken multiplicity[i] times in a row
    Sequence {
        #[serde(default)]
        multiplicity: Vec<u32>,
    },

    ShortestQueue {
        #[serde(default)]
        lookahead: Lookahead,
    },

    FewestClients {
        #[serde(default)]
        lookahead: Lookahead,
    },

    LongestQueue {
        #[serde(default)]
        lookahead: Lookahead,
    },

    MostClients {
        #[serde(default)]
        lookahead: Lookahead,
    },

    /// Match a client text attribute against configured values
    KeyValue {
        key: String,
        values: Vec<String>,
        /// Each value may list alternatives separated by `;`
        #[serde(default)]
        multi_values: bool,
    },
}

// ============================================================================
// COMPILED POLICY
// ============================================================================

/// Quantity compared by load-based policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMeasure {
    QueueLength,
    ClientCount,
}

/// Routing policy ready for use; all lists have exactly N entries
/// (conditions and key values: at most N)
#[derive(Debug, Clone)]
pub enum RoutingPolicy {
    /// Normalised weights summing to 1
    Probabilistic { weights: Vec<f64> },
    Conditional { conditions: Vec<Expression> },
    ByClientType { client_types: Vec<Vec<String>> },
    Sequence { multiplicity: Vec<u32> },
    ShortestQueue(Lookahead),
    FewestClients(Lookahead),
    LongestQueue(Lookahead),
    MostClients(Lookahead),
    /// `values[i]` holds the alternatives that select destination i
    KeyValue { key: String, values: Vec<Vec<String>> },
}

impl RoutingPolicy {
    pub fn mode_name(&self) -> &'static str {
        match self {
            RoutingPolicy::Probabilistic { .. } => "probabilistic",
            RoutingPolicy::Conditional { .. } => "conditional",
            RoutingPolicy::ByClientType { .. } => "by_client_type",
            RoutingPolicy::Sequence { .. } => "sequence",
            RoutingPolicy::ShortestQueue(_) => "shortest_queue",
            RoutingPolicy::FewestClients(_) => "fewest_clients",
            RoutingPolicy::LongestQueue(_) => "longest_queue",
            RoutingPolicy::MostClients(_) => "most_clients",
            RoutingPolicy::KeyValue { .. } => "key_value",
        }
    }
}
