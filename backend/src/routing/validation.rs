// Routing - validation
//
// Turns a RoutingPolicyConfig into a RoutingPolicy for N destinations,
// collecting every problem instead of stopping at the first one.

use crate::expression::{check_with, CheckError, KnownSymbols};
use crate::routing::types::{RoutingPolicy, RoutingPolicyConfig};
use thiserror::Error;
use tracing::warn;

/// Routing configuration and run-time errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoutingError {
    #[error("routing needs at least one destination")]
    NoDestinations,

    #[error("{list} has {found} entries but there are only {destinations} destinations")]
    TooManyEntries {
        list: &'static str,
        found: usize,
        destinations: usize,
    },

    #[error("rate {rate} for destination {index} is negative or not finite")]
    InvalidRate { index: usize, rate: f64 },

    #[error("rates sum to zero")]
    ZeroRateSum,

    #[error("multiplicity of destination {index} must be at least 1")]
    ZeroMultiplicity { index: usize },

    #[error("key/value routing needs a non-empty key")]
    EmptyKey,

    #[error("condition {index}: {error}")]
    InvalidCondition { index: usize, error: CheckError },

    /// A compiled policy does not fit its destination list
    #[error("inconsistent routing state: {0}")]
    Inconsistent(String),
}

impl RoutingError {
    /// Character offset inside the offending expression, if any
    pub fn position(&self) -> Option<usize> {
        match self {
            RoutingError::InvalidCondition { error, .. } => Some(error.position()),
            _ => None,
        }
    }
}

/// Validation result
pub type ValidationResult<T> = Result<T, Vec<RoutingError>>;

/// Validate a policy for `destinations` destinations and compile it
///
/// In strict mode negative or non-finite rates are errors; otherwise they
/// are clamped to 0 with a warning. A rate sum of 0 is always an error.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::expression::KnownSymbols;
/// use queuesim_core_rs::routing::{compile_policy, RoutingError, RoutingPolicyConfig};
///
/// let symbols = KnownSymbols::default();
/// let config = RoutingPolicyConfig::Probabilistic { rates: vec![0.0, 0.0] };
///
/// let errors = compile_policy(&config, 2, &symbols, true).unwrap_err();
/// assert_eq!(errors, vec![RoutingError::ZeroRateSum]);
/// ```
pub fn compile_policy(
    config: &RoutingPolicyConfig,
    destinations: usize,
    symbols: &KnownSymbols,
    strict: bool,
) -> ValidationResult<RoutingPolicy> {
    if destinations == 0 {
        return Err(vec![RoutingError::NoDestinations]);
    }

    let mut errors = Vec::new();
    let check_len = |list: &'static str, found: usize, errors: &mut Vec<RoutingError>| {
        if found > destinations {
            errors.push(RoutingError::TooManyEntries {
                list,
                found,
                destinations,
            });
        }
    };

    let policy = match config {
        RoutingPolicyConfig::Probabilistic { rates } => {
            check_len("rates", rates.len(), &mut errors);
            let weights = compile_rates(rates, destinations, strict, &mut errors);
            RoutingPolicy::Probabilistic { weights }
        }
        RoutingPolicyConfig::Conditional { conditions } => {
            check_len("conditions", conditions.len(), &mut errors);
            let mut compiled = Vec::with_capacity(conditions.len());
            for (index, source) in conditions.iter().enumerate() {
                match check_with(source, symbols) {
                    Ok(expr) => compiled.push(expr),
                    Err(error) => errors.push(RoutingError::InvalidCondition { index, error }),
                }
            }
            RoutingPolicy::Conditional {
                conditions: compiled,
            }
        }
        RoutingPolicyConfig::ByClientType { client_types } => {
            check_len("client type lists", client_types.len(), &mut errors);
            RoutingPolicy::ByClientType {
                client_types: client_types.clone(),
            }
        }
        RoutingPolicyConfig::Sequence { multiplicity } => {
            check_len("multiplicities", multiplicity.len(), &mut errors);
            for (index, &m) in multiplicity.iter().enumerate() {
                if m == 0 {
                    errors.push(RoutingError::ZeroMultiplicity { index });
                }
            }
            let mut counts = multiplicity.clone();
            counts.resize(destinations, 1);
            RoutingPolicy::Sequence { multiplicity: counts }
        }
        RoutingPolicyConfig::ShortestQueue { lookahead } => RoutingPolicy::ShortestQueue(*lookahead),
        RoutingPolicyConfig::FewestClients { lookahead } => RoutingPolicy::FewestClients(*lookahead),
        RoutingPolicyConfig::LongestQueue { lookahead } => RoutingPolicy::LongestQueue(*lookahead),
        RoutingPolicyConfig::MostClients { lookahead } => RoutingPolicy::MostClients(*lookahead),
        RoutingPolicyConfig::KeyValue {
            key,
            values,
            multi_values,
        } => {
            if key.trim().is_empty() {
                errors.push(RoutingError::EmptyKey);
            }
            check_len("values", values.len(), &mut errors);
            let values = values
                .iter()
                .map(|value| {
                    if *multi_values {
                        value
                            .split(';')
                            .map(|v| v.trim().to_string())
                            .filter(|v| !v.is_empty())
                            .collect()
                    } else {
                        vec![value.clone()]
                    }
                })
                .collect();
            RoutingPolicy::KeyValue {
                key: key.trim().to_string(),
                values,
            }
        }
    };

    if errors.is_empty() {
        Ok(policy)
    } else {
        Err(errors)
    }
}

fn compile_rates(
    rates: &[f64],
    destinations: usize,
    strict: bool,
    errors: &mut Vec<RoutingError>,
) -> Vec<f64> {
    let mut weights: Vec<f64> = (0..destinations)
        .map(|i| rates.get(i).copied().unwrap_or(1.0))
        .collect();

    for (index, weight) in weights.iter_mut().enumerate() {
        if *weight >= 0.0 && weight.is_finite() {
            continue;
        }
        if strict {
            errors.push(RoutingError::InvalidRate {
                index,
                rate: *weight,
            });
        } else {
            warn!(index, rate = *weight, "clamping invalid routing rate to 0");
        }
        *weight = 0.0;
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        errors.push(RoutingError::ZeroRateSum);
        return weights;
    }
    weights.iter().map(|w| w / total).collect()
}
