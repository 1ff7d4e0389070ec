//! Client arrival generation for source stations
//!
//! Every source station owns an [`ArrivalStream`]: an inter-arrival
//! distribution, the type and initial values of the clients it creates, and
//! an optional cap on the number of arrivals. All sampling goes through the
//! run's [`RngManager`], so the same seed gives the same arrival times.
//!
//! # Example
//!
//! ```
//! use queuesim_core_rs::arrivals::{ArrivalConfig, ArrivalStream, Distribution};
//! use queuesim_core_rs::RngManager;
//!
//! let config = ArrivalConfig::new("walk-in", Distribution::Fixed { value: 2.0 })
//!     .with_max_arrivals(2);
//! let mut stream = ArrivalStream::new(config);
//! let mut rng = RngManager::new(42);
//!
//! assert_eq!(stream.next_gap(&mut rng), Some(2.0));
//! assert_eq!(stream.next_gap(&mut rng), Some(2.0));
//! assert_eq!(stream.next_gap(&mut rng), None);
//! ```

use crate::models::Client;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Duration distributions used for inter-arrival and service times
///
/// Samples are clamped to be non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    /// Constant duration
    Fixed { value: f64 },

    /// Exponential with the given mean
    Exponential { mean: f64 },

    /// Uniform over [min, max)
    Uniform { min: f64, max: f64 },

    /// Normal with mean and standard deviation, negative draws become 0
    Normal { mean: f64, std_dev: f64 },

    /// Log-normal with mean and standard deviation of the distribution
    /// itself (not of the underlying normal)
    LogNormal { mean: f64, std_dev: f64 },
}

impl Distribution {
    /// Draw one duration
    pub fn sample(&self, rng: &mut RngManager) -> f64 {
        let value = match *self {
            Distribution::Fixed { value } => value,
            Distribution::Exponential { mean } => rng.exponential(mean),
            Distribution::Uniform { min, max } => rng.uniform(min, max),
            Distribution::Normal { mean, std_dev } => mean + std_dev * rng.standard_normal(),
            Distribution::LogNormal { mean, std_dev } => {
                if mean <= 0.0 {
                    return 0.0;
                }
                let sigma2 = (1.0 + (std_dev / mean).powi(2)).ln();
                let mu = mean.ln() - sigma2 / 2.0;
                (mu + sigma2.sqrt() * rng.standard_normal()).exp()
            }
        };
        if value.is_finite() {
            value.max(0.0)
        } else {
            0.0
        }
    }

    /// Expected value, for logging and sanity checks
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Fixed { value } => value,
            Distribution::Exponential { mean } => mean,
            Distribution::Uniform { min, max } => (min + max) / 2.0,
            Distribution::Normal { mean, .. } | Distribution::LogNormal { mean, .. } => mean,
        }
    }

    /// Parameter problems, if any
    pub fn validate(&self) -> Result<(), String> {
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(format!("{} must be finite", name))
            }
        };
        match *self {
            Distribution::Fixed { value } => {
                finite("value", value)?;
                if value < 0.0 {
                    return Err("fixed duration must not be negative".to_string());
                }
            }
            Distribution::Exponential { mean } => {
                finite("mean", mean)?;
                if mean <= 0.0 {
                    return Err("exponential mean must be positive".to_string());
                }
            }
            Distribution::Uniform { min, max } => {
                finite("min", min)?;
                finite("max", max)?;
                if min < 0.0 || max < min {
                    return Err(format!("uniform range [{}, {}) is invalid", min, max));
                }
            }
            Distribution::Normal { mean, std_dev } | Distribution::LogNormal { mean, std_dev } => {
                finite("mean", mean)?;
                finite("std_dev", std_dev)?;
                if std_dev < 0.0 {
                    return Err("standard deviation must not be negative".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Configuration of the clients created by one source station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalConfig {
    /// Client type name given to every created client
    pub client_type: String,

    /// Time between two arrivals; the first arrival happens after one gap
    pub inter_arrival: Distribution,

    /// Stop after this many arrivals
    #[serde(default)]
    pub max_arrivals: Option<u64>,

    /// Initial client-local numbers
    #[serde(default)]
    pub numbers: BTreeMap<String, f64>,

    /// Initial client text attributes
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
}

impl ArrivalConfig {
    pub fn new(client_type: impl Into<String>, inter_arrival: Distribution) -> Self {
        Self {
            client_type: client_type.into(),
            inter_arrival,
            max_arrivals: None,
            numbers: BTreeMap::new(),
            texts: BTreeMap::new(),
        }
    }

    pub fn with_max_arrivals(mut self, max: u64) -> Self {
        self.max_arrivals = Some(max);
        self
    }

    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.numbers.insert(name.to_string(), value);
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.texts.insert(key.to_string(), value.to_string());
        self
    }
}

/// Run-time arrival state of one source station
#[derive(Debug, Clone)]
pub struct ArrivalStream {
    config: ArrivalConfig,
    scheduled: u64,
}

impl ArrivalStream {
    pub fn new(config: ArrivalConfig) -> Self {
        Self {
            config,
            scheduled: 0,
        }
    }

    pub fn config(&self) -> &ArrivalConfig {
        &self.config
    }

    /// Number of arrivals scheduled so far
    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Gap until the next arrival, or `None` once the cap is reached
    pub fn next_gap(&mut self, rng: &mut RngManager) -> Option<f64> {
        if let Some(max) = self.config.max_arrivals {
            if self.scheduled >= max {
                return None;
            }
        }
        self.scheduled += 1;
        Some(self.config.inter_arrival.sample(rng))
    }

    /// Build an arriving client with the configured initial values
    pub fn create_client(&self, id: u64, time: f64) -> Client {
        let mut client = Client::new(id, self.config.client_type.clone(), time);
        for (name, value) in &self.config.numbers {
            client.set_number(name, *value);
        }
        for (key, value) in &self.config.texts {
            client.set_text(key, value.clone());
        }
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_deterministic() {
        let dist = Distribution::Exponential { mean: 3.0 };
        let mut a = RngManager::new(7);
        let mut b = RngManager::new(7);
        for _ in 0..100 {
            assert_eq!(dist.sample(&mut a), dist.sample(&mut b));
        }
    }

    #[test]
    fn test_exponential_mean_converges() {
        let dist = Distribution::Exponential { mean: 2.0 };
        let mut rng = RngManager::new(99);
        let n = 20_000;
        let total: f64 = (0..n).map(|_| dist.sample(&mut rng)).sum();
        let mean = total / n as f64;
        assert!((mean - 2.0).abs() < 0.1, "mean was {}", mean);
    }

    #[test]
    fn test_normal_is_clamped_at_zero() {
        let dist = Distribution::Normal {
            mean: 0.0,
            std_dev: 5.0,
        };
        let mut rng = RngManager::new(3);
        assert!((0..1000).all(|_| dist.sample(&mut rng) >= 0.0));
    }

    #[test]
    fn test_lognormal_mean() {
        let dist = Distribution::LogNormal {
            mean: 4.0,
            std_dev: 1.0,
        };
        let mut rng = RngManager::new(11);
        let n = 20_000;
        let mean = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 4.0).abs() < 0.15, "mean was {}", mean);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(Distribution::Exponential { mean: 0.0 }.validate().is_err());
        assert!(Distribution::Uniform { min: 3.0, max: 1.0 }.validate().is_err());
        assert!(Distribution::Fixed { value: f64::NAN }.validate().is_err());
        assert!(Distribution::Normal {
            mean: 1.0,
            std_dev: 0.5
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_created_client_carries_initial_values() {
        let config = ArrivalConfig::new("vip", Distribution::Fixed { value: 1.0 })
            .with_number("Priority", 3.0)
            .with_text("tier", "gold");
        let stream = ArrivalStream::new(config);

        let client = stream.create_client(5, 12.0);
        assert_eq!(client.id(), 5);
        assert_eq!(client.client_type(), "vip");
        assert_eq!(client.arrival_time(), 12.0);
        assert_eq!(client.number("priority"), Some(3.0));
        assert_eq!(client.text("tier"), Some("gold"));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ArrivalConfig = serde_json::from_str(
            r#"{"client_type": "a", "inter_arrival": {"type": "exponential", "mean": 5.0}}"#,
        )
        .unwrap();
        assert_eq!(config.max_arrivals, None);
        assert!(config.numbers.is_empty());
        assert_eq!(config.inter_arrival, Distribution::Exponential { mean: 5.0 });
    }
}
