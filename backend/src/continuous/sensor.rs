//! Threshold sensors on continuous entities
//!
//! A sensor watches one tank or analog value and raises a signal, named
//! after the sensor, each time the value crosses its threshold in the
//! configured direction. Crossings are detected between two consecutive
//! observations, so a value that passes the threshold and returns within
//! one notify interval goes unnoticed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Fires when the value rises to or above the threshold
    #[default]
    Up,
    /// Fires when the value falls to or below the threshold
    Down,
}

/// Sensor as configured in a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Signal raised on each crossing
    pub name: String,
    pub entity: String,
    pub threshold: f64,
    /// Threshold is a percentage of the tank capacity
    #[serde(default)]
    pub percent: bool,
    #[serde(default)]
    pub direction: ThresholdDirection,
}

/// Sensor bound to an entity index, threshold in absolute units
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::continuous::{TankSensor, ThresholdDirection};
///
/// let mut sensor = TankSensor::new("Full", 0, 80.0, ThresholdDirection::Up);
/// assert!(!sensor.observe(10.0));
/// assert!(sensor.observe(85.0));
/// assert!(!sensor.observe(90.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TankSensor {
    name: String,
    entity: usize,
    threshold: f64,
    direction: ThresholdDirection,
    last: Option<f64>,
}

impl TankSensor {
    pub fn new(
        name: impl Into<String>,
        entity: usize,
        threshold: f64,
        direction: ThresholdDirection,
    ) -> Self {
        Self {
            name: name.into(),
            entity,
            threshold,
            direction,
            last: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> usize {
        self.entity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record a value; `true` when it crossed the threshold since the last one
    ///
    /// The first observation only sets the reference value.
    pub fn observe(&mut self, value: f64) -> bool {
        let previous = self.last.replace(value);
        match (previous, self.direction) {
            (None, _) => false,
            (Some(prev), ThresholdDirection::Up) => prev < self.threshold && value >= self.threshold,
            (Some(prev), ThresholdDirection::Down) => {
                prev > self.threshold && value <= self.threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_crossing() {
        let mut sensor = TankSensor::new("Low", 2, 5.0, ThresholdDirection::Down);
        assert!(!sensor.observe(8.0));
        assert!(!sensor.observe(6.0));
        assert!(sensor.observe(5.0));
        assert!(!sensor.observe(2.0));
        // Rising again re-arms it
        assert!(!sensor.observe(9.0));
        assert!(sensor.observe(1.0));
    }

    #[test]
    fn test_start_above_threshold_does_not_fire() {
        let mut sensor = TankSensor::new("Full", 0, 50.0, ThresholdDirection::Up);
        assert!(!sensor.observe(60.0));
        assert!(!sensor.observe(70.0));
    }

    #[test]
    fn test_config_defaults() {
        let config: SensorConfig =
            serde_json::from_str(r#"{"name": "Full", "entity": "Silo", "threshold": 90}"#).unwrap();
        assert!(!config.percent);
        assert_eq!(config.direction, ThresholdDirection::Up);
    }
}
