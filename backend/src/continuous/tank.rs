//! Tank and analog value integration
//!
//! A continuous entity holds one real value that changes linearly between
//! notify ticks:
//!
//! ```text
//! new = clamp(old + Σ ±flow_i · dt / time_base_i + change_rate · dt)
//! ```
//!
//! Valve flows are given per unit of their own time base; `dt` is in
//! seconds. Clamping applies only to bounds whose flag is enabled.

use crate::continuous::display::DisplayCell;
use crate::core::time::TimeBase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Smallest change that is reported to observers
pub const NOTIFY_EPSILON: f64 = 1e-5;

/// Notify interval used when the configured one is not positive
pub const DEFAULT_NOTIFY_INTERVAL: f64 = 1.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContinuousError {
    #[error("tank capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),

    #[error("valve {index} has invalid flow rate {rate}")]
    InvalidFlowRate { index: usize, rate: f64 },

    #[error("no valve with index {0}")]
    NoSuchValve(usize),

    #[error("value {0} is not finite")]
    NotFinite(f64),

    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: &'static str,
    },

    #[error("tick at {now} precedes last update at {last}")]
    TimeWentBackwards { now: f64, last: f64 },

    #[error("no continuous entity with index {0}")]
    NoSuchEntity(usize),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveDirection {
    #[default]
    In,
    Out,
}

/// One flow contributor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valve {
    /// Flow per unit of `time_base`, never negative
    pub flow_rate: f64,
    #[serde(default)]
    pub time_base: TimeBase,
    #[serde(default)]
    pub direction: ValveDirection,
}

impl Valve {
    /// Signed flow per second
    pub fn rate_per_second(&self) -> f64 {
        let rate = self.time_base.rate_per_second(self.flow_rate);
        match self.direction {
            ValveDirection::In => rate,
            ValveDirection::Out => -rate,
        }
    }
}

/// What kind of continuous entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContinuousKind {
    /// Bounded to [0, capacity]
    Tank { capacity: f64 },
    /// Drifts at a fixed signed rate in addition to its valves
    AnalogValue {
        #[serde(default)]
        change_rate_per_second: f64,
    },
}

/// Optional bound with its use flag
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub enabled: bool,
}

/// Configuration record of a tank or analog value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ContinuousKind,
    #[serde(default)]
    pub initial_value: f64,
    /// Ignored for tanks, whose lower bound is 0
    #[serde(default)]
    pub min: Option<f64>,
    /// Ignored for tanks, whose upper bound is the capacity
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default = "default_true")]
    pub use_min: bool,
    #[serde(default = "default_true")]
    pub use_max: bool,
    #[serde(default)]
    pub valves: Vec<Valve>,
    #[serde(default = "default_notify_interval")]
    pub notify_interval: f64,
}

fn default_true() -> bool {
    true
}

fn default_notify_interval() -> f64 {
    DEFAULT_NOTIFY_INTERVAL
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Idle,
    Running { last_time: f64 },
    Terminated,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running { .. } => "running",
            Phase::Terminated => "terminated",
        }
    }
}

/// Run-time state of one tank or analog value
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::continuous::{ContinuousConfig, ContinuousKind, ContinuousState, Valve};
/// use queuesim_core_rs::TimeBase;
///
/// let config = ContinuousConfig {
///     name: "Silo".into(),
///     kind: ContinuousKind::Tank { capacity: 100.0 },
///     initial_value: 0.0,
///     min: None,
///     max: None,
///     use_min: true,
///     use_max: true,
///     valves: vec![Valve { flow_rate: 60.0, time_base: TimeBase::Minutes, direction: Default::default() }],
///     notify_interval: 1.0,
/// };
///
/// let mut silo = ContinuousState::new(&config).unwrap();
/// silo.start(0.0).unwrap();
/// assert_eq!(silo.tick(10.0).unwrap(), Some(10.0));
/// assert_eq!(silo.tick(500.0).unwrap(), Some(100.0));
/// ```
#[derive(Debug, Clone)]
pub struct ContinuousState {
    name: String,
    kind: ContinuousKind,
    value: f64,
    min: Bound,
    max: Bound,
    valves: Vec<Valve>,
    notify_interval: f64,
    phase: Phase,
    last_reported: f64,
    display: Option<Arc<DisplayCell>>,
}

impl ContinuousState {
    /// Validate a configuration and build the idle state
    pub fn new(config: &ContinuousConfig) -> Result<Self, ContinuousError> {
        let (min, max) = match config.kind {
            ContinuousKind::Tank { capacity } => {
                if !(capacity > 0.0) || !capacity.is_finite() {
                    return Err(ContinuousError::NonPositiveCapacity(capacity));
                }
                (
                    Bound {
                        value: 0.0,
                        enabled: config.use_min,
                    },
                    Bound {
                        value: capacity,
                        enabled: config.use_max,
                    },
                )
            }
            ContinuousKind::AnalogValue {
                change_rate_per_second,
            } => {
                if !change_rate_per_second.is_finite() {
                    return Err(ContinuousError::NotFinite(change_rate_per_second));
                }
                (
                    Bound {
                        value: config.min.unwrap_or(0.0),
                        enabled: config.use_min && config.min.is_some(),
                    },
                    Bound {
                        value: config.max.unwrap_or(0.0),
                        enabled: config.use_max && config.max.is_some(),
                    },
                )
            }
        };

        for (index, valve) in config.valves.iter().enumerate() {
            validate_flow(index, valve.flow_rate)?;
        }
        if !config.initial_value.is_finite() {
            return Err(ContinuousError::NotFinite(config.initial_value));
        }

        let notify_interval = if config.notify_interval > 0.0 && config.notify_interval.is_finite() {
            config.notify_interval
        } else {
            DEFAULT_NOTIFY_INTERVAL
        };

        let mut state = Self {
            name: config.name.clone(),
            kind: config.kind,
            value: config.initial_value,
            min,
            max,
            valves: config.valves.clone(),
            notify_interval,
            phase: Phase::Idle,
            last_reported: config.initial_value,
            display: None,
        };
        state.value = state.clamp(state.value);
        state.last_reported = state.value;
        Ok(state)
    }

    /// Mirror every reported value into a display cell
    pub fn attach_display(&mut self, cell: Arc<DisplayCell>) {
        cell.publish(self.value);
        self.display = Some(cell);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContinuousKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn notify_interval(&self) -> f64 {
        self.notify_interval
    }

    pub fn valves(&self) -> &[Valve] {
        &self.valves
    }

    /// Net change per second from valves and drift
    pub fn net_rate(&self) -> f64 {
        let valves: f64 = self.valves.iter().map(Valve::rate_per_second).sum();
        match self.kind {
            ContinuousKind::Tank { .. } => valves,
            ContinuousKind::AnalogValue {
                change_rate_per_second,
            } => valves + change_rate_per_second,
        }
    }

    /// Idle → Running
    pub fn start(&mut self, time: f64) -> Result<(), ContinuousError> {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Running { last_time: time };
                Ok(())
            }
            other => Err(ContinuousError::InvalidPhase {
                action: "start",
                phase: other.name(),
            }),
        }
    }

    /// Integrate valves and drift up to `now` without reporting
    pub fn advance(&mut self, now: f64) -> Result<(), ContinuousError> {
        let last_time = match self.phase {
            Phase::Running { last_time } => last_time,
            other => {
                return Err(ContinuousError::InvalidPhase {
                    action: "tick",
                    phase: other.name(),
                })
            }
        };
        if now < last_time {
            return Err(ContinuousError::TimeWentBackwards {
                now,
                last: last_time,
            });
        }

        let dt = now - last_time;
        self.value = self.clamp(self.value + self.net_rate() * dt);
        self.phase = Phase::Running { last_time: now };
        Ok(())
    }

    /// Advance the value to `now`
    ///
    /// Returns the new value when it moved more than [`NOTIFY_EPSILON`]
    /// away from the last reported one, `None` otherwise. Changes made by
    /// [`transfer`](Self::transfer) are reported here too.
    pub fn tick(&mut self, now: f64) -> Result<Option<f64>, ContinuousError> {
        self.advance(now)?;

        if (self.value - self.last_reported).abs() > NOTIFY_EPSILON {
            self.last_reported = self.value;
            if let Some(cell) = &self.display {
                cell.publish(self.value);
            }
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }

    /// How much a flow may take out before the lower bound is hit
    pub fn available_out(&self) -> f64 {
        if self.min.enabled {
            (self.value - self.min.value).max(0.0)
        } else {
            f64::INFINITY
        }
    }

    /// How much a flow may add before the upper bound is hit
    pub fn room_in(&self) -> f64 {
        if self.max.enabled {
            (self.max.value - self.value).max(0.0)
        } else {
            f64::INFINITY
        }
    }

    /// Add (or with a negative amount remove) material moved by a flow
    pub fn transfer(&mut self, amount: f64) {
        self.value = self.clamp(self.value + amount);
    }

    /// Largest value of the entity, if it has one
    pub fn capacity(&self) -> Option<f64> {
        match self.kind {
            ContinuousKind::Tank { capacity } => Some(capacity),
            ContinuousKind::AnalogValue { .. } => None,
        }
    }

    /// Change a valve's flow; takes effect from the last tick on
    pub fn set_valve_flow(&mut self, index: usize, rate: f64) -> Result<(), ContinuousError> {
        validate_flow(index, rate)?;
        let valve = self
            .valves
            .get_mut(index)
            .ok_or(ContinuousError::NoSuchValve(index))?;
        valve.flow_rate = rate;
        Ok(())
    }

    /// Any phase → Terminated
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if self.max.enabled && value > self.max.value {
            value = self.max.value;
        }
        if self.min.enabled && value < self.min.value {
            value = self.min.value;
        }
        value
    }
}

fn validate_flow(index: usize, rate: f64) -> Result<(), ContinuousError> {
    if rate >= 0.0 && rate.is_finite() {
        Ok(())
    } else {
        Err(ContinuousError::InvalidFlowRate { index, rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank(capacity: f64, valves: Vec<Valve>) -> ContinuousConfig {
        ContinuousConfig {
            name: "T".into(),
            kind: ContinuousKind::Tank { capacity },
            initial_value: 0.0,
            min: None,
            max: None,
            use_min: true,
            use_max: true,
            valves,
            notify_interval: 1.0,
        }
    }

    fn valve(flow_rate: f64, direction: ValveDirection) -> Valve {
        Valve {
            flow_rate,
            time_base: TimeBase::Seconds,
            direction,
        }
    }

    #[test]
    fn test_non_positive_capacity_rejected() {
        assert_eq!(
            ContinuousState::new(&tank(0.0, vec![])).unwrap_err(),
            ContinuousError::NonPositiveCapacity(0.0)
        );
        assert!(ContinuousState::new(&tank(-5.0, vec![])).is_err());
    }

    #[test]
    fn test_negative_valve_rejected() {
        let config = tank(10.0, vec![valve(-1.0, ValveDirection::In)]);
        assert!(matches!(
            ContinuousState::new(&config),
            Err(ContinuousError::InvalidFlowRate { index: 0, .. })
        ));
    }

    #[test]
    fn test_notify_interval_defaults_when_not_positive() {
        let mut config = tank(10.0, vec![]);
        config.notify_interval = 0.0;
        assert_eq!(ContinuousState::new(&config).unwrap().notify_interval(), 1.0);
        config.notify_interval = -3.0;
        assert_eq!(ContinuousState::new(&config).unwrap().notify_interval(), 1.0);
    }

    #[test]
    fn test_outflow_clamps_at_zero() {
        let mut config = tank(10.0, vec![valve(2.0, ValveDirection::Out)]);
        config.initial_value = 5.0;
        let mut state = ContinuousState::new(&config).unwrap();
        state.start(0.0).unwrap();
        state.tick(1.0).unwrap();
        assert_eq!(state.value(), 3.0);
        state.tick(10.0).unwrap();
        assert_eq!(state.value(), 0.0);
    }

    #[test]
    fn test_unclamped_tank_overshoots() {
        let mut config = tank(10.0, vec![valve(4.0, ValveDirection::In)]);
        config.use_max = false;
        let mut state = ContinuousState::new(&config).unwrap();
        state.start(0.0).unwrap();
        state.tick(5.0).unwrap();
        assert_eq!(state.value(), 20.0);
    }

    #[test]
    fn test_small_changes_not_reported() {
        let config = tank(10.0, vec![valve(1e-6, ValveDirection::In)]);
        let mut state = ContinuousState::new(&config).unwrap();
        state.start(0.0).unwrap();
        assert_eq!(state.tick(1.0).unwrap(), None);
        // Accumulated drift is reported once it exceeds the epsilon
        assert!(state.tick(20.0).unwrap().is_some());
    }

    #[test]
    fn test_analog_value_with_bounds() {
        let config = ContinuousConfig {
            name: "Temp".into(),
            kind: ContinuousKind::AnalogValue {
                change_rate_per_second: -0.5,
            },
            initial_value: 20.0,
            min: Some(15.0),
            max: None,
            use_min: true,
            use_max: true,
            valves: vec![],
            notify_interval: 1.0,
        };
        let mut state = ContinuousState::new(&config).unwrap();
        state.start(0.0).unwrap();
        assert_eq!(state.tick(4.0).unwrap(), Some(18.0));
        assert_eq!(state.tick(100.0).unwrap(), Some(15.0));
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = ContinuousState::new(&tank(10.0, vec![])).unwrap();
        assert!(state.tick(1.0).is_err());
        state.start(0.0).unwrap();
        assert!(state.start(1.0).is_err());
        assert!(matches!(
            state.tick(-1.0),
            Err(ContinuousError::TimeWentBackwards { .. })
        ));
        state.terminate();
        assert_eq!(state.phase(), Phase::Terminated);
        assert!(state.tick(2.0).is_err());
    }

    #[test]
    fn test_set_valve_flow() {
        let mut state =
            ContinuousState::new(&tank(100.0, vec![valve(1.0, ValveDirection::In)])).unwrap();
        state.start(0.0).unwrap();
        state.tick(2.0).unwrap();
        state.set_valve_flow(0, 3.0).unwrap();
        state.tick(4.0).unwrap();
        assert_eq!(state.value(), 8.0);
        assert_eq!(state.set_valve_flow(5, 1.0), Err(ContinuousError::NoSuchValve(5)));
        assert!(state.set_valve_flow(0, f64::NAN).is_err());
    }

    #[test]
    fn test_display_cell_receives_reported_values() {
        let cell = DisplayCell::shared(-1.0);
        let mut state =
            ContinuousState::new(&tank(100.0, vec![valve(1.0, ValveDirection::In)])).unwrap();
        state.attach_display(Arc::clone(&cell));
        assert_eq!(cell.take_if_changed(), Some(0.0));

        state.start(0.0).unwrap();
        state.tick(3.0).unwrap();
        assert_eq!(cell.take_if_changed(), Some(3.0));
        assert_eq!(cell.take_if_changed(), None);
    }

    #[test]
    fn test_transfer_is_reported_on_next_tick() {
        let mut config = tank(10.0, vec![]);
        config.initial_value = 4.0;
        let mut state = ContinuousState::new(&config).unwrap();
        state.start(0.0).unwrap();
        assert_eq!(state.available_out(), 4.0);
        assert_eq!(state.room_in(), 6.0);

        state.transfer(-1.5);
        assert_eq!(state.value(), 2.5);
        assert_eq!(state.tick(0.0).unwrap(), Some(2.5));

        state.transfer(20.0);
        assert_eq!(state.value(), 10.0);
        assert_eq!(state.capacity(), Some(10.0));
    }
}
