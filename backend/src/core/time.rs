//! Time management for the simulation
//!
//! Simulated time is a continuous `f64` measured in seconds. Rates that are
//! configured per minute or per hour (valve flows, for example) are converted
//! through [`TimeBase`].

use serde::{Deserialize, Serialize};

/// Unit in which a rate or a duration is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimeBase {
    /// Number of seconds in one unit of this time base
    ///
    /// # Example
    /// ```
    /// use queuesim_core_rs::TimeBase;
    ///
    /// assert_eq!(TimeBase::Minutes.seconds(), 60.0);
    /// assert_eq!(TimeBase::Hours.seconds(), 3600.0);
    /// ```
    pub fn seconds(self) -> f64 {
        match self {
            TimeBase::Seconds => 1.0,
            TimeBase::Minutes => 60.0,
            TimeBase::Hours => 3600.0,
        }
    }

    /// Convert a rate given "per unit of this time base" into a rate per second
    pub fn rate_per_second(self, rate: f64) -> f64 {
        rate / self.seconds()
    }
}

/// Monotonic simulation clock
///
/// # Example
/// ```
/// use queuesim_core_rs::SimClock;
///
/// let mut clock = SimClock::new();
/// assert_eq!(clock.now(), 0.0);
///
/// clock.advance_to(12.5);
/// assert_eq!(clock.now(), 12.5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Current simulated time in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move the clock forward to `time`
    ///
    /// # Panics
    /// Panics if `time` lies before the current time. The scheduler pops
    /// events in time order, so going backwards means a corrupted queue.
    pub fn advance_to(&mut self, time: f64) {
        assert!(
            time >= self.now,
            "simulation clock cannot move backwards ({} -> {})",
            self.now,
            time
        );
        self.now = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_per_second_conversion() {
        assert_eq!(TimeBase::Seconds.rate_per_second(5.0), 5.0);
        assert_eq!(TimeBase::Minutes.rate_per_second(120.0), 2.0);
        assert!((TimeBase::Hours.rate_per_second(7200.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "simulation clock cannot move backwards")]
    fn test_clock_rejects_backwards_move() {
        let mut clock = SimClock::new();
        clock.advance_to(10.0);
        clock.advance_to(5.0);
    }
}
