//! Time-weighted performance indicator
//!
//! Used for "number in system"-style quantities and continuous values:
//! each value is weighted by how long it was held.

use crate::statistics::{moment_shape, Quantile, Snapshot};
use serde::{Deserialize, Serialize};

/// Default highest state tracked individually in the density
pub const DEFAULT_MAX_STATE: usize = 1024;

/// Time share of the states 0..=k
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortDistribution {
    /// `parts[i]` is the fraction of total time spent in state `i`
    pub parts: Vec<f64>,
    /// Some time was spent in a state above `k`
    pub truncated: bool,
}

/// Streaming statistics over a piecewise-constant value
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::TimeIndicator;
///
/// let mut queue_length = TimeIndicator::default();
/// queue_length.record(3.0, 2.0);
/// queue_length.record(1.0, 8.0);
///
/// assert!((queue_length.time_mean() - 1.4).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIndicator {
    count: u64,
    total_time: f64,
    sum: f64,
    sum2: f64,
    sum3: f64,
    sum4: f64,
    min: f64,
    max: f64,
    /// Time spent at each integer state 0..=max_state (values rounded)
    density: Vec<f64>,
    /// Time spent above max_state
    overflow_time: f64,
    /// Open interval for the state-change form
    last_change: Option<f64>,
    current: f64,
}

impl Default for TimeIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATE)
    }
}

impl TimeIndicator {
    pub fn new(max_state: usize) -> Self {
        Self {
            count: 0,
            total_time: 0.0,
            sum: 0.0,
            sum2: 0.0,
            sum3: 0.0,
            sum4: 0.0,
            min: 0.0,
            max: 0.0,
            density: vec![0.0; max_state + 1],
            overflow_time: 0.0,
            last_change: None,
            current: 0.0,
        }
    }

    /// Record that `value` was held for `duration`
    ///
    /// Non-positive or non-finite durations are ignored. Negative values
    /// enter the moments but not the density.
    pub fn record(&mut self, value: f64, duration: f64) {
        if !(duration > 0.0) || !duration.is_finite() || !value.is_finite() {
            return;
        }

        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total_time += duration;

        let v2 = value * value;
        self.sum += duration * value;
        self.sum2 += duration * v2;
        self.sum3 += duration * v2 * value;
        self.sum4 += duration * v2 * v2;

        let state = value.round();
        if state >= 0.0 {
            let index = state as usize;
            match self.density.get_mut(index) {
                Some(slot) => *slot += duration,
                None => self.overflow_time += duration,
            }
        }
    }

    /// State-change form: the value becomes `value` at `time`
    ///
    /// The previous value is recorded for the interval since the last
    /// change. Calls with a time earlier than the last change only update
    /// the current value.
    pub fn set(&mut self, time: f64, value: f64) {
        if let Some(last) = self.last_change {
            if time > last {
                self.record(self.current, time - last);
            }
        }
        if self.last_change.map_or(true, |last| time > last) {
            self.last_change = Some(time);
        }
        self.current = value;
    }

    /// Close the open interval at `time` without changing the value
    pub fn close(&mut self, time: f64) {
        let current = self.current;
        self.set(time, current);
    }

    /// Value set by the last call to [`set`](Self::set)
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Combine another indicator's history into this one
    pub fn merge(&mut self, other: &TimeIndicator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            self.min = other.min;
            self.max = other.max;
        } else {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.total_time += other.total_time;
        self.sum += other.sum;
        self.sum2 += other.sum2;
        self.sum3 += other.sum3;
        self.sum4 += other.sum4;
        self.overflow_time += other.overflow_time;

        for (state, &time) in other.density.iter().enumerate() {
            match self.density.get_mut(state) {
                Some(slot) => *slot += time,
                None => self.overflow_time += time,
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Time-weighted mean
    pub fn time_mean(&self) -> f64 {
        if self.total_time <= 0.0 {
            return 0.0;
        }
        self.sum / self.total_time
    }

    /// Time-weighted population variance
    pub fn variance(&self) -> f64 {
        if self.total_time <= 0.0 {
            return 0.0;
        }
        let mean = self.time_mean();
        (self.sum2 / self.total_time - mean * mean).max(0.0)
    }

    pub fn sd(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn cv(&self) -> f64 {
        let mean = self.time_mean();
        if mean == 0.0 {
            return 0.0;
        }
        self.sd() / mean.abs()
    }

    fn shape(&self) -> (f64, f64) {
        if self.total_time <= 0.0 {
            return (0.0, 0.0);
        }
        let t = self.total_time;
        moment_shape(self.sum / t, self.sum2 / t, self.sum3 / t, self.sum4 / t)
    }

    /// Whether any time was spent above the tracked states
    pub fn hit_max(&self) -> bool {
        self.overflow_time > 0.0
    }

    /// Fraction of total time spent in integer state `state`
    pub fn share_of(&self, state: usize) -> f64 {
        if self.total_time <= 0.0 {
            return 0.0;
        }
        self.density.get(state).copied().unwrap_or(0.0) / self.total_time
    }

    /// Quantile over the time-weighted state distribution
    pub fn quantile(&self, p: f64) -> Quantile {
        let tracked: f64 = self.density.iter().sum::<f64>() + self.overflow_time;
        if tracked <= 0.0 {
            return Quantile {
                p,
                value: 0.0,
                hit_max: false,
            };
        }

        if !(p > 0.0) {
            return Quantile {
                p,
                value: self.min,
                hit_max: false,
            };
        }

        let target = tracked * p.min(1.0);
        let mut cumulative = 0.0;
        for (state, &time) in self.density.iter().enumerate() {
            cumulative += time;
            if cumulative >= target {
                return Quantile {
                    p,
                    value: state as f64,
                    hit_max: false,
                };
            }
        }

        Quantile {
            p,
            value: (self.density.len() - 1) as f64,
            hit_max: true,
        }
    }

    /// Time share of states 0..=k
    ///
    /// # Example
    ///
    /// ```rust
    /// use queuesim_core_rs::TimeIndicator;
    ///
    /// let mut wip = TimeIndicator::default();
    /// wip.record(0.0, 5.0);
    /// wip.record(1.0, 3.0);
    /// wip.record(9.0, 2.0);
    ///
    /// let short = wip.short_distribution(2);
    /// assert_eq!(short.parts, vec![0.5, 0.3, 0.0]);
    /// assert!(short.truncated);
    /// ```
    pub fn short_distribution(&self, k: usize) -> ShortDistribution {
        let parts = (0..=k).map(|state| self.share_of(state)).collect();
        let beyond: f64 = self.density.iter().skip(k + 1).sum::<f64>() + self.overflow_time;
        ShortDistribution {
            parts,
            truncated: beyond > 0.0,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let (skewness, kurtosis) = self.shape();
        Snapshot {
            count: self.count,
            mean: self.time_mean(),
            sd: self.sd(),
            variance: self.variance(),
            cv: self.cv(),
            skewness,
            kurtosis,
            min: self.min,
            max: self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_form_matches_record_form() {
        let mut by_set = TimeIndicator::default();
        by_set.set(0.0, 3.0);
        by_set.set(2.0, 1.0);
        by_set.close(10.0);

        let mut by_record = TimeIndicator::default();
        by_record.record(3.0, 2.0);
        by_record.record(1.0, 8.0);

        assert_eq!(by_set.snapshot(), by_record.snapshot());
        assert!((by_set.time_mean() - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_population_variance() {
        let mut ind = TimeIndicator::default();
        ind.record(3.0, 2.0);
        ind.record(1.0, 8.0);
        // E[x²] = (9*2 + 1*8)/10 = 2.6, mean² = 1.96
        assert!((ind.variance() - 0.64).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_ignored() {
        let mut ind = TimeIndicator::default();
        ind.record(5.0, 0.0);
        ind.record(5.0, -1.0);
        assert_eq!(ind.count(), 0);
        assert_eq!(ind.time_mean(), 0.0);
    }

    #[test]
    fn test_repeated_set_at_same_time_keeps_last_value() {
        let mut ind = TimeIndicator::default();
        ind.set(0.0, 1.0);
        ind.set(0.0, 4.0);
        ind.close(2.0);
        assert_eq!(ind.time_mean(), 4.0);
        assert_eq!(ind.share_of(1), 0.0);
    }

    #[test]
    fn test_quantile_and_overflow() {
        let mut ind = TimeIndicator::new(4);
        ind.record(1.0, 6.0);
        ind.record(2.0, 2.0);
        ind.record(10.0, 2.0);

        assert_eq!(ind.quantile(0.5).value, 1.0);
        assert_eq!(ind.quantile(0.75).value, 2.0);
        let high = ind.quantile(0.95);
        assert!(high.hit_max);
        assert_eq!(high.value, 4.0);
        // Moments are unaffected by the cap
        assert!((ind.time_mean() - 3.0).abs() < 1e-12);
        assert_eq!(ind.max(), 10.0);
    }

    #[test]
    fn test_quantile_at_zero_is_minimum() {
        let mut ind = TimeIndicator::new(10);
        ind.record(3.0, 1.0);
        ind.record(5.0, 3.0);
        assert_eq!(ind.quantile(0.0).value, 3.0);
        assert_eq!(ind.quantile(0.5).value, 5.0);
    }

    #[test]
    fn test_short_distribution_not_truncated() {
        let mut ind = TimeIndicator::default();
        ind.record(0.0, 1.0);
        ind.record(1.0, 1.0);
        let short = ind.short_distribution(5);
        assert_eq!(short.parts.len(), 6);
        assert!(!short.truncated);
        assert_eq!(short.parts[0], 0.5);
    }

    #[test]
    fn test_negative_values_excluded_from_density() {
        let mut ind = TimeIndicator::default();
        ind.record(-2.0, 4.0);
        ind.record(2.0, 4.0);
        assert_eq!(ind.time_mean(), 0.0);
        assert_eq!(ind.share_of(2), 0.5);
        assert_eq!(ind.quantile(0.1).value, 2.0);
    }

    #[test]
    fn test_merge() {
        let mut a = TimeIndicator::default();
        a.record(3.0, 2.0);
        let mut b = TimeIndicator::default();
        b.record(1.0, 8.0);
        a.merge(&b);
        assert!((a.time_mean() - 1.4).abs() < 1e-12);
        assert_eq!(a.total_time(), 10.0);
    }
}
