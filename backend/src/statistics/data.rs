//! Discrete-sample performance indicator
//!
//! Used for waiting times, service times and residence times: one
//! `record` call per observation, O(1) work, no sample history.

use crate::statistics::{moment_shape, Quantile, Snapshot};
use serde::{Deserialize, Serialize};

/// Default upper bound of the density histogram
pub const DEFAULT_UPPER_BOUND: f64 = 1000.0;

/// Default number of histogram buckets below the upper bound
pub const DEFAULT_STEPS: usize = 1000;

/// Streaming statistics over individual observations
///
/// Keeps the first four power sums, min/max and a bounded density
/// histogram. Observations at or beyond the upper bound go to an overflow
/// bucket; the true maximum is still tracked exactly.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::DataIndicator;
///
/// let mut waiting = DataIndicator::new(100.0, 100);
/// for x in 1..=100 {
///     waiting.record(x as f64);
/// }
///
/// assert_eq!(waiting.count(), 100);
/// assert!((waiting.mean() - 50.5).abs() < 1e-12);
/// assert!((waiting.variance() - 841.666_666_666_666_6).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIndicator {
    count: u64,
    sum: f64,
    sum2: f64,
    sum3: f64,
    sum4: f64,
    min: f64,
    max: f64,
    last: f64,
    /// Width of one histogram bucket
    bucket_width: f64,
    density: Vec<u64>,
    overflow: u64,
}

impl Default for DataIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_UPPER_BOUND, DEFAULT_STEPS)
    }
}

impl DataIndicator {
    /// Create an indicator whose histogram covers `[0, upper_bound)` in
    /// `steps` buckets
    ///
    /// A non-positive bound or zero steps fall back to the defaults.
    pub fn new(upper_bound: f64, steps: usize) -> Self {
        let (upper_bound, steps) = if upper_bound > 0.0 && upper_bound.is_finite() && steps > 0 {
            (upper_bound, steps)
        } else {
            (DEFAULT_UPPER_BOUND, DEFAULT_STEPS)
        };

        Self {
            count: 0,
            sum: 0.0,
            sum2: 0.0,
            sum3: 0.0,
            sum4: 0.0,
            min: 0.0,
            max: 0.0,
            last: 0.0,
            bucket_width: upper_bound / steps as f64,
            density: vec![0; steps],
            overflow: 0,
        }
    }

    /// Record one observation
    pub fn record(&mut self, value: f64) {
        self.record_n(value, 1);
    }

    /// Record the same observation `n` times
    pub fn record_n(&mut self, value: f64, n: u64) {
        if n == 0 || !value.is_finite() {
            return;
        }

        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += n;
        self.last = value;

        let w = n as f64;
        let v2 = value * value;
        self.sum += w * value;
        self.sum2 += w * v2;
        self.sum3 += w * v2 * value;
        self.sum4 += w * v2 * v2;

        match self.bucket(value) {
            Some(i) => self.density[i] += n,
            None => self.overflow += n,
        }
    }

    /// Histogram bucket for a value, `None` if it lies beyond the cap
    ///
    /// Negative values are counted in bucket 0.
    fn bucket(&self, value: f64) -> Option<usize> {
        if value <= 0.0 {
            return Some(0);
        }
        let scaled = (value / self.bucket_width).round();
        let index = scaled as usize;
        (index < self.density.len()).then_some(index)
    }

    /// Combine the observations of another indicator into this one
    ///
    /// Histograms with different layouts are re-bucketed by bucket value.
    pub fn merge(&mut self, other: &DataIndicator) {
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
        self.sum += other.sum;
        self.sum2 += other.sum2;
        self.sum3 += other.sum3;
        self.sum4 += other.sum4;
        self.last = other.last;

        let same_layout =
            self.density.len() == other.density.len() && self.bucket_width == other.bucket_width;
        if same_layout {
            for (mine, theirs) in self.density.iter_mut().zip(&other.density) {
                *mine += theirs;
            }
            self.overflow += other.overflow;
        } else {
            for (i, &hits) in other.density.iter().enumerate() {
                if hits == 0 {
                    continue;
                }
                match self.bucket(i as f64 * other.bucket_width) {
                    Some(j) => self.density[j] += hits,
                    None => self.overflow += hits,
                }
            }
            self.overflow += other.overflow;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Sample variance (divides by n - 1)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        ((self.sum2 - self.sum * self.sum / n) / (n - 1.0)).max(0.0)
    }

    pub fn sd(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Coefficient of variation, 0 when the mean is 0
    pub fn cv(&self) -> f64 {
        let mean = self.mean();
        if mean == 0.0 {
            return 0.0;
        }
        self.sd() / mean.abs()
    }

    fn shape(&self) -> (f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let n = self.count as f64;
        moment_shape(self.sum / n, self.sum2 / n, self.sum3 / n, self.sum4 / n)
    }

    /// Population skewness
    pub fn skewness(&self) -> f64 {
        self.shape().0
    }

    /// Population excess kurtosis
    pub fn kurtosis(&self) -> f64 {
        self.shape().1
    }

    /// Whether any observation fell beyond the histogram cap
    pub fn hit_max(&self) -> bool {
        self.overflow > 0
    }

    /// Quantile estimated from the density histogram
    ///
    /// The result has bucket resolution. When the requested share lies in
    /// the overflow bucket the histogram cap is returned as a lower bound
    /// and `hit_max` is set. `p <= 0` gives the exact minimum, and no
    /// estimate lies below it.
    pub fn quantile(&self, p: f64) -> Quantile {
        if self.count == 0 {
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

        let target = self.count as f64 * p.min(1.0);
        let mut cumulative = 0u64;
        for (i, &hits) in self.density.iter().enumerate() {
            cumulative += hits;
            if cumulative as f64 >= target {
                return Quantile {
                    p,
                    value: (i as f64 * self.bucket_width).max(self.min),
                    hit_max: false,
                };
            }
        }

        Quantile {
            p,
            value: self.density.len() as f64 * self.bucket_width,
            hit_max: true,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let (skewness, kurtosis) = self.shape();
        Snapshot {
            count: self.count,
            mean: self.mean(),
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
    fn test_empty_indicator() {
        let ind = DataIndicator::default();
        assert_eq!(ind.count(), 0);
        assert_eq!(ind.mean(), 0.0);
        assert_eq!(ind.variance(), 0.0);
        assert_eq!(ind.quantile(0.5).value, 0.0);
    }

    #[test]
    fn test_single_value_has_zero_variance() {
        let mut ind = DataIndicator::default();
        ind.record(4.0);
        assert_eq!(ind.mean(), 4.0);
        assert_eq!(ind.variance(), 0.0);
        assert_eq!(ind.min(), 4.0);
        assert_eq!(ind.max(), 4.0);
    }

    #[test]
    fn test_record_n_matches_repeated_record() {
        let mut a = DataIndicator::default();
        let mut b = DataIndicator::default();
        a.record_n(2.5, 4);
        a.record(7.0);
        for _ in 0..4 {
            b.record(2.5);
        }
        b.record(7.0);
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_min_max_with_negative_values() {
        let mut ind = DataIndicator::default();
        ind.record(-3.0);
        ind.record(5.0);
        assert_eq!(ind.min(), -3.0);
        assert_eq!(ind.max(), 5.0);
        assert_eq!(ind.mean(), 1.0);
    }

    #[test]
    fn test_symmetric_sample_has_zero_skewness() {
        let mut ind = DataIndicator::default();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            ind.record(x);
        }
        assert!(ind.skewness().abs() < 1e-12);
        // Discrete uniform on 5 points: excess kurtosis -1.3
        assert!((ind.kurtosis() + 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_quantile_median() {
        let mut ind = DataIndicator::new(100.0, 100);
        for x in 1..=100 {
            ind.record(x as f64);
        }
        let median = ind.quantile(0.5);
        assert_eq!(median.value, 50.0);
        assert!(!median.hit_max);
    }

    #[test]
    fn test_quantile_at_zero_is_minimum() {
        let mut ind = DataIndicator::new(100.0, 100);
        for x in [12.0, 40.0, 75.0] {
            ind.record(x);
        }
        assert_eq!(ind.quantile(0.0).value, 12.0);
        assert_eq!(ind.quantile(-0.5).value, 12.0);
        assert_eq!(ind.quantile(0.1).value, 12.0);
    }

    #[test]
    fn test_negative_values_land_in_first_bucket() {
        let mut ind = DataIndicator::new(10.0, 10);
        ind.record(-4.0);
        ind.record(-2.0);
        ind.record(6.0);
        assert!(!ind.hit_max());
        assert_eq!(ind.quantile(0.0).value, -4.0);
        // Both negatives share bucket 0
        assert_eq!(ind.quantile(0.5).value, 0.0);
        assert_eq!(ind.quantile(1.0).value, 6.0);
    }

    #[test]
    fn test_quantile_beyond_cap_is_flagged() {
        let mut ind = DataIndicator::new(10.0, 10);
        ind.record(1.0);
        for _ in 0..9 {
            ind.record(500.0);
        }
        assert!(ind.hit_max());
        let q = ind.quantile(0.9);
        assert!(q.hit_max);
        assert_eq!(q.value, 10.0);
        // The exact maximum is kept even though the histogram is capped
        assert_eq!(ind.max(), 500.0);
        assert_eq!(ind.quantile(0.1).value, 1.0);
    }

    #[test]
    fn test_merge_equals_combined_recording() {
        let mut a = DataIndicator::new(50.0, 50);
        let mut b = DataIndicator::new(50.0, 50);
        let mut all = DataIndicator::new(50.0, 50);
        for x in 0..20 {
            let v = x as f64 * 1.5;
            if x % 2 == 0 {
                a.record(v);
            } else {
                b.record(v);
            }
            all.record(v);
        }
        a.merge(&b);
        assert_eq!(a.count(), all.count());
        assert!((a.mean() - all.mean()).abs() < 1e-12);
        assert!((a.variance() - all.variance()).abs() < 1e-9);
        assert_eq!(a.quantile(0.5), all.quantile(0.5));
        assert_eq!(a.min(), all.min());
        assert_eq!(a.max(), all.max());
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let mut ind = DataIndicator::default();
        ind.record(f64::NAN);
        ind.record(f64::INFINITY);
        assert_eq!(ind.count(), 0);
    }
}
