//! xorshift64* random number generator
//!
//! Same seed → same sequence. Replications of one model derive their seeds
//! with [`RngManager::replication_seed`] so that parallel runs never share a
//! stream.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use queuesim_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let u = rng.next_f64();
/// assert!((0.0..1.0).contains(&u));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed (zero is mapped to one)
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Derive the seed of replication `index` from a base seed
    ///
    /// Uses a splitmix64 finaliser so neighbouring indices give unrelated
    /// streams.
    ///
    /// # Example
    /// ```
    /// use queuesim_core_rs::RngManager;
    ///
    /// assert_ne!(RngManager::replication_seed(7, 0), RngManager::replication_seed(7, 1));
    /// assert_eq!(RngManager::replication_seed(7, 3), RngManager::replication_seed(7, 3));
    /// ```
    pub fn replication_seed(base_seed: u64, index: u64) -> u64 {
        let mut z = base_seed.wrapping_add(index.wrapping_add(1).wrapping_mul(0x9E3779B97F4A7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Current internal state
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Uniform f64 in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Uniform index in [0, n)
    ///
    /// # Panics
    /// Panics if `n` is zero
    pub fn index(&mut self, n: usize) -> usize {
        assert!(n > 0, "cannot draw an index from an empty range");
        (self.next() % n as u64) as usize
    }

    /// Uniform f64 in [min, max)
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// Exponentially distributed value with the given mean
    pub fn exponential(&mut self, mean: f64) -> f64 {
        // 1 - u lies in (0, 1], so the logarithm is finite
        let u = 1.0 - self.next_f64();
        -mean * u.ln()
    }

    /// Standard normal draw (Box-Muller)
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Draw an index with probability proportional to `weights[i]`
    ///
    /// Returns `None` when the weights do not sum to a positive finite value.
    /// Negative entries count as zero.
    ///
    /// # Example
    /// ```
    /// use queuesim_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(1);
    /// assert_eq!(rng.weighted_index(&[0.0, 3.0, 0.0]), Some(1));
    /// assert_eq!(rng.weighted_index(&[0.0, 0.0]), None);
    /// ```
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }

        let mut target = self.next_f64() * total;
        let mut last_positive = None;
        for (i, weight) in weights.iter().enumerate() {
            let weight = weight.max(0.0);
            if weight <= 0.0 {
                continue;
            }
            last_positive = Some(i);
            if target < weight {
                return Some(i);
            }
            target -= weight;
        }

        // Rounding can leave a tiny remainder after the last bucket
        last_positive
    }
}
