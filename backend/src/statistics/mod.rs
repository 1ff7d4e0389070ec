//! Streaming statistics
//!
//! Performance indicators that summarise a run without keeping its
//! history:
//! - [`DataIndicator`]: one observation per call (waiting time, service time)
//! - [`TimeIndicator`]: values weighted by how long they were held
//!   (clients in system, queue length, tank level)
//!
//! Both record in O(1) and answer quantile queries from a bounded density
//! histogram. Quantiles above the histogram cap come back as the cap value
//! with `hit_max` set, to be read as "at least this much".
//!
//! # Conventions
//!
//! - `DataIndicator::variance` is the sample variance (n - 1)
//! - `TimeIndicator::variance` is the time-weighted population variance
//! - Skewness and kurtosis are population moment ratios; kurtosis is the
//!   excess kurtosis (0 for a normal distribution)

pub mod data;
pub mod time;

pub use data::DataIndicator;
pub use time::{ShortDistribution, TimeIndicator};

use serde::Serialize;

/// Quantile levels included in run reports
pub const REPORT_QUANTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Point-in-time summary of an indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub count: u64,
    pub mean: f64,
    pub sd: f64,
    pub variance: f64,
    pub cv: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub min: f64,
    pub max: f64,
}

/// Quantile estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantile {
    pub p: f64,
    pub value: f64,
    /// The estimate is the histogram cap; the true quantile is at least `value`
    pub hit_max: bool,
}

/// Skewness and excess kurtosis from the raw moments E[x]..E[x⁴]
fn moment_shape(m1: f64, m2: f64, m3: f64, m4: f64) -> (f64, f64) {
    let variance = m2 - m1 * m1;
    if variance <= 1e-12 * m2.abs().max(1.0) {
        return (0.0, 0.0);
    }
    let central3 = m3 - 3.0 * m1 * m2 + 2.0 * m1.powi(3);
    let central4 = m4 - 4.0 * m1 * m3 + 6.0 * m1 * m1 * m2 - 3.0 * m1.powi(4);
    let skewness = central3 / variance.powf(1.5);
    let kurtosis = central4 / (variance * variance) - 3.0;
    (skewness, kurtosis)
}
