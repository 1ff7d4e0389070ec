//! Deterministic random number generation
//!
//! Uses xorshift64* for fast, reproducible draws.
//! All randomness in a run (arrivals, service times, probabilistic routing,
//! random tie-breaking) goes through one `RngManager` owned by that run.

mod xorshift;

pub use xorshift::RngManager;
