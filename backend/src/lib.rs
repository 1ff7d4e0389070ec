//! Queue Simulator Core - Rust Engine
//!
//! Discrete-event simulation of queueing networks with deterministic
//! execution.
//!
//! # Architecture
//!
//! - **core**: Simulated time and time bases
//! - **rng**: Deterministic random number generation
//! - **expression**: Formula language for assignments, conditions and rates
//! - **statistics**: Streaming data and time-weighted indicators
//! - **models**: Domain types (Client, SystemState, Event)
//! - **arrivals**: Distributions and arrival streams
//! - **routing**: Destination selection at decide stations
//! - **continuous**: Tanks and analog values
//! - **feed**: Table-driven input with end-of-data policies
//! - **events**: Future event list
//! - **orchestrator**: Model compilation, run loop, reports, replications
//!
//! # Critical Invariants
//!
//! 1. Simulated time never moves backwards
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Events at the same instant fire in the order they were scheduled
//! 4. FFI boundary is minimal and safe

// Module declarations
pub mod arrivals;
pub mod continuous;
pub mod core;
pub mod events;
pub mod expression;
pub mod feed;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod routing;
pub mod statistics;

// Re-exports for convenience
pub use arrivals::{ArrivalConfig, Distribution};
pub use continuous::{ContinuousConfig, ContinuousState, DisplayCell};
pub use crate::core::time::{SimClock, TimeBase};
pub use expression::{check, EvalContext, Expression, Value};
pub use feed::{EofPolicy, FeedCursor, FeedRead};
pub use models::{
    client::Client,
    event::{Event, EventLog},
    state::{SystemState, VariableEnvironment},
    station::StationId,
};
pub use orchestrator::{
    compile, run_replications, CancelToken, CompiledModel, ConfigError, ModelConfig, RunReport,
    Simulation, SimulationError, StepOutcome, TerminationReason,
};
pub use rng::RngManager;
pub use routing::{Router, RoutingPolicy, RoutingPolicyConfig, TieBreak};
pub use statistics::{DataIndicator, TimeIndicator};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn queuesim_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::simulation::PySimulation>()?;
    m.add_function(wrap_pyfunction!(ffi::simulation::validate_model, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::simulation::run_replications, m)?)?;
    Ok(())
}
