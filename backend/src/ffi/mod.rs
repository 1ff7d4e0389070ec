//! Python bindings (feature `pyo3`)

pub mod simulation;
pub mod types;
