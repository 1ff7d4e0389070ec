//! PyO3 wrapper for Simulation
//!
//! Models cross the boundary as JSON text and reports come back as JSON
//! text, so the Python side needs no mirror of the engine types.

use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

use super::types::{
    json_error_to_py, parse_model_config, simulation_error_to_py, step_outcome_to_py,
};
use crate::orchestrator::{
    compile, run_replications as run_rust_replications, CancelToken, Simulation as RustSimulation,
    SimulationError,
};

/// Python wrapper for a single simulation run
///
/// # Example (from Python)
///
/// ```python
/// from queuesim_core_rs import Simulation
///
/// sim = Simulation.new(json.dumps(model))
/// report = json.loads(sim.run())
/// print(report["termination"], report["clients_disposed"])
/// ```
#[pyclass(name = "Simulation")]
pub struct PySimulation {
    inner: RustSimulation,
}

#[pymethods]
impl PySimulation {
    /// Create a simulation from a JSON model description
    ///
    /// `seed` overrides the seed stored in the model.
    ///
    /// # Errors
    ///
    /// Raises ValueError if the JSON is malformed or the model does not
    /// validate.
    #[staticmethod]
    #[pyo3(signature = (config_json, seed=None))]
    fn new(config_json: &str, seed: Option<u64>) -> PyResult<Self> {
        let config = parse_model_config(config_json)?;
        let model = compile(&config).map_err(|errors| {
            simulation_error_to_py(SimulationError::InvalidModel(errors))
        })?;
        let seed = seed.unwrap_or(model.seed);
        let inner = RustSimulation::new(Arc::new(model), seed).map_err(simulation_error_to_py)?;
        Ok(PySimulation { inner })
    }

    /// Run to completion and return the report as JSON
    fn run(&mut self) -> PyResult<String> {
        let report = self.inner.run().map_err(simulation_error_to_py)?;
        report.to_json().map_err(json_error_to_py)
    }

    /// Dispatch a single event
    fn step(&mut self, py: Python) -> PyResult<Py<PyDict>> {
        let outcome = self.inner.step().map_err(simulation_error_to_py)?;
        step_outcome_to_py(py, &outcome)
    }

    /// Report for the current state as JSON
    fn report(&self) -> PyResult<String> {
        self.inner.report().to_json().map_err(json_error_to_py)
    }

    /// Recorded events as JSON (empty unless the model sets `record_events`)
    fn event_log(&self) -> PyResult<String> {
        serde_json::to_string(self.inner.event_log()).map_err(json_error_to_py)
    }

    fn now(&self) -> f64 {
        self.inner.now()
    }

    fn events_processed(&self) -> u64 {
        self.inner.events_processed()
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Global numeric variable
    fn variable(&self, name: &str) -> Option<f64> {
        self.inner.variables().number(name)
    }

    /// Current value of a tank or analog value
    fn continuous_value(&self, name: &str) -> Option<f64> {
        self.inner.continuous_value(name)
    }

    /// Stop the run before its next event
    fn cancel(&self) {
        self.inner.cancel_token().cancel();
    }
}

/// Validate a JSON model, returning the list of problems found
#[pyfunction]
pub fn validate_model(config_json: &str) -> PyResult<Vec<String>> {
    let config = parse_model_config(config_json)?;
    Ok(match compile(&config) {
        Ok(_) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    })
}

/// Run independent replications in parallel, returning the summary as JSON
///
/// The GIL is released while the replications run.
#[pyfunction]
#[pyo3(signature = (config_json, replications, seed=None))]
pub fn run_replications(
    py: Python,
    config_json: &str,
    replications: usize,
    seed: Option<u64>,
) -> PyResult<String> {
    let config = parse_model_config(config_json)?;
    let model = compile(&config).map_err(|errors| {
        simulation_error_to_py(SimulationError::InvalidModel(errors))
    })?;
    let base_seed = seed.unwrap_or(model.seed);
    let model = Arc::new(model);
    let summary = py.allow_threads(|| {
        run_rust_replications(model, replications, base_seed, &CancelToken::new())
    });
    serde_json::to_string_pretty(&summary).map_err(json_error_to_py)
}
