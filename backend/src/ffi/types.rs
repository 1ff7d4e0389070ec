//! Conversions between Python values and engine types

use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::orchestrator::{ModelConfig, SimulationError, StepOutcome};

/// Parse a model description from its JSON text
///
/// # Errors
///
/// Raises ValueError when the JSON is malformed or does not describe a
/// model.
pub fn parse_model_config(config_json: &str) -> PyResult<ModelConfig> {
    serde_json::from_str(config_json).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Invalid model configuration: {}", e))
    })
}

/// Map an engine error to a Python exception
///
/// Model problems become ValueError; failures during a run become
/// RuntimeError.
pub fn simulation_error_to_py(err: SimulationError) -> PyErr {
    match err {
        SimulationError::InvalidModel(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(err.to_string())
        }
        SimulationError::Fatal { .. } => {
            PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(err.to_string())
        }
    }
}

pub fn json_error_to_py(err: serde_json::Error) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("Failed to serialize: {}", err))
}

/// Convert a step outcome to a Python dict
///
/// `{"finished": False, "time": t, "event": name}` after a dispatched
/// event, `{"finished": True, "reason": reason}` once the run has ended.
pub fn step_outcome_to_py(py: Python, outcome: &StepOutcome) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    match outcome {
        StepOutcome::Dispatched { time, event } => {
            dict.set_item("finished", false)?;
            dict.set_item("time", *time)?;
            dict.set_item("event", *event)?;
        }
        StepOutcome::Finished(reason) => {
            dict.set_item("finished", true)?;
            dict.set_item("reason", reason.to_string())?;
        }
    }
    Ok(dict.unbind())
}
