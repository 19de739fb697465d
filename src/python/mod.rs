//! Python bindings via PyO3
//!
//! This module provides the Python interface for transition_amr: a native
//! `StateMachine` class for step-by-step decoding, and JSON functions for
//! whole-sentence oracle runs and replays.

pub mod json;
pub mod native;

use crate::errors::AmrError;
use pyo3::exceptions::{PyNotImplementedError, PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

/// Map a library error onto the closest Python exception
pub(crate) fn to_py_err(err: AmrError) -> PyErr {
    match &err {
        AmrError::Unsupported { .. } => PyNotImplementedError::new_err(err.to_string()),
        AmrError::Io { .. } => PyOSError::new_err(err.to_string()),
        AmrError::TrackerInvariant { .. } | AmrError::Internal { .. } => {
            PyRuntimeError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Register all Python classes and functions
pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Version
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    // Native interface
    m.add_class::<native::PyStateMachine>()?;

    // JSON interface functions
    m.add_function(wrap_pyfunction!(json::oracle_from_json, m)?)?;
    m.add_function(wrap_pyfunction!(json::oracle_batch_from_json, m)?)?;
    m.add_function(wrap_pyfunction!(json::replay_from_json, m)?)?;
    m.add_function(wrap_pyfunction!(json::base_action, m)?)?;

    Ok(())
}
