//! JSON interface for whole sentences and batches
//!
//! Gold graphs and action sequences cross the boundary as JSON strings, so a
//! corpus can be processed with one call per sentence (or one per batch)
//! instead of one per action.

use crate::graph::gold::GoldGraph;
use crate::pipeline::{derive_actions, derive_corpus, replay, OracleRun};
use crate::python::to_py_err;
use crate::types::{base_action as canonical_base, Action, MachineConfig};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// Oracle request: a gold graph and an optional machine config
#[derive(Debug, Clone, Deserialize)]
pub struct JsonOracleRequest {
    pub graph: GoldGraph,
    #[serde(default)]
    pub config: MachineConfig,
}

/// Batch oracle request: one config for every graph
#[derive(Debug, Clone, Deserialize)]
pub struct JsonOracleBatch {
    pub graphs: Vec<GoldGraph>,
    #[serde(default)]
    pub config: MachineConfig,
}

/// Replay request: tokens plus action strings
#[derive(Debug, Clone, Deserialize)]
pub struct JsonReplayRequest {
    pub tokens: Vec<String>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub config: MachineConfig,
}

/// One entry of a batch result
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonOracleOutcome {
    Run(OracleRun),
    Error { error: String },
}

fn invalid_json(e: serde_json::Error) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(format!("Invalid JSON: {}", e))
}

fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
}

/// Derive the oracle action sequence for one gold graph
///
/// Args:
///     json_input: JSON object `{"graph": {...}, "config": {...}}`
///
/// Returns:
///     JSON string with tokens, actions, node map and reports
#[pyfunction]
#[pyo3(signature = (json_input))]
pub fn oracle_from_json(json_input: &str) -> PyResult<String> {
    let request: JsonOracleRequest = serde_json::from_str(json_input).map_err(invalid_json)?;
    let run = derive_actions(&request.graph, request.config).map_err(to_py_err)?;
    to_json(&run)
}

/// Derive oracle sequences for many gold graphs in parallel
///
/// Args:
///     json_input: JSON object `{"graphs": [...], "config": {...}}`
///
/// Returns:
///     JSON array, one run or `{"error": ...}` per graph, in input order
#[pyfunction]
#[pyo3(signature = (json_input))]
pub fn oracle_batch_from_json(py: Python<'_>, json_input: &str) -> PyResult<String> {
    let batch: JsonOracleBatch = serde_json::from_str(json_input).map_err(invalid_json)?;
    let outcomes: Vec<JsonOracleOutcome> = py.allow_threads(|| {
        derive_corpus(&batch.graphs, batch.config)
            .into_iter()
            .map(|result| match result {
                Ok(run) => JsonOracleOutcome::Run(run),
                Err(err) => JsonOracleOutcome::Error {
                    error: err.to_string(),
                },
            })
            .collect()
    });
    to_json(&outcomes)
}

/// Rebuild the graph of an action sequence
///
/// Args:
///     json_input: JSON object `{"tokens": [...], "actions": [...], "config": {...}}`
///
/// Returns:
///     JSON string with the decoded graph
#[pyfunction]
#[pyo3(signature = (json_input))]
pub fn replay_from_json(json_input: &str) -> PyResult<String> {
    let request: JsonReplayRequest = serde_json::from_str(json_input).map_err(invalid_json)?;
    let machine = replay(request.tokens, request.actions, request.config).map_err(to_py_err)?;
    to_json(&machine.graph())
}

/// Canonical base action of an action string (`>LA(3,:ARG0)` -> `>LA`)
#[pyfunction]
#[pyo3(signature = (action))]
pub fn base_action(action: &str) -> String {
    canonical_base(action).as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "tokens": ["the", "dog", "bites"],
        "nodes": [
            {"id": "b", "label": "bite-01", "alignment": [2]},
            {"id": "d", "label": "dog", "alignment": [1]}
        ],
        "edges": [{"source": "b", "label": ":ARG0", "target": "d"}],
        "root": "b"
    }"#;

    #[test]
    fn test_oracle_request_defaults_config() {
        let json = format!(r#"{{"graph": {GRAPH}}}"#);
        let request: JsonOracleRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request.config, MachineConfig::default());
        assert_eq!(request.graph.len(), 2);
    }

    #[test]
    fn test_replay_request_parses_actions() {
        let json = r#"{
            "tokens": ["dog"],
            "actions": ["SHIFT", ">LA(0,:ARG0)", "dog"],
            "config": {"reduce_nodes": null, "absolute_stack_pos": true, "use_copy": false}
        }"#;
        let request: JsonReplayRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.actions[1], Action::left_arc(0, ":ARG0"));
        assert!(request.config.absolute_stack_pos);
        assert!(!request.config.use_copy);
    }

    #[test]
    fn test_batch_outcome_shapes() {
        let error = JsonOracleOutcome::Error {
            error: "boom".to_string(),
        };
        assert_eq!(serde_json::to_string(&error).unwrap(), r#"{"error":"boom"}"#);
    }
}
