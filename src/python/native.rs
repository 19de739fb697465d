//! Native Python interface
//!
//! A `StateMachine` class a Python decoder drives one action at a time.

use crate::graph::gold::GoldGraph;
use crate::machine::{StateMachine, ValidActions};
use crate::python::to_py_err;
use crate::types::{Action, MachineConfig, NodeId, ReduceMode};
use pyo3::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn parse_reduce_mode(reduce_nodes: Option<&str>) -> PyResult<Option<ReduceMode>> {
    match reduce_nodes {
        None => Ok(None),
        Some("all") => Ok(Some(ReduceMode::All)),
        Some(other) => Err(pyo3::exceptions::PyValueError::new_err(format!(
            "Unknown reduce_nodes mode: {}",
            other
        ))),
    }
}

/// Transition state machine for one sentence at a time
#[pyclass(name = "StateMachine")]
#[derive(Clone)]
pub struct PyStateMachine {
    inner: StateMachine,
}

#[pymethods]
impl PyStateMachine {
    #[new]
    #[pyo3(signature = (
        tokens=None,
        reduce_nodes=None,
        absolute_stack_pos=false,
        use_copy=true
    ))]
    fn new(
        tokens: Option<Vec<String>>,
        reduce_nodes: Option<&str>,
        absolute_stack_pos: bool,
        use_copy: bool,
    ) -> PyResult<Self> {
        let config = MachineConfig::default()
            .with_reduce_nodes(parse_reduce_mode(reduce_nodes)?)
            .with_absolute_stack_pos(absolute_stack_pos)
            .with_use_copy(use_copy);
        let inner = match tokens {
            Some(tokens) => StateMachine::for_sentence(config, tokens),
            None => StateMachine::new(config),
        };
        Ok(Self { inner })
    }

    /// Start decoding a new sentence
    #[pyo3(signature = (tokens))]
    fn reset(&mut self, tokens: Vec<String>) {
        self.inner.reset(tokens);
    }

    /// Start a new sentence in align mode against a gold graph given as JSON
    #[pyo3(signature = (gold_json))]
    fn reset_aligned(&mut self, gold_json: &str) -> PyResult<()> {
        let gold = GoldGraph::from_json_str(gold_json).map_err(to_py_err)?;
        self.inner.reset_aligned(Arc::new(gold)).map_err(to_py_err)
    }

    /// Apply one action string
    #[pyo3(signature = (action))]
    fn update(&mut self, action: &str) -> PyResult<()> {
        let action: Action = action.parse().map_err(to_py_err)?;
        self.inner.update(action).map_err(to_py_err)
    }

    /// Valid next actions: base forms in free decoding, concrete actions in
    /// align mode
    fn get_valid_actions(&self) -> PyResult<Vec<String>> {
        Ok(match self.inner.valid_actions().map_err(to_py_err)? {
            ValidActions::Base(bases) => bases.iter().map(|b| b.as_str().to_string()).collect(),
            ValidActions::Exact(actions) => actions.iter().map(Action::to_string).collect(),
        })
    }

    #[getter]
    fn tokens(&self) -> Vec<String> {
        self.inner.tokens().to_vec()
    }

    #[getter]
    fn tok_cursor(&self) -> usize {
        self.inner.tok_cursor()
    }

    #[getter]
    fn current_token(&self) -> Option<String> {
        self.inner.current_token().map(str::to_string)
    }

    #[getter]
    fn node_stack(&self) -> Vec<NodeId> {
        self.inner.node_stack().to_vec()
    }

    #[getter]
    fn nodes(&self) -> BTreeMap<NodeId, String> {
        self.inner.nodes().clone()
    }

    /// Edges as `(source, label, target)` tuples
    #[getter]
    fn edges(&self) -> Vec<(NodeId, String, NodeId)> {
        self.inner
            .edges()
            .iter()
            .map(|e| (e.source, e.label.clone(), e.target))
            .collect()
    }

    #[getter]
    fn root(&self) -> Option<NodeId> {
        self.inner.root()
    }

    #[getter]
    fn action_history(&self) -> Vec<String> {
        self.inner
            .action_history()
            .iter()
            .map(Action::to_string)
            .collect()
    }

    #[getter]
    fn actions_tokcursor(&self) -> Vec<usize> {
        self.inner.actions_tokcursor().to_vec()
    }

    #[getter]
    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// 1 for each action-history entry whose node is still on the stack
    fn get_node_mask(&self) -> Vec<bool> {
        self.inner.node_mask()
    }

    /// The decoded graph as JSON
    fn get_graph_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner.graph())
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    /// The decoded graph mapped onto the gold graph, as JSON (align mode)
    fn get_aligned_graph_json(&self) -> PyResult<String> {
        let aligned = self.inner.aligned_graph().map_err(to_py_err)?;
        serde_json::to_string(&aligned)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "StateMachine(tokens={}, cursor={}, nodes={}, closed={})",
            self.inner.tokens().len(),
            self.inner.tok_cursor(),
            self.inner.nodes().len(),
            self.inner.is_closed()
        )
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}
