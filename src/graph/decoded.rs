//! Decoded graphs built by the state machine

use crate::types::{Edge, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A graph reconstructed from an action sequence.
///
/// Node ids are action-history indices, so iteration over `nodes` follows
/// creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub tokens: Vec<String>,
    pub nodes: BTreeMap<NodeId, String>,
    pub edges: Vec<Edge<NodeId>>,
    pub root: Option<NodeId>,
    pub alignments: BTreeMap<NodeId, Vec<usize>>,
}

impl Graph {
    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Label of a node
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(String::as_str)
    }

    /// Check whether an exact edge exists
    pub fn has_edge(&self, source: NodeId, label: &str, target: NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.label == label)
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
