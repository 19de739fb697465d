//! Comparison of a decoded graph against its gold graph
//!
//! Edges the bounded stack could never produce show up here as missing
//! edges. They are a coverage statistic, not an error.

use crate::graph::decoded::Graph;
use crate::graph::gold::GoldGraph;
use crate::types::{normalize, Edge, GoldIdx, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;

/// A gold node realized with a different label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelMismatch {
    pub gold: GoldIdx,
    pub node: NodeId,
    pub expected: String,
    pub found: String,
}

/// Differences between a decoded graph and the gold graph it should reproduce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconstructionReport {
    /// Gold nodes with no decoded counterpart
    pub unrealized_nodes: Vec<GoldIdx>,
    pub label_mismatches: Vec<LabelMismatch>,
    /// Gold edges not reproduced, in gold order
    pub missing_edges: Vec<Edge<GoldIdx>>,
    /// Decoded edges with no gold counterpart
    pub excess_edges: Vec<Edge<NodeId>>,
    pub root_matches: bool,
}

impl ReconstructionReport {
    /// Compare `graph` with `gold` under a gold → decoded node map
    pub fn compare(gold: &GoldGraph, node_map: &BTreeMap<GoldIdx, NodeId>, graph: &Graph) -> Self {
        let mut report = Self::default();

        for node in gold.node_indices() {
            let found = node_map
                .get(&node)
                .and_then(|&id| graph.label(id).map(|label| (id, label)));
            match found {
                None => report.unrealized_nodes.push(node),
                Some((id, label)) => {
                    if normalize(label) != normalize(gold.label(node)) {
                        report.label_mismatches.push(LabelMismatch {
                            gold: node,
                            node: id,
                            expected: gold.label(node).to_string(),
                            found: label.to_string(),
                        });
                    }
                }
            }
        }

        // multiset match: each decoded edge accounts for at most one gold edge
        let mut unmatched: Vec<Option<&Edge<NodeId>>> = graph.edges.iter().map(Some).collect();
        for edge in gold.edges() {
            let mapped = node_map
                .get(&edge.source)
                .zip(node_map.get(&edge.target));
            let hit = mapped.and_then(|(&source, &target)| {
                unmatched.iter().position(|candidate| {
                    candidate.is_some_and(|e| {
                        e.source == source && e.target == target && e.label == edge.label
                    })
                })
            });
            match hit {
                Some(idx) => unmatched[idx] = None,
                None => report.missing_edges.push(edge.clone()),
            }
        }
        report.excess_edges = unmatched.into_iter().flatten().cloned().collect();

        let mapped_root = gold.root().and_then(|root| node_map.get(&root).copied());
        report.root_matches = mapped_root == graph.root;

        report
    }

    /// Check whether the decoded graph reproduces the gold graph exactly
    pub fn is_exact(&self) -> bool {
        self.unrealized_nodes.is_empty()
            && self.label_mismatches.is_empty()
            && self.missing_edges.is_empty()
            && self.excess_edges.is_empty()
            && self.root_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::gold::GoldGraphRecord;

    fn gold() -> GoldGraph {
        GoldGraphRecord::new(["the", "dog", "bites"])
            .node("b", "bite-01", Some(vec![2]))
            .node("d", "dog", Some(vec![1]))
            .edge("b", ":ARG0", "d")
            .root("b")
            .build()
            .unwrap()
    }

    fn decoded() -> Graph {
        let mut graph = Graph::default();
        graph.nodes.insert(1, "dog".to_string());
        graph.nodes.insert(3, "bite-01".to_string());
        graph.edges.push(Edge::new(3, ":ARG0", 1));
        graph.root = Some(3);
        graph
    }

    #[test]
    fn test_exact_match() {
        let node_map = BTreeMap::from([(0, 3), (1, 1)]);
        let report = ReconstructionReport::compare(&gold(), &node_map, &decoded());
        assert!(report.is_exact(), "{report:?}");
    }

    #[test]
    fn test_differences_reported() {
        let mut graph = decoded();
        graph.edges = vec![Edge::new(1, ":ARG0", 3)];
        graph.root = None;
        graph.nodes.insert(1, "cat".to_string());

        let node_map = BTreeMap::from([(0, 3), (1, 1)]);
        let report = ReconstructionReport::compare(&gold(), &node_map, &graph);
        assert!(!report.is_exact());
        assert_eq!(report.label_mismatches.len(), 1);
        assert_eq!(report.label_mismatches[0].found, "cat");
        assert_eq!(report.missing_edges, vec![Edge::new(0, ":ARG0", 1)]);
        assert_eq!(report.excess_edges, vec![Edge::new(1, ":ARG0", 3)]);
        assert!(!report.root_matches);
    }

    #[test]
    fn test_unrealized_nodes() {
        let node_map = BTreeMap::from([(0, 3)]);
        let report = ReconstructionReport::compare(&gold(), &node_map, &decoded());
        assert_eq!(report.unrealized_nodes, vec![1]);
        assert_eq!(report.missing_edges.len(), 1);
    }
}
