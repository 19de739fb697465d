//! Pending-edge index for the oracle
//!
//! Every gold edge is listed under both of its endpoints until the oracle
//! emits the arc that creates it. Nodes are numbered in token-position order
//! and each node's list is sorted by the number of the opposite endpoint,
//! highest first.

use crate::graph::gold::GoldGraph;
use crate::types::{normalize, Edge, GoldIdx};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Gold nodes grouped by the token position that generates them.
///
/// A node is listed under every aligned position whose token equals its
/// normalized label; if none does, under its first aligned position. Nodes
/// without alignment are not listed (run the alignment repair first).
pub fn align_by_token_pos(gold: &GoldGraph) -> BTreeMap<usize, Vec<GoldIdx>> {
    let mut by_pos: BTreeMap<usize, Vec<GoldIdx>> = BTreeMap::new();
    for node in gold.node_indices() {
        let Some(positions) = gold.alignment(node) else {
            continue;
        };
        let label = normalize(gold.label(node));
        let mut matched = false;
        for &pos in positions {
            if gold.tokens()[pos] == label {
                by_pos.entry(pos).or_default().push(node);
                matched = true;
            }
        }
        if !matched {
            if let Some(&first) = positions.first() {
                by_pos.entry(first).or_default().push(node);
            }
        }
    }
    by_pos
}

/// Edges not yet produced, indexed by endpoint
#[derive(Debug, Clone, Default)]
pub struct PendingEdges {
    by_node: FxHashMap<GoldIdx, Vec<Edge<GoldIdx>>>,
}

impl PendingEdges {
    /// Build the index for `gold` given its token-position grouping
    pub fn new(gold: &GoldGraph, by_pos: &BTreeMap<usize, Vec<GoldIdx>>) -> Self {
        // a node listed twice keeps the number of its last listing
        let mut number: FxHashMap<GoldIdx, usize> = FxHashMap::default();
        for nodes in by_pos.values() {
            for &node in nodes {
                let next = number.len();
                number.insert(node, next);
            }
        }

        let mut unsorted: FxHashMap<GoldIdx, Vec<Edge<GoldIdx>>> = FxHashMap::default();
        for edge in gold.edges() {
            unsorted.entry(edge.source).or_default().push(edge.clone());
            unsorted.entry(edge.target).or_default().push(edge.clone());
        }

        let by_node = unsorted
            .into_iter()
            .map(|(node, edges)| {
                let mut keyed: Vec<(usize, usize, Edge<GoldIdx>)> = edges
                    .into_iter()
                    .enumerate()
                    .map(|(idx, edge)| {
                        let other = edge.other(node);
                        (number.get(&other).copied().unwrap_or(0), idx, edge)
                    })
                    .collect();
                keyed.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
                (node, keyed.into_iter().map(|(_, _, edge)| edge).collect())
            })
            .collect();

        Self { by_node }
    }

    /// Pending edges of a node, in emission priority order
    pub fn of(&self, node: GoldIdx) -> &[Edge<GoldIdx>] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop the first occurrence of `edge` from both endpoints' lists
    pub fn remove(&mut self, edge: &Edge<GoldIdx>) {
        for node in [edge.source, edge.target] {
            if let Some(list) = self.by_node.get_mut(&node) {
                if let Some(idx) = list.iter().position(|e| e == edge) {
                    list.remove(idx);
                }
            }
        }
    }

    /// Total number of edges still pending
    pub fn len(&self) -> usize {
        // listed once per endpoint; self-loops twice under the same node
        self.by_node.values().map(Vec::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.values().all(Vec::is_empty)
    }
}
