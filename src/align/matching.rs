//! Assignments of unresolved decoded nodes to gold nodes
//!
//! The tracker pins a decoded node to a gold node only when every
//! assignment agrees on it. A [`Matching`] searches what is left open: the
//! gold node each unresolved decoded node may still stand for, with every
//! decoded edge landing on a gold edge.

use crate::graph::gold::GoldGraph;
use crate::types::{Edge, GoldIdx, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Search steps before a matching stops. An exhausted existence search
/// answers yes; an exhausted maximization keeps the best assignment found.
const SEARCH_BUDGET: usize = 50_000;

/// Resolved pairs, open nodes with their gold candidates, and the decoded
/// edges every assignment has to respect
#[derive(Debug, Clone)]
pub struct Matching<'a> {
    gold: &'a GoldGraph,
    edges: Vec<Edge<NodeId>>,
    fixed: BTreeMap<NodeId, GoldIdx>,
    open: Vec<(NodeId, Vec<GoldIdx>)>,
    root: Option<NodeId>,
}

struct Search {
    assigned: BTreeMap<NodeId, GoldIdx>,
    used: BTreeSet<GoldIdx>,
    budget: usize,
    best: Option<(usize, BTreeMap<NodeId, GoldIdx>)>,
}

impl<'a> Matching<'a> {
    pub fn new(
        gold: &'a GoldGraph,
        fixed: BTreeMap<NodeId, GoldIdx>,
        open: Vec<(NodeId, Vec<GoldIdx>)>,
        edges: &[Edge<NodeId>],
    ) -> Self {
        Self {
            gold,
            edges: edges.to_vec(),
            fixed,
            open,
            root: None,
        }
    }

    /// Add a decoded edge
    pub fn with_edge(mut self, edge: Edge<NodeId>) -> Self {
        self.edges.push(edge);
        self
    }

    /// Require `node` to stand for `gold_node`
    pub fn with_pair(mut self, node: NodeId, gold_node: GoldIdx) -> Self {
        self.open.retain(|(n, _)| *n != node);
        for (_, candidates) in &mut self.open {
            candidates.retain(|&g| g != gold_node);
        }
        self.fixed.insert(node, gold_node);
        self
    }

    /// Decoded root, rewarded by [`Matching::best`] when it lands on the
    /// gold root
    pub fn with_root(mut self, root: Option<NodeId>) -> Self {
        self.root = root;
        self
    }

    fn holds(&self, edge: &Edge<NodeId>, assigned: &BTreeMap<NodeId, GoldIdx>) -> bool {
        match (assigned.get(&edge.source), assigned.get(&edge.target)) {
            (Some(&source), Some(&target)) => self.gold.has_edge(source, &edge.label, target),
            _ => true,
        }
    }

    /// Edges of `node` that became decidable with it and land on gold edges
    fn gain(&self, node: NodeId, assigned: &BTreeMap<NodeId, GoldIdx>) -> usize {
        let edges = self
            .edges
            .iter()
            .filter(|e| e.touches(node))
            .filter(|e| assigned.contains_key(&e.source) && assigned.contains_key(&e.target))
            .filter(|e| self.holds(e, assigned))
            .count();
        let root = self.root == Some(node)
            && self.gold.root().is_some()
            && assigned.get(&node).copied() == self.gold.root();
        edges + usize::from(root)
    }

    fn search(&self) -> Search {
        Search {
            assigned: self.fixed.clone(),
            used: self.fixed.values().copied().collect(),
            budget: SEARCH_BUDGET,
            best: None,
        }
    }

    // ------------------------------------------------------------------------
    // Existence
    // ------------------------------------------------------------------------

    /// Check whether some assignment of the open nodes maps every decoded
    /// edge onto a gold edge
    pub fn admits(&self) -> bool {
        if !self.edges.iter().all(|e| self.holds(e, &self.fixed)) {
            return false;
        }
        // nodes without edges can take any leftover gold node
        let open: Vec<&(NodeId, Vec<GoldIdx>)> = self
            .open
            .iter()
            .filter(|(n, _)| self.edges.iter().any(|e| e.touches(*n)))
            .collect();
        let mut search = self.search();
        self.extend(&open, 0, &mut search)
    }

    fn extend(&self, open: &[&(NodeId, Vec<GoldIdx>)], depth: usize, s: &mut Search) -> bool {
        let Some(entry) = open.get(depth) else {
            return true;
        };
        let node = entry.0;
        for &g in &entry.1 {
            if s.used.contains(&g) {
                continue;
            }
            if s.budget == 0 {
                tracing::debug!(node, "matching budget exhausted");
                return true;
            }
            s.budget -= 1;

            s.assigned.insert(node, g);
            let fits = self
                .edges
                .iter()
                .filter(|e| e.touches(node))
                .all(|e| self.holds(e, &s.assigned));
            if fits {
                s.used.insert(g);
                let found = self.extend(open, depth + 1, s);
                s.used.remove(&g);
                if found {
                    s.assigned.remove(&node);
                    return true;
                }
            }
            s.assigned.remove(&node);
        }
        false
    }

    // ------------------------------------------------------------------------
    // Maximization
    // ------------------------------------------------------------------------

    /// The full assignment with the most decoded edges on gold edges, and the
    /// decoded root on the gold root. Ties keep candidate order.
    pub fn best(&self) -> BTreeMap<NodeId, GoldIdx> {
        let mut search = self.search();
        self.maximize(0, 0, &mut search);
        match search.best {
            Some((_, assigned)) => assigned,
            None => self.first_free(),
        }
    }

    fn maximize(&self, depth: usize, score: usize, s: &mut Search) {
        let Some((node, candidates)) = self.open.get(depth) else {
            if s.best.as_ref().map_or(true, |(best, _)| score > *best) {
                s.best = Some((score, s.assigned.clone()));
            }
            return;
        };
        for &g in candidates {
            if s.used.contains(&g) {
                continue;
            }
            if s.budget == 0 {
                return;
            }
            s.budget -= 1;

            s.assigned.insert(*node, g);
            s.used.insert(g);
            let gain = self.gain(*node, &s.assigned);
            self.maximize(depth + 1, score + gain, s);
            s.used.remove(&g);
            s.assigned.remove(node);
        }
    }

    /// Each open node on its first unused candidate
    fn first_free(&self) -> BTreeMap<NodeId, GoldIdx> {
        let mut assigned = self.fixed.clone();
        let mut used: BTreeSet<GoldIdx> = self.fixed.values().copied().collect();
        for (node, candidates) in &self.open {
            if let Some(&g) = candidates.iter().find(|g| !used.contains(*g)) {
                used.insert(g);
                assigned.insert(*node, g);
            }
        }
        assigned
    }
}
