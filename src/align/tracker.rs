//! Online correspondence between decoded and gold nodes
//!
//! Decoded nodes are produced by label only, so when a label occurs several
//! times in the gold graph the tracker cannot tell at creation time which
//! gold node a decoded node stands for. It keeps two tables keyed by
//! normalized label:
//!
//! - `gold_id_map`: resolved pairs, positionally aligned (`gold[i]` is
//!   realized by `decoded[i]`); a gold id past the end of `decoded` is still
//!   to be generated
//! - `ambiguous`: gold ids and decoded ids of a shared label whose pairing is
//!   not known yet
//!
//! After every transition the tracker registers new decoded nodes, pins the
//! decoded root to the gold root, resolves pairs through edges to already
//! resolved neighbours and through identifying neighbourhood signatures, then
//! works out which gold edges are still missing and producible from the
//! current stack top. An arc is offered only when some assignment of the
//! unresolved nodes still maps every decoded edge onto a gold edge.

use crate::align::matching::Matching;
use crate::align::neighbours::{group_by_label, EdgeSignature, GoldNeighbours};
use crate::errors::{AmrError, Result};
use crate::graph::decoded::Graph;
use crate::graph::gold::GoldGraph;
use crate::machine::StateMachine;
use crate::oracle::check::ReconstructionReport;
use crate::types::{normalize, Action, Edge, GoldIdx, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Gold and decoded ids sharing one label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelMap {
    pub gold: Vec<GoldIdx>,
    pub decoded: Vec<NodeId>,
}

/// Borrowed view of the decoded graph the tracker follows
#[derive(Debug, Clone, Copy)]
pub struct DecodedView<'a> {
    pub nodes: &'a BTreeMap<NodeId, String>,
    pub edges: &'a [Edge<NodeId>],
    pub node_stack: &'a [NodeId],
    pub root: Option<NodeId>,
}

impl DecodedView<'_> {
    fn label(&self, node: NodeId) -> String {
        self.nodes.get(&node).map(|l| normalize(l)).unwrap_or_default()
    }

    fn has_edge(&self, source: NodeId, label: &str, target: NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.label == label)
    }

    /// Incident edges of `node` seen through labels
    fn key_edges(&self, node: NodeId) -> BTreeSet<EdgeSignature> {
        self.edges
            .iter()
            .filter(|e| e.touches(node))
            .map(|e| (self.label(e.source), e.label.clone(), self.label(e.target)))
            .collect()
    }
}

/// A gold edge that still has to be produced, with the decoded edges that
/// could realize it from the current stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEdge {
    pub gold: Edge<GoldIdx>,
    pub candidates: Vec<Edge<NodeId>>,
}

/// Decoded graph of an align-mode machine mapped onto its gold graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedGraph {
    /// The decoded graph, with the gold root filled in if ROOT was never
    /// applied
    pub graph: Graph,
    pub decoded_to_gold: BTreeMap<NodeId, GoldIdx>,
    pub report: ReconstructionReport,
}

/// Align-mode bookkeeping for one sentence
#[derive(Debug, Clone)]
pub struct AlignTracker {
    gold: Arc<GoldGraph>,
    neighbours: GoldNeighbours,
    gold_id_map: BTreeMap<String, LabelMap>,
    ambiguous: BTreeMap<String, LabelMap>,
    registered: BTreeSet<NodeId>,
    missing_edges: Vec<MissingEdge>,
    root_offered: bool,
}

impl AlignTracker {
    pub fn new(gold: Arc<GoldGraph>) -> Self {
        let mut gold_id_map = BTreeMap::new();
        let mut ambiguous = BTreeMap::new();
        for (label, nodes) in group_by_label(&gold) {
            let entry = LabelMap {
                gold: nodes,
                decoded: Vec::new(),
            };
            if entry.gold.len() == 1 {
                gold_id_map.insert(label, entry);
            } else {
                ambiguous.insert(label, entry);
            }
        }

        Self {
            neighbours: GoldNeighbours::new(&gold),
            gold,
            gold_id_map,
            ambiguous,
            registered: BTreeSet::new(),
            missing_edges: Vec::new(),
            root_offered: false,
        }
    }

    pub fn gold(&self) -> &GoldGraph {
        &self.gold
    }

    /// Resolved pairs by label
    pub fn gold_id_map(&self) -> &BTreeMap<String, LabelMap> {
        &self.gold_id_map
    }

    /// Unresolved ids by label
    pub fn ambiguous(&self) -> &BTreeMap<String, LabelMap> {
        &self.ambiguous
    }

    /// Gold edges still to be produced from the current stack
    pub fn missing_edges(&self) -> &[MissingEdge] {
        &self.missing_edges
    }

    /// Resolved decoded → gold pairs
    pub fn flat_map(&self) -> BTreeMap<NodeId, GoldIdx> {
        self.gold_id_map
            .values()
            .flat_map(|m| m.decoded.iter().copied().zip(m.gold.iter().copied()))
            .collect()
    }

    /// Every decoded node a gold node may correspond to: its resolved
    /// partner, or all decoded nodes of its label while still ambiguous
    pub fn reverse_ambiguous_map(&self) -> BTreeMap<GoldIdx, Vec<NodeId>> {
        let mut reverse: BTreeMap<GoldIdx, Vec<NodeId>> = BTreeMap::new();
        for m in self.gold_id_map.values() {
            for (&g, &d) in m.gold.iter().zip(&m.decoded) {
                reverse.insert(g, vec![d]);
            }
        }
        for m in self.ambiguous.values() {
            if m.decoded.is_empty() {
                continue;
            }
            for &g in &m.gold {
                reverse.insert(g, m.decoded.clone());
            }
        }
        reverse
    }

    /// Labels with gold nodes not generated yet, resolved table first
    pub fn missing_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for (label, m) in self.gold_id_map.iter().chain(self.ambiguous.iter()) {
            if m.gold.len() > m.decoded.len() && !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Follow the decoded graph after a transition
    pub fn update(&mut self, view: &DecodedView<'_>) -> Result<()> {
        self.register(view)?;
        self.anchor_root(view)?;
        loop {
            let propagated = self.propagate(view)?;
            let identified = self.disambiguate(view)?;
            if !(propagated || identified) {
                break;
            }
        }
        if !self.matching(view.edges).admits() {
            return Err(AmrError::tracker_invariant(
                "decoded edges fit no assignment onto the gold graph",
            ));
        }
        self.root_offered = self.root_candidate(view);
        self.cluster_edges(view)
    }

    /// Resolved pairs fixed, ambiguous decoded nodes open over the gold ids
    /// of their label
    fn matching(&self, edges: &[Edge<NodeId>]) -> Matching<'_> {
        let open = self
            .ambiguous
            .values()
            .flat_map(|m| m.decoded.iter().map(|&d| (d, m.gold.clone())))
            .collect();
        Matching::new(&self.gold, self.flat_map(), open, edges)
    }

    /// File new decoded nodes under their label
    fn register(&mut self, view: &DecodedView<'_>) -> Result<()> {
        for &node in view.nodes.keys() {
            if self.registered.contains(&node) {
                continue;
            }
            let label = view.label(node);
            if let Some(entry) = self.ambiguous.get_mut(&label) {
                entry.decoded.push(node);
            } else if let Some(entry) = self.gold_id_map.get_mut(&label) {
                if entry.decoded.len() >= entry.gold.len() {
                    return Err(AmrError::tracker_invariant(format!(
                        "decoded node {node} is one '{label}' more than the gold graph has"
                    )));
                }
                entry.decoded.push(node);
            } else {
                return Err(AmrError::tracker_invariant(format!(
                    "decoded node {node} has label '{label}', which is not in the gold graph"
                )));
            }
            self.registered.insert(node);
        }
        Ok(())
    }

    /// The decoded root stands for the gold root
    fn anchor_root(&mut self, view: &DecodedView<'_>) -> Result<()> {
        let (Some(node), Some(gold_root)) = (view.root, self.gold.root()) else {
            return Ok(());
        };
        match self.flat_map().get(&node) {
            Some(&g) if g == gold_root => Ok(()),
            Some(&g) => Err(AmrError::tracker_invariant(format!(
                "decoded root {node} stands for '{}', not the gold root '{}'",
                self.gold.id(g),
                self.gold.id(gold_root)
            ))),
            None => {
                let label = view.label(node);
                self.resolve(&label, gold_root, node)?;
                self.last_one_standing(&label)
            }
        }
    }

    /// ROOT fits when no root is set and the top may stand for the gold root
    fn root_candidate(&self, view: &DecodedView<'_>) -> bool {
        if view.root.is_some() {
            return false;
        }
        let (Some(&top), Some(root)) = (view.node_stack.last(), self.gold.root()) else {
            return false;
        };
        if let Some(&g) = self.flat_map().get(&top) {
            return g == root;
        }
        self.reverse_ambiguous_map()
            .get(&root)
            .is_some_and(|nodes| nodes.contains(&top))
            && self.matching(view.edges).with_pair(top, root).admits()
    }

    /// Resolve nodes reached by an edge from a resolved node, when exactly
    /// one unresolved gold neighbour fits the label and relation. Runs to a
    /// fixed point.
    fn propagate(&mut self, view: &DecodedView<'_>) -> Result<bool> {
        let mut progress = false;
        loop {
            let resolved = self.flat_map();
            let mut found = None;
            for edge in view.edges {
                let step = match (resolved.get(&edge.source), resolved.get(&edge.target)) {
                    (Some(&gold_source), None) => self
                        .unique_neighbour(view, gold_source, &edge.label, edge.target, true)?
                        .map(|g| (g, edge.target)),
                    (None, Some(&gold_target)) => self
                        .unique_neighbour(view, gold_target, &edge.label, edge.source, false)?
                        .map(|g| (g, edge.source)),
                    _ => None,
                };
                if step.is_some() {
                    found = step;
                    break;
                }
            }

            match found {
                Some((gold_node, node)) => {
                    let label = view.label(node);
                    self.resolve(&label, gold_node, node)?;
                    self.last_one_standing(&label)?;
                    progress = true;
                }
                None => return Ok(progress),
            }
        }
    }

    /// The only gold child (or parent) of `anchor` over `relation` whose label
    /// is the label of decoded node `node`
    fn unique_neighbour(
        &self,
        view: &DecodedView<'_>,
        anchor: GoldIdx,
        relation: &str,
        node: NodeId,
        outgoing: bool,
    ) -> Result<Option<GoldIdx>> {
        let label = view.label(node);
        let fits = |&(candidate, rel): &(GoldIdx, &str)| {
            rel == relation && normalize(self.gold.label(candidate)) == label
        };
        let candidates: Vec<GoldIdx> = if outgoing {
            self.gold.children(anchor).filter(fits).map(|(n, _)| n).collect()
        } else {
            self.gold.parents(anchor).filter(fits).map(|(n, _)| n).collect()
        };

        if candidates.is_empty() {
            return Ok(None);
        }
        let pending: Vec<GoldIdx> = candidates
            .iter()
            .copied()
            .filter(|g| self.ambiguous.get(&label).is_some_and(|m| m.gold.contains(g)))
            .collect();
        match pending[..] {
            [] => Err(AmrError::tracker_invariant(format!(
                "every gold '{label}' reached from decoded node {node} is already resolved"
            ))),
            [candidate] => Ok(Some(candidate)),
            _ => Ok(None),
        }
    }

    /// Resolve labels through identifying neighbourhood signatures, one pair
    /// at a time: each resolution narrows the gold ids a signature has to
    /// tell apart
    fn disambiguate(&mut self, view: &DecodedView<'_>) -> Result<bool> {
        let mut progress = false;
        while let Some((label, gold_node, node)) = self.identified_pair(view)? {
            self.resolve(&label, gold_node, node)?;
            self.last_one_standing(&label)?;
            progress = true;
        }

        let labels: Vec<String> = self.ambiguous.keys().cloned().collect();
        for label in labels {
            self.last_one_standing(&label)?;
        }
        Ok(progress)
    }

    /// First decoded node whose incident edges single out one unresolved
    /// gold node of its label
    fn identified_pair(
        &self,
        view: &DecodedView<'_>,
    ) -> Result<Option<(String, GoldIdx, NodeId)>> {
        for (label, entry) in &self.ambiguous {
            if entry.gold.len() < 2 {
                continue;
            }
            for &node in &entry.decoded {
                let key = view.key_edges(node);
                if key.is_empty() {
                    continue;
                }
                let hits: Vec<GoldIdx> = entry
                    .gold
                    .iter()
                    .copied()
                    .filter(|&g| self.neighbours.identifies(g, &entry.gold, &key))
                    .collect();
                match hits[..] {
                    [] => {}
                    [gold_node] => return Ok(Some((label.clone(), gold_node, node))),
                    _ => {
                        return Err(AmrError::tracker_invariant(format!(
                            "decoded '{label}' node {node} is identified with {} gold nodes",
                            hits.len()
                        )))
                    }
                }
            }
        }
        Ok(None)
    }

    /// Move a pair from the ambiguous table to the resolved one
    fn resolve(&mut self, label: &str, gold_node: GoldIdx, node: NodeId) -> Result<()> {
        let entry = self.ambiguous.get_mut(label).ok_or_else(|| {
            AmrError::tracker_invariant(format!("label '{label}' is not ambiguous"))
        })?;
        let gold_pos = entry.gold.iter().position(|&g| g == gold_node);
        let node_pos = entry.decoded.iter().position(|&d| d == node);
        let (Some(gold_pos), Some(node_pos)) = (gold_pos, node_pos) else {
            return Err(AmrError::tracker_invariant(format!(
                "cannot pair decoded node {node} with gold node '{}' under '{label}'",
                self.gold.id(gold_node)
            )));
        };
        entry.gold.remove(gold_pos);
        entry.decoded.remove(node_pos);

        if entry.gold.is_empty() {
            if !entry.decoded.is_empty() {
                return Err(AmrError::tracker_invariant(format!(
                    "more decoded '{label}' nodes than gold ones"
                )));
            }
            self.ambiguous.remove(label);
        }

        let resolved = self.gold_id_map.entry(label.to_string()).or_default();
        resolved.gold.push(gold_node);
        resolved.decoded.push(node);
        Ok(())
    }

    /// A single unresolved gold id left for a label is resolved by
    /// elimination
    fn last_one_standing(&mut self, label: &str) -> Result<()> {
        let (gold_node, decoded) = match self.ambiguous.get(label) {
            Some(entry) if entry.gold.len() == 1 => (entry.gold[0], entry.decoded.clone()),
            _ => return Ok(()),
        };

        match decoded[..] {
            [] => {
                self.ambiguous.remove(label);
                self.gold_id_map
                    .entry(label.to_string())
                    .or_default()
                    .gold
                    .push(gold_node);
                Ok(())
            }
            [node] => self.resolve(label, gold_node, node),
            _ => Err(AmrError::tracker_invariant(format!(
                "{} decoded '{label}' nodes left for a single gold node",
                decoded.len()
            ))),
        }
    }

    /// Gold edges producible from the current top, each with the decoded
    /// arcs that may realize it. An arc is kept when some assignment of the
    /// unresolved nodes maps it, and every decoded edge so far, onto distinct
    /// gold edges; a gold edge without such an arc is covered or out of
    /// reach.
    fn cluster_edges(&mut self, view: &DecodedView<'_>) -> Result<()> {
        self.missing_edges.clear();
        let Some((&top, below)) = view.node_stack.split_last() else {
            return Ok(());
        };
        if below.is_empty() {
            return Ok(());
        }

        let candidates = self.reverse_ambiguous_map();
        let matching = self.matching(view.edges);
        let mut missing = Vec::new();

        for edge in self.gold.edges() {
            let (Some(sources), Some(targets)) =
                (candidates.get(&edge.source), candidates.get(&edge.target))
            else {
                continue;
            };

            let mut options = Vec::new();
            for &source in sources {
                for &target in targets {
                    let producible = source != target
                        && ((target == top && below.contains(&source))
                            || (source == top && below.contains(&target)));
                    if !producible || view.has_edge(source, &edge.label, target) {
                        continue;
                    }
                    let arc = Edge::new(source, edge.label.clone(), target);
                    if matching.clone().with_edge(arc.clone()).admits() {
                        options.push(arc);
                    }
                }
            }

            if !options.is_empty() {
                missing.push(MissingEdge {
                    gold: edge.clone(),
                    candidates: options,
                });
            }
        }

        self.missing_edges = missing;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Menu
    // ------------------------------------------------------------------------

    /// Actions that keep `machine` on the gold graph.
    ///
    /// ROOT comes first when the stack top may be the gold root. Missing arcs take
    /// precedence over everything else, in gold edge order and, per edge, by
    /// ascending id of the non-top endpoint. Without arcs the menu holds the
    /// labels still to generate and SHIFT; CLOSE when nothing else is left.
    pub fn valid_actions(&self, machine: &StateMachine) -> Result<Vec<Action>> {
        let mut menu = Vec::new();
        let top = machine.top();

        if self.root_offered && machine.root().is_none() {
            menu.push(Action::Root);
        }

        let mut arcs: Vec<Action> = Vec::new();
        if let Some(top) = top {
            for missing in &self.missing_edges {
                let mut options: Vec<(NodeId, Action)> = Vec::new();
                for candidate in &missing.candidates {
                    let right = candidate.target == top;
                    let other = if right { candidate.source } else { candidate.target };
                    let pos = machine.pointer_to(other).ok_or_else(|| {
                        AmrError::internal(format!("node {other} is on the stack but has no pointer"))
                    })?;
                    let action = if right {
                        Action::right_arc(pos, candidate.label.clone())
                    } else {
                        Action::left_arc(pos, candidate.label.clone())
                    };
                    options.push((other, action));
                }
                options.sort_by_key(|(other, _)| *other);
                for (_, action) in options {
                    if !arcs.contains(&action) {
                        arcs.push(action);
                    }
                }
            }
        }
        if !arcs.is_empty() {
            menu.extend(arcs);
            return Ok(menu);
        }

        let token = machine.current_token().map(normalize);
        for label in self.missing_labels() {
            let action = if machine.config().use_copy && token.as_deref() == Some(label.as_str()) {
                Action::Copy
            } else {
                Action::Node(label)
            };
            if !menu.contains(&action) {
                menu.push(action);
            }
        }
        if machine.tok_cursor() < machine.tokens().len() {
            menu.push(Action::Shift);
        }

        if menu.is_empty() {
            menu.push(Action::Close);
        }
        Ok(menu)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Map a finished decoded graph onto the gold graph.
    ///
    /// Pairs still ambiguous are matched so that as many decoded edges as
    /// possible, and the root, agree with the gold graph.
    pub fn aligned_graph(&self, mut graph: Graph) -> Result<AlignedGraph> {
        let decoded_to_gold = self.matching(&graph.edges).with_root(graph.root).best();
        if let Some(node) = graph.nodes.keys().find(|n| !decoded_to_gold.contains_key(*n)) {
            return Err(AmrError::tracker_invariant(format!(
                "decoded node {node} has no gold counterpart"
            )));
        }

        let node_map: BTreeMap<GoldIdx, NodeId> =
            decoded_to_gold.iter().map(|(&d, &g)| (g, d)).collect();
        if graph.root.is_none() {
            graph.root = self.gold.root().and_then(|root| node_map.get(&root).copied());
        }
        let report = ReconstructionReport::compare(&self.gold, &node_map, &graph);

        Ok(AlignedGraph {
            graph,
            decoded_to_gold,
            report,
        })
    }
}
