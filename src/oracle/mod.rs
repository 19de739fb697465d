//! Canonical action derivation from gold graphs
//!
//! The [`Oracle`] looks at a [`StateMachine`] building a known gold graph and
//! returns the single next action, chosen in a fixed priority order:
//!
//! 1. `ROOT` when the stack top is the gold root and no root is set
//! 2. node reduction, if configured (disabled: fails as unsupported)
//! 3. the first pending arc between the stack top and another stack node
//! 4. generation of an unrealized gold node aligned to the cursor
//! 5. `SHIFT` while tokens remain
//! 6. `CLOSE`
//!
//! Arcs are exhausted before new nodes, and node generation follows the token
//! cursor, so the derivation is monotonic in the cursor.
//!
//! - [`pending`]: per-node pending-edge lists
//! - [`check`]: comparison of a decoded graph with the gold graph

pub mod check;
pub mod pending;

use crate::errors::{AmrError, Result};
use crate::graph::gold::GoldGraph;
use crate::graph::repair::{repair_alignments, RepairReport};
use crate::machine::StateMachine;
use crate::types::{normalize, Action, Edge, GoldIdx, MachineConfig, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;

pub use check::{LabelMismatch, ReconstructionReport};
pub use pending::{align_by_token_pos, PendingEdges};

/// An action proposed by the oracle.
///
/// Node-generating actions carry the gold node they realize. The caller
/// reports the decoded id back through [`Oracle::record_generated`] once the
/// action has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAction {
    pub action: Action,
    pub gold_node: Option<GoldIdx>,
    pub score: f64,
}

impl ScoredAction {
    fn certain(action: Action) -> Self {
        Self {
            action,
            gold_node: None,
            score: 1.0,
        }
    }

    fn generating(action: Action, gold_node: GoldIdx) -> Self {
        Self {
            action,
            gold_node: Some(gold_node),
            score: 1.0,
        }
    }
}

/// Greedy oracle for one gold graph at a time
#[derive(Debug, Clone)]
pub struct Oracle {
    config: MachineConfig,
    gold: GoldGraph,
    repair: RepairReport,
    by_token_pos: BTreeMap<usize, Vec<GoldIdx>>,
    pending: PendingEdges,
    node_map: BTreeMap<GoldIdx, NodeId>,
    reverse_map: BTreeMap<NodeId, GoldIdx>,
}

impl Oracle {
    /// Create an oracle for `gold`: repairs missing alignments on a copy of
    /// the graph and builds the pending-edge index
    pub fn new(config: MachineConfig, gold: &GoldGraph) -> Result<Self> {
        if config.reduce_nodes.is_some() {
            return Err(AmrError::unsupported(
                "the oracle cannot derive node reductions",
            ));
        }
        let mut gold = gold.clone();
        let repair = repair_alignments(&mut gold);
        let by_token_pos = align_by_token_pos(&gold);
        let pending = PendingEdges::new(&gold, &by_token_pos);
        Ok(Self {
            config,
            gold,
            repair,
            by_token_pos,
            pending,
            node_map: BTreeMap::new(),
            reverse_map: BTreeMap::new(),
        })
    }

    /// Start over on another gold graph
    pub fn reset(&mut self, gold: &GoldGraph) -> Result<()> {
        *self = Self::new(self.config, gold)?;
        Ok(())
    }

    /// The repaired gold graph
    pub fn gold(&self) -> &GoldGraph {
        &self.gold
    }

    pub fn repair_report(&self) -> &RepairReport {
        &self.repair
    }

    /// Gold node → decoded node
    pub fn node_map(&self) -> &BTreeMap<GoldIdx, NodeId> {
        &self.node_map
    }

    /// Decoded node → gold node
    pub fn reverse_map(&self) -> &BTreeMap<NodeId, GoldIdx> {
        &self.reverse_map
    }

    /// Edges not produced yet
    pub fn pending(&self) -> &PendingEdges {
        &self.pending
    }

    /// Record that decoded node `node` realizes gold node `gold`
    pub fn record_generated(&mut self, gold: GoldIdx, node: NodeId) {
        self.node_map.insert(gold, node);
        self.reverse_map.insert(node, gold);
    }

    /// Ranked next actions. Always a single action with score 1.
    ///
    /// An emitted arc is removed from the pending index, so the action must be
    /// applied to `machine` before the next call.
    pub fn get_actions(&mut self, machine: &StateMachine) -> Result<Vec<ScoredAction>> {
        if self.config.reduce_nodes.is_some() {
            return Err(AmrError::unsupported(
                "the oracle cannot derive node reductions",
            ));
        }
        if machine.is_closed() {
            return Ok(Vec::new());
        }

        let top_gold = machine
            .top()
            .and_then(|top| self.reverse_map.get(&top).copied());

        if let Some(top_gold) = top_gold {
            if machine.root().is_none() && self.gold.root() == Some(top_gold) {
                return Ok(vec![ScoredAction::certain(Action::Root)]);
            }
            if machine.node_stack().len() > 1 {
                if let Some(action) = self.arc_action(machine, top_gold)? {
                    return Ok(vec![ScoredAction::certain(action)]);
                }
            }
        }

        let cursor = machine.tok_cursor();
        if let Some(candidates) = self.by_token_pos.get(&cursor) {
            for &node in candidates {
                if self.node_map.contains_key(&node) {
                    continue;
                }
                let label = normalize(self.gold.label(node));
                let copy = self.config.use_copy
                    && machine
                        .current_token()
                        .is_some_and(|token| normalize(token) == label);
                let action = if copy {
                    Action::Copy
                } else {
                    Action::Node(label)
                };
                return Ok(vec![ScoredAction::generating(action, node)]);
            }
        }

        if cursor < machine.tokens().len() {
            return Ok(vec![ScoredAction::certain(Action::Shift)]);
        }
        Ok(vec![ScoredAction::certain(Action::Close)])
    }

    /// First pending edge of the top node whose other endpoint is realized
    /// and below the top
    fn arc_action(&mut self, machine: &StateMachine, top_gold: GoldIdx) -> Result<Option<Action>> {
        let stack = machine.node_stack();
        let (top, below) = match stack.split_last() {
            Some((top, below)) => (*top, below),
            None => return Ok(None),
        };

        let mut chosen: Option<(Edge<GoldIdx>, Action)> = None;
        for edge in self.pending.of(top_gold) {
            let (Some(&source), Some(&target)) = (
                self.node_map.get(&edge.source),
                self.node_map.get(&edge.target),
            ) else {
                continue;
            };

            let (other, left) = if source == top && below.contains(&target) {
                (target, true)
            } else if target == top && below.contains(&source) {
                (source, false)
            } else {
                continue;
            };

            let pos = machine.pointer_to(other).ok_or_else(|| {
                AmrError::internal(format!("node {other} is on the stack but has no pointer"))
            })?;
            let action = if left {
                Action::left_arc(pos, edge.label.clone())
            } else {
                Action::right_arc(pos, edge.label.clone())
            };
            chosen = Some((edge.clone(), action));
            break;
        }

        Ok(chosen.map(|(edge, action)| {
            self.pending.remove(&edge);
            action
        }))
    }

    /// Compare what `machine` built with the gold graph
    pub fn reconstruction_report(&self, machine: &StateMachine) -> ReconstructionReport {
        ReconstructionReport::compare(&self.gold, &self.node_map, &machine.graph())
    }
}
