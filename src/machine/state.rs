//! The transition automaton
//!
//! A [`StateMachine`] holds the per-sentence state: token cursor, node stack,
//! the partial graph and the action history. Each call to
//! [`StateMachine::update`] consumes exactly one [`Action`]; preconditions are
//! checked before any state is touched, so a failed update leaves the machine
//! as it was.
//!
//! # Pointers
//!
//! Arc actions name their non-top endpoint through a pointer. With
//! `absolute_stack_pos` the pointer is the node id itself. Otherwise it counts
//! down from the element just below the stack top: `0` is the second-to-top
//! node, and the stack index is `len(stack) - pos - 2`.

use crate::align::tracker::{AlignTracker, AlignedGraph, DecodedView};
use crate::errors::{AmrError, Result};
use crate::graph::decoded::Graph;
use crate::graph::gold::GoldGraph;
use crate::machine::valid::ValidActions;
use crate::types::{normalize, Action, BaseAction, Edge, MachineConfig, NodeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unknown-word placeholder a model may emit in place of a node label
pub const UNK: &str = "<unk>";

/// Per-sentence transition state.
///
/// Plain data: cloning a machine is a full checkpoint. In align mode the gold
/// graph is shared through an [`Arc`].
#[derive(Debug, Clone)]
pub struct StateMachine {
    config: MachineConfig,
    tokens: Vec<String>,
    tok_cursor: usize,
    node_stack: Vec<NodeId>,
    nodes: BTreeMap<NodeId, String>,
    edges: Vec<Edge<NodeId>>,
    root: Option<NodeId>,
    alignments: BTreeMap<NodeId, Vec<usize>>,
    action_history: Vec<Action>,
    actions_tokcursor: Vec<usize>,
    is_closed: bool,
    tracker: Option<AlignTracker>,
}

impl StateMachine {
    /// Create a machine with no sentence loaded
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            tokens: Vec::new(),
            tok_cursor: 0,
            node_stack: Vec::new(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            root: None,
            alignments: BTreeMap::new(),
            action_history: Vec::new(),
            actions_tokcursor: Vec::new(),
            is_closed: false,
            tracker: None,
        }
    }

    /// Create a machine ready to parse `tokens`
    pub fn for_sentence<S: Into<String>>(
        config: MachineConfig,
        tokens: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut machine = Self::new(config);
        machine.reset(tokens);
        machine
    }

    /// Create an align-mode machine bound to a gold graph
    pub fn aligned(config: MachineConfig, gold: Arc<GoldGraph>) -> Result<Self> {
        let mut machine = Self::new(config);
        machine.reset_aligned(gold)?;
        Ok(machine)
    }

    /// Start a new sentence in free decoding mode
    pub fn reset<S: Into<String>>(&mut self, tokens: impl IntoIterator<Item = S>) {
        let config = self.config;
        *self = Self::new(config);
        self.tokens = tokens.into_iter().map(Into::into).collect();
    }

    /// Start a new sentence in align mode: the sentence is the gold graph's,
    /// and [`StateMachine::valid_actions`] only offers actions that keep the
    /// decoded graph on the gold one
    pub fn reset_aligned(&mut self, gold: Arc<GoldGraph>) -> Result<()> {
        self.reset(gold.tokens().iter().cloned());
        let mut tracker = AlignTracker::new(gold);
        tracker.update(&DecodedView {
            nodes: &self.nodes,
            edges: &self.edges,
            node_stack: &self.node_stack,
            root: self.root,
        })?;
        self.tracker = Some(tracker);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn tok_cursor(&self) -> usize {
        self.tok_cursor
    }

    /// Token under the cursor, `None` once the sentence is exhausted
    pub fn current_token(&self) -> Option<&str> {
        self.tokens.get(self.tok_cursor).map(String::as_str)
    }

    pub fn node_stack(&self) -> &[NodeId] {
        &self.node_stack
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, String> {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge<NodeId>] {
        &self.edges
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn alignments(&self) -> &BTreeMap<NodeId, Vec<usize>> {
        &self.alignments
    }

    pub fn action_history(&self) -> &[Action] {
        &self.action_history
    }

    /// Token cursor at the time each action in the history was applied
    pub fn actions_tokcursor(&self) -> &[usize] {
        &self.actions_tokcursor
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// The align-mode tracker, if this machine was reset against a gold graph
    pub fn tracker(&self) -> Option<&AlignTracker> {
        self.tracker.as_ref()
    }

    pub fn is_aligned(&self) -> bool {
        self.tracker.is_some()
    }

    /// Top of the node stack
    pub fn top(&self) -> Option<NodeId> {
        self.node_stack.last().copied()
    }

    /// One flag per action in the history: whether the node that action
    /// created is still on the stack
    pub fn node_mask(&self) -> Vec<bool> {
        (0..self.action_history.len())
            .map(|idx| self.node_stack.contains(&(idx as NodeId)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Pointers
    // ------------------------------------------------------------------------

    /// Resolve an arc pointer to the node it names
    pub fn resolve_pointer(&self, pos: u32) -> Result<NodeId> {
        if self.config.absolute_stack_pos {
            if self.nodes.contains_key(&pos) {
                return Ok(pos);
            }
            return Err(self.violation(format!("absolute pointer {pos} names no node")));
        }

        let len = self.node_stack.len();
        let pos = pos as usize;
        if len < 2 || pos > len - 2 {
            return Err(self.violation(format!(
                "relative pointer {pos} is out of range for a stack of {len} nodes"
            )));
        }
        Ok(self.node_stack[len - pos - 2])
    }

    /// Pointer an arc action would use to name `node` as the non-top endpoint.
    ///
    /// `None` if the node cannot be addressed (not created yet, or it is the
    /// stack top under relative pointers).
    pub fn pointer_to(&self, node: NodeId) -> Option<u32> {
        if self.config.absolute_stack_pos {
            return self.nodes.contains_key(&node).then_some(node);
        }
        let len = self.node_stack.len();
        let idx = self.node_stack.iter().position(|&n| n == node)?;
        if idx + 2 > len {
            return None;
        }
        Some((len - idx - 2) as u32)
    }

    // ------------------------------------------------------------------------
    // Valid actions
    // ------------------------------------------------------------------------

    /// Actions the machine accepts next.
    ///
    /// In free decoding only base forms are constrained. In align mode the
    /// tracker enumerates concrete actions.
    pub fn valid_actions(&self) -> Result<ValidActions> {
        if self.config.reduce_nodes.is_some() {
            return Err(AmrError::unsupported(
                "node reduction (REDUCE, REDUCE2, REDUCE3) is disabled",
            ));
        }
        if self.is_closed {
            return Ok(ValidActions::Base(Vec::new()));
        }
        if let Some(tracker) = &self.tracker {
            return Ok(ValidActions::Exact(tracker.valid_actions(self)?));
        }

        let generation: &[BaseAction] = if self.config.use_copy {
            &[BaseAction::Copy, BaseAction::Node]
        } else {
            &[BaseAction::Node]
        };

        let mut valid = Vec::new();
        if self.tok_cursor < self.tokens.len() {
            valid.push(BaseAction::Shift);
            valid.extend_from_slice(generation);
        }

        if let Some(last) = self.action_history.last().map(Action::base) {
            if last.is_node_generation() || last == BaseAction::Root || last.is_arc() {
                valid.push(BaseAction::LeftArc);
                valid.push(BaseAction::RightArc);
            }
            if last.is_node_generation() && self.root.is_none() {
                valid.push(BaseAction::Root);
            }
        }

        if self.tok_cursor == self.tokens.len() && valid.is_empty() {
            valid.push(BaseAction::Close);
        }
        Ok(ValidActions::Base(valid))
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Apply one action.
    ///
    /// In align mode the tracker is updated after the transition. A tracker
    /// failure aborts the sentence; the machine should be reset.
    pub fn update(&mut self, action: Action) -> Result<()> {
        if self.is_closed {
            return Err(self.violation(format!("action '{action}' applied to a closed machine")));
        }
        if self.tracker.is_some() {
            if let Action::Node(label) = &action {
                if label == UNK {
                    let valid = self
                        .valid_actions()?
                        .base_actions()
                        .iter()
                        .map(BaseAction::as_str)
                        .collect::<Vec<_>>()
                        .join(" ");
                    return Err(self.violation(format!(
                        "'{UNK}' cannot be decoded in align mode, valid actions: {valid}"
                    )));
                }
            }
        }

        let cursor = self.tok_cursor;
        let node_id = self.action_history.len() as NodeId;

        match &action {
            Action::Shift => {
                if cursor >= self.tokens.len() {
                    return Err(self.violation("SHIFT past the end of the sentence"));
                }
                self.tok_cursor += 1;
            }
            Action::Copy => {
                let label = match self.current_token() {
                    Some(token) => normalize(token),
                    None => return Err(self.violation("COPY with no token under the cursor")),
                };
                self.push_node(node_id, label);
            }
            Action::Node(label) => {
                self.push_node(node_id, label.clone());
            }
            Action::Root => {
                let top = self.require_top(&action)?;
                self.root = Some(top);
            }
            Action::LeftArc { pos, label } => {
                self.check_relation(label)?;
                let top = self.require_top(&action)?;
                let target = self.resolve_pointer(*pos)?;
                self.edges.push(Edge::new(top, label.clone(), target));
            }
            Action::RightArc { pos, label } => {
                self.check_relation(label)?;
                let top = self.require_top(&action)?;
                let source = self.resolve_pointer(*pos)?;
                self.edges.push(Edge::new(source, label.clone(), top));
            }
            Action::Close => {
                self.is_closed = true;
            }
            Action::Reduce | Action::Reduce2 | Action::Reduce3 => {
                return Err(AmrError::unsupported(format!(
                    "'{action}' is disabled: node reduction is not implemented"
                )));
            }
        }

        self.actions_tokcursor.push(cursor);
        self.action_history.push(action);

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.update(&DecodedView {
                nodes: &self.nodes,
                edges: &self.edges,
                node_stack: &self.node_stack,
                root: self.root,
            })?;
        }
        Ok(())
    }

    /// Apply a sequence of actions, stopping at the first failure
    pub fn apply_all<I>(&mut self, actions: I) -> Result<()>
    where
        I: IntoIterator<Item = Action>,
    {
        for action in actions {
            self.update(action)?;
        }
        Ok(())
    }

    /// Nodes generated past the end of the sentence align to its last token
    fn push_node(&mut self, id: NodeId, label: String) {
        let position = self.tok_cursor.min(self.tokens.len().saturating_sub(1));
        self.nodes.insert(id, label);
        self.node_stack.push(id);
        self.alignments.insert(id, vec![position]);
    }

    fn require_top(&self, action: &Action) -> Result<NodeId> {
        self.top()
            .ok_or_else(|| self.violation(format!("'{action}' needs a node on the stack")))
    }

    fn check_relation(&self, label: &str) -> Result<()> {
        if label.starts_with(':') {
            Ok(())
        } else {
            Err(self.violation(format!(
                "relation label '{label}' lacks its ':' marker"
            )))
        }
    }

    fn violation(&self, message: impl Into<String>) -> AmrError {
        AmrError::protocol(message, self.to_string())
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// The graph built so far
    pub fn graph(&self) -> Graph {
        Graph {
            tokens: self.tokens.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            root: self.root,
            alignments: self.alignments.clone(),
        }
    }

    /// The decoded graph with its gold correspondence (align mode only)
    pub fn aligned_graph(&self) -> Result<AlignedGraph> {
        let tracker = self.tracker.as_ref().ok_or_else(|| {
            AmrError::unsupported("aligned_graph needs a machine reset against a gold graph")
        })?;
        tracker.aligned_graph(self.graph())
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        for (idx, token) in self.tokens.iter().enumerate() {
            if idx == self.tok_cursor {
                tokens.push(format!("[{token}]"));
            } else {
                tokens.push(token.clone());
            }
        }
        if self.tok_cursor >= self.tokens.len() {
            tokens.push("[]".to_string());
        }
        writeln!(f, "tokens:  {}", tokens.join(" "))?;

        let actions: Vec<String> = self.action_history.iter().map(ToString::to_string).collect();
        writeln!(f, "actions: {}", actions.join(" "))?;
        writeln!(f, "cursor:  {}", self.tok_cursor)?;
        writeln!(f, "stack:   {:?}", self.node_stack)?;

        let nodes: Vec<String> = self
            .nodes
            .iter()
            .map(|(id, label)| format!("{id}/{label}"))
            .collect();
        writeln!(f, "nodes:   {}", nodes.join(" "))?;

        let edges: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("{} {} {}", e.source, e.label, e.target))
            .collect();
        writeln!(f, "edges:   {}", edges.join(", "))?;

        match self.root {
            Some(root) => write!(f, "root:    {root}"),
            None => write!(f, "root:    -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReduceMode;

    fn bites(config: MachineConfig) -> StateMachine {
        StateMachine::for_sentence(config, ["the", "dog", "bites"])
    }

    fn parse_all(actions: &[&str]) -> Vec<Action> {
        actions.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_replay_builds_graph() {
        let mut machine = bites(MachineConfig::default());
        machine
            .apply_all(parse_all(&[
                "SHIFT", "dog", "SHIFT", "bite-01", "ROOT", ">LA(0,:ARG0)", "SHIFT", "CLOSE",
            ]))
            .unwrap();

        assert!(machine.is_closed());
        assert_eq!(machine.nodes().get(&1).map(String::as_str), Some("dog"));
        assert_eq!(machine.nodes().get(&3).map(String::as_str), Some("bite-01"));
        assert_eq!(machine.edges(), &[Edge::new(3, ":ARG0", 1)]);
        assert_eq!(machine.root(), Some(3));
        assert_eq!(machine.alignments().get(&1), Some(&vec![1]));
        assert_eq!(machine.alignments().get(&3), Some(&vec![2]));
        assert_eq!(machine.actions_tokcursor(), &[0, 1, 1, 2, 2, 2, 2, 3]);
    }

    #[test]
    fn test_absolute_pointers() {
        let config = MachineConfig::default().with_absolute_stack_pos(true);
        let mut machine = bites(config);
        machine
            .apply_all(parse_all(&["SHIFT", "dog", "SHIFT", "bite-01", ">LA(1,:ARG0)"]))
            .unwrap();
        assert_eq!(machine.edges(), &[Edge::new(3, ":ARG0", 1)]);
        assert_eq!(machine.pointer_to(1), Some(1));

        let err = machine.update(Action::left_arc(2, ":mod")).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_relative_pointer_resolution() {
        let mut machine = bites(MachineConfig::default());
        machine
            .apply_all(parse_all(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(machine.resolve_pointer(0).unwrap(), 1);
        assert_eq!(machine.resolve_pointer(1).unwrap(), 0);
        assert!(machine.resolve_pointer(2).is_err());
        assert_eq!(machine.pointer_to(0), Some(1));
        assert_eq!(machine.pointer_to(2), None);
    }

    #[test]
    fn test_right_arc() {
        let mut machine = bites(MachineConfig::default());
        machine
            .apply_all(parse_all(&["bite-01", "dog", ">RA(0,:ARG0)"]))
            .unwrap();
        assert_eq!(machine.edges(), &[Edge::new(0, ":ARG0", 1)]);
    }

    #[test]
    fn test_copy_normalizes_token() {
        let mut machine = StateMachine::for_sentence(MachineConfig::default(), ["\"Obama\""]);
        machine.update(Action::Copy).unwrap();
        assert_eq!(machine.nodes().get(&0).map(String::as_str), Some("Obama"));
    }

    #[test]
    fn test_node_ids_are_history_indices() {
        let mut machine = bites(MachineConfig::default());
        machine
            .apply_all(parse_all(&["SHIFT", "COPY", "SHIFT", "SHIFT", "bite-01"]))
            .unwrap();
        assert_eq!(machine.nodes().keys().copied().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(machine.node_mask(), vec![false, true, false, false, true]);
    }

    #[test]
    fn test_preconditions_leave_state_untouched() {
        let mut machine = bites(MachineConfig::default());
        let err = machine.update(Action::Root).unwrap_err();
        assert!(err.is_protocol_violation());
        let err = machine.update(Action::left_arc(0, ":ARG0")).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(machine.action_history().is_empty());

        machine.update(Action::node("dog")).unwrap();
        let err = machine.update(Action::left_arc(0, ":ARG0")).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        let err = machine.update(Action::left_arc(0, "ARG0")).unwrap_err();
        assert!(err.to_string().contains("':' marker"));
        assert_eq!(machine.action_history().len(), 1);
        assert!(machine.edges().is_empty());
    }

    #[test]
    fn test_shift_past_end_and_closed_machine() {
        let mut machine = StateMachine::for_sentence(MachineConfig::default(), ["hi"]);
        machine.update(Action::Shift).unwrap();
        assert!(machine.update(Action::Shift).unwrap_err().is_protocol_violation());
        assert!(machine.update(Action::Copy).unwrap_err().is_protocol_violation());

        // literal labels are still accepted at the end of the sentence
        machine.update(Action::node("hi")).unwrap();
        machine.update(Action::Close).unwrap();
        let err = machine.update(Action::Shift).unwrap_err();
        assert!(err.to_string().contains("closed machine"));
        assert!(err.to_string().contains("actions: SHIFT hi CLOSE"));
    }

    #[test]
    fn test_nodes_past_the_end_align_to_last_token() {
        let mut machine = StateMachine::for_sentence(MachineConfig::default(), ["big", "dog"]);
        machine.update(Action::Shift).unwrap();
        machine.update(Action::Shift).unwrap();
        machine.update(Action::node("dog")).unwrap();
        assert_eq!(machine.alignments().get(&2), Some(&vec![1]));
    }

    #[test]
    fn test_valid_actions_free_mode() {
        let mut machine = bites(MachineConfig::default());
        assert_eq!(
            machine.valid_actions().unwrap(),
            ValidActions::Base(vec![BaseAction::Shift, BaseAction::Copy, BaseAction::Node])
        );

        machine.update(Action::node("dog")).unwrap();
        assert_eq!(
            machine.valid_actions().unwrap(),
            ValidActions::Base(vec![
                BaseAction::Shift,
                BaseAction::Copy,
                BaseAction::Node,
                BaseAction::LeftArc,
                BaseAction::RightArc,
                BaseAction::Root,
            ])
        );

        machine.update(Action::Root).unwrap();
        let valid = machine.valid_actions().unwrap();
        assert!(valid.allows(&Action::left_arc(0, ":ARG0")));
        assert!(!valid.allows(&Action::Root));

        machine
            .apply_all(parse_all(&["SHIFT", "SHIFT", "SHIFT"]))
            .unwrap();
        assert_eq!(
            machine.valid_actions().unwrap(),
            ValidActions::Base(vec![BaseAction::Close])
        );
        machine.update(Action::Close).unwrap();
        assert!(machine.valid_actions().unwrap().is_empty());
    }

    #[test]
    fn test_valid_actions_without_copy() {
        let machine = bites(MachineConfig::default().with_use_copy(false));
        let valid = machine.valid_actions().unwrap();
        assert!(!valid.allows(&Action::Copy));
        assert!(valid.allows(&Action::node("dog")));
    }

    #[test]
    fn test_reduce_is_unsupported() {
        let config = MachineConfig::default().with_reduce_nodes(Some(ReduceMode::All));
        let mut machine = bites(config);
        assert!(matches!(
            machine.valid_actions(),
            Err(AmrError::Unsupported { .. })
        ));
        machine.update(Action::node("dog")).unwrap();
        assert!(matches!(
            machine.update(Action::Reduce),
            Err(AmrError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_clone_is_checkpoint() {
        let mut machine = bites(MachineConfig::default());
        machine.update(Action::node("dog")).unwrap();
        let checkpoint = machine.clone();
        machine.update(Action::Shift).unwrap();
        assert_eq!(checkpoint.tok_cursor(), 0);
        assert_eq!(machine.tok_cursor(), 1);
    }

    #[test]
    fn test_reset_keeps_config() {
        let config = MachineConfig::default().with_absolute_stack_pos(true);
        let mut machine = StateMachine::for_sentence(config, ["a"]);
        machine.update(Action::Copy).unwrap();
        machine.reset(["b", "c"]);
        assert!(machine.nodes().is_empty());
        assert_eq!(machine.tokens().len(), 2);
        assert!(machine.config().absolute_stack_pos);
    }
}
