//! Core types for transition_amr
//!
//! This module defines the fundamental data structures shared by the state
//! machine, the oracle and the align-mode tracker: actions, edges, node ids
//! and the machine configuration.

use crate::errors::{AmrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Id of a decoded node: the action-history index of the action that created it
pub type NodeId = u32;

/// Dense index of a node inside a [`crate::graph::gold::GoldGraph`]
pub type GoldIdx = usize;

/// Normalize a token or node label by stripping double quotes.
///
/// A lone `"` token is kept as is.
pub fn normalize(token: &str) -> String {
    if token == "\"" {
        token.to_string()
    } else {
        token.replace('"', "")
    }
}

// ============================================================================
// Edges
// ============================================================================

/// A labelled directed edge. The label keeps its leading `:` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge<N> {
    pub source: N,
    pub label: String,
    pub target: N,
}

impl<N> Edge<N> {
    /// Create a new edge
    pub fn new(source: N, label: impl Into<String>, target: N) -> Self {
        Self {
            source,
            label: label.into(),
            target,
        }
    }
}

impl<N: PartialEq + Copy> Edge<N> {
    /// Check whether `node` is one of the endpoints
    pub fn touches(&self, node: N) -> bool {
        self.source == node || self.target == node
    }

    /// The endpoint that is not `node` (the source for self-loops)
    pub fn other(&self, node: N) -> N {
        if self.source == node {
            self.target
        } else {
            self.source
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Canonical base forms of the action alphabet.
///
/// Node generation by literal label collapses into [`BaseAction::Node`] and arc
/// actions lose their pointer and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseAction {
    Shift,
    Copy,
    Root,
    LeftArc,
    RightArc,
    Close,
    Node,
    Reduce,
    Reduce2,
    Reduce3,
}

impl BaseAction {
    /// All base actions in vocabulary order
    pub const ALL: [BaseAction; 10] = [
        BaseAction::Shift,
        BaseAction::Copy,
        BaseAction::Root,
        BaseAction::LeftArc,
        BaseAction::RightArc,
        BaseAction::Close,
        BaseAction::Node,
        BaseAction::Reduce,
        BaseAction::Reduce2,
        BaseAction::Reduce3,
    ];

    /// The canonical token for this base action
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseAction::Shift => "SHIFT",
            BaseAction::Copy => "COPY",
            BaseAction::Root => "ROOT",
            BaseAction::LeftArc => ">LA",
            BaseAction::RightArc => ">RA",
            BaseAction::Close => "CLOSE",
            BaseAction::Node => "NODE",
            BaseAction::Reduce => "REDUCE",
            BaseAction::Reduce2 => "REDUCE2",
            BaseAction::Reduce3 => "REDUCE3",
        }
    }

    /// Whether this base action creates a node
    pub fn is_node_generation(&self) -> bool {
        matches!(self, BaseAction::Copy | BaseAction::Node)
    }

    /// Whether this base action creates an edge
    pub fn is_arc(&self) -> bool {
        matches!(self, BaseAction::LeftArc | BaseAction::RightArc)
    }
}

impl fmt::Display for BaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split the inside of `>LA(...)` / `>RA(...)` off an action string.
///
/// Returns the arc base action and the text between the parentheses.
pub(crate) fn split_arc(action: &str) -> Option<(BaseAction, &str)> {
    let base = if action.starts_with(">LA(") {
        BaseAction::LeftArc
    } else if action.starts_with(">RA(") {
        BaseAction::RightArc
    } else {
        return None;
    };
    let inner = action.get(4..)?.strip_suffix(')')?;
    Some((base, inner))
}

/// Map a raw action string to its canonical base form.
///
/// Accepts both pointer (`>LA(3,:ARG0)`) and pointer-less (`>LA(:ARG0)`) arc
/// forms, as found in action vocabularies. Anything that is not a control
/// action or an arc is a node label.
pub fn base_action(action: &str) -> BaseAction {
    match action {
        "SHIFT" => BaseAction::Shift,
        "COPY" => BaseAction::Copy,
        "ROOT" => BaseAction::Root,
        ">LA" => BaseAction::LeftArc,
        ">RA" => BaseAction::RightArc,
        "CLOSE" => BaseAction::Close,
        "NODE" => BaseAction::Node,
        "REDUCE" => BaseAction::Reduce,
        "REDUCE2" => BaseAction::Reduce2,
        "REDUCE3" => BaseAction::Reduce3,
        _ => match split_arc(action) {
            Some((base, _)) => base,
            None => BaseAction::Node,
        },
    }
}

/// A single machine transition.
///
/// Arc pointers are either absolute node ids or positions relative to the
/// stack top, depending on [`MachineConfig::absolute_stack_pos`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    /// Advance the token cursor
    Shift,
    /// Create a node labelled with the (normalized) token under the cursor
    Copy,
    /// Create a node with a literal label
    Node(String),
    /// Mark the stack top as root
    Root,
    /// Edge from the stack top to the node at `pos`
    LeftArc { pos: u32, label: String },
    /// Edge from the node at `pos` to the stack top
    RightArc { pos: u32, label: String },
    /// Finish the sentence
    Close,
    /// Pop the stack top (disabled)
    Reduce,
    /// Remove the non-top node of the last arc (disabled)
    Reduce2,
    /// Both reductions at once (disabled)
    Reduce3,
}

impl Action {
    /// Create a node generation action
    pub fn node(label: impl Into<String>) -> Self {
        Self::Node(label.into())
    }

    /// Create a left arc action
    pub fn left_arc(pos: u32, label: impl Into<String>) -> Self {
        Self::LeftArc {
            pos,
            label: label.into(),
        }
    }

    /// Create a right arc action
    pub fn right_arc(pos: u32, label: impl Into<String>) -> Self {
        Self::RightArc {
            pos,
            label: label.into(),
        }
    }

    /// The canonical base form of this action
    pub fn base(&self) -> BaseAction {
        match self {
            Action::Shift => BaseAction::Shift,
            Action::Copy => BaseAction::Copy,
            Action::Node(_) => BaseAction::Node,
            Action::Root => BaseAction::Root,
            Action::LeftArc { .. } => BaseAction::LeftArc,
            Action::RightArc { .. } => BaseAction::RightArc,
            Action::Close => BaseAction::Close,
            Action::Reduce => BaseAction::Reduce,
            Action::Reduce2 => BaseAction::Reduce2,
            Action::Reduce3 => BaseAction::Reduce3,
        }
    }

    /// Arc pointer, if this is an arc action
    pub fn pointer(&self) -> Option<u32> {
        match self {
            Action::LeftArc { pos, .. } | Action::RightArc { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Node(label) => f.write_str(label),
            Action::LeftArc { pos, label } => write!(f, ">LA({pos},{label})"),
            Action::RightArc { pos, label } => write!(f, ">RA({pos},{label})"),
            other => f.write_str(other.base().as_str()),
        }
    }
}

impl FromStr for Action {
    type Err = AmrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => return Err(AmrError::parse_action(s, "empty action")),
            "SHIFT" => return Ok(Action::Shift),
            "COPY" => return Ok(Action::Copy),
            "ROOT" => return Ok(Action::Root),
            "CLOSE" => return Ok(Action::Close),
            "REDUCE" => return Ok(Action::Reduce),
            "REDUCE2" => return Ok(Action::Reduce2),
            "REDUCE3" => return Ok(Action::Reduce3),
            _ => {}
        }

        if !(s.starts_with(">LA") || s.starts_with(">RA")) {
            return Ok(Action::Node(s.to_string()));
        }

        let (base, inner) =
            split_arc(s).ok_or_else(|| AmrError::parse_action(s, "expected >LA(pos,label)"))?;
        let (pos, label) = inner
            .split_once(',')
            .ok_or_else(|| AmrError::parse_action(s, "arc action has no pointer"))?;
        let pos: u32 = pos
            .trim()
            .parse()
            .map_err(|_| AmrError::parse_action(s, format!("invalid pointer '{}'", pos.trim())))?;
        let label = label.trim();
        if !label.starts_with(':') {
            return Err(AmrError::parse_action(
                s,
                "relation label must keep its ':' marker",
            ));
        }

        Ok(match base {
            BaseAction::LeftArc => Action::left_arc(pos, label),
            _ => Action::right_arc(pos, label),
        })
    }
}

impl TryFrom<String> for Action {
    type Error = AmrError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.to_string()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Node garbage-collection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceMode {
    /// Reduce every node whose edges are complete
    All,
}

/// Sentence-independent machine configuration.
///
/// Persisted as the flat record
/// `{"reduce_nodes": null, "absolute_stack_pos": false, "use_copy": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Node reduction policy. Selecting one makes the machine and the oracle
    /// fail with [`AmrError::Unsupported`].
    #[serde(default)]
    pub reduce_nodes: Option<ReduceMode>,
    /// Arc pointers are node ids instead of positions relative to the stack top
    #[serde(default)]
    pub absolute_stack_pos: bool,
    /// Offer the COPY action
    #[serde(default = "default_use_copy")]
    pub use_copy: bool,
}

fn default_use_copy() -> bool {
    true
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            reduce_nodes: None,
            absolute_stack_pos: false,
            use_copy: true,
        }
    }
}

impl MachineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the reduce policy
    pub fn with_reduce_nodes(mut self, reduce_nodes: Option<ReduceMode>) -> Self {
        self.reduce_nodes = reduce_nodes;
        self
    }

    /// Builder method: use absolute arc pointers
    pub fn with_absolute_stack_pos(mut self, absolute: bool) -> Self {
        self.absolute_stack_pos = absolute;
        self
    }

    /// Builder method: enable or disable COPY
    pub fn with_use_copy(mut self, use_copy: bool) -> Self {
        self.use_copy = use_copy;
        self
    }

    /// Base actions this configuration can emit
    pub fn base_vocabulary(&self) -> Vec<BaseAction> {
        BaseAction::ALL
            .into_iter()
            .filter(|base| match base {
                BaseAction::Copy => self.use_copy,
                BaseAction::Reduce | BaseAction::Reduce2 | BaseAction::Reduce3 => {
                    self.reduce_nodes.is_some()
                }
                _ => true,
            })
            .collect()
    }

    /// Parse a config record
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the config record
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load a config record from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Save the config record to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
