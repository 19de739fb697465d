//! Error types for transition_amr
//!
//! Every fatal condition of the state machine, the oracle and the align-mode
//! tracker is reported through [`AmrError`]. Degraded-but-recoverable
//! situations (unaligned nodes, coverage gaps) are not errors; they are
//! reported through [`crate::graph::repair::RepairReport`] and
//! [`crate::oracle::check::ReconstructionReport`].

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AmrError>;

/// Main error type for transition_amr
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmrError {
    /// The gold graph is inconsistent (unknown node ids, alignments outside
    /// the sentence, duplicate ids)
    #[error("Malformed gold graph: {message}")]
    MalformedGraph { message: String },

    /// An action was applied that the machine cannot accept in its current
    /// state. Carries the machine state at the time of the failure.
    #[error("Protocol violation: {message}\n{context}")]
    ProtocolViolation { message: String, context: String },

    /// The align-mode tracker reached a state its bookkeeping rules out
    #[error("Align tracker invariant violated: {message}")]
    TrackerInvariant { message: String },

    /// A configured feature that is intentionally not implemented
    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    /// An action string could not be parsed into an [`crate::types::Action`]
    #[error("Cannot parse action '{action}': {message}")]
    ParseAction { action: String, message: String },

    /// Node-to-token probability table does not fit the graph
    #[error("Invalid alignment probabilities: {message}")]
    InvalidAlignments { message: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Filesystem error while loading or saving
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal error (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AmrError {
    /// Create a malformed graph error
    pub fn malformed_graph(message: impl Into<String>) -> Self {
        Self::MalformedGraph {
            message: message.into(),
        }
    }

    /// Create a protocol violation carrying a rendering of the machine state
    pub fn protocol(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a tracker invariant error
    pub fn tracker_invariant(message: impl Into<String>) -> Self {
        Self::TrackerInvariant {
            message: message.into(),
        }
    }

    /// Create an unsupported feature error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an action parse error
    pub fn parse_action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseAction {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create an invalid alignment probabilities error
    pub fn invalid_alignments(message: impl Into<String>) -> Self {
        Self::InvalidAlignments {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error signals a caller or oracle bug rather than bad input
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

impl From<serde_json::Error> for AmrError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for AmrError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}
