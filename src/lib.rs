//! # transition_amr
//!
//! A transition system for Abstract Meaning Representation parsing, with
//! Python bindings.
//!
//! A [`StateMachine`] turns a sequence of actions over a tokenized sentence
//! into a rooted, labelled, directed graph. The [`Oracle`] derives the
//! canonical action sequence for a gold graph, and in align mode an
//! [`AlignTracker`] restricts decoding to actions that stay on a known gold
//! graph.
//!
//! ## Features
//!
//! - **Deterministic**: the oracle and the align-mode menu are pure functions
//!   of the machine state
//! - **Checked**: every transition validates its preconditions first; a
//!   failed precondition leaves the machine untouched. An align-mode tracker
//!   failure is raised after the transition, and the machine has to be reset
//! - **Parallel**: corpus-level oracle derivation with rayon
//! - **Python bindings**: `StateMachine` class and JSON functions via PyO3
//!
//! ## Example
//!
//! ```
//! use transition_amr::{derive_actions, replay, GoldGraphRecord, MachineConfig};
//!
//! let gold = GoldGraphRecord::new(["the", "dog", "bites"])
//!     .node("b", "bite-01", Some(vec![2]))
//!     .node("d", "dog", Some(vec![1]))
//!     .edge("b", ":ARG0", "d")
//!     .root("b")
//!     .build()
//!     .unwrap();
//!
//! let config = MachineConfig::default();
//! let run = derive_actions(&gold, config).unwrap();
//! assert!(run.report.is_exact());
//!
//! let machine = replay(run.tokens.clone(), run.actions.clone(), config).unwrap();
//! assert_eq!(machine.graph(), run.graph);
//! ```

pub mod align;
pub mod errors;
pub mod graph;
pub mod machine;
pub mod oracle;
pub mod pipeline;
pub mod types;
pub mod vocab;

#[cfg(feature = "python")]
pub mod python;

// Re-export commonly used types
pub use errors::{AmrError, Result};
pub use types::{
    base_action, normalize, Action, BaseAction, Edge, GoldIdx, MachineConfig, NodeId, ReduceMode,
};

// Re-export main functionality
pub use align::{sample_alignments, AlignTracker, AlignedGraph, AlignmentProbabilities};
pub use graph::{
    decoded::Graph,
    gold::{GoldGraph, GoldGraphRecord},
    repair::{repair_alignments, RepairReport},
};
pub use machine::{StateMachine, ValidActions};
pub use oracle::{Oracle, ReconstructionReport, ScoredAction};
pub use pipeline::{
    decode_aligned, derive_actions, derive_corpus, replay, replay_aligned, ChoicePolicy,
    FirstOffered, OracleRun, SeededRandom,
};
pub use vocab::VocabStats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Initialize the Python module
#[cfg(feature = "python")]
#[pymodule]
fn _rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register_module(m)?;
    Ok(())
}
