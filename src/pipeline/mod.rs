//! Sentence- and corpus-level drivers.
//!
//! ## Submodules
//!
//! - [`traits`]: the [`ChoicePolicy`] seam used by align-mode decoding
//! - [`runner`]: oracle derivation, replay and align-mode decoding loops

pub mod runner;
pub mod traits;

pub use runner::{
    decode_aligned, derive_actions, derive_corpus, replay, replay_aligned, step_limit, OracleRun,
};
pub use traits::{ChoicePolicy, FirstOffered, SeededRandom};
