//! Align mode: decoding constrained to a known gold graph
//!
//! - [`tracker`]: incremental decoded ↔ gold node correspondence and the
//!   align-mode action menu
//! - [`matching`]: assignments of unresolved decoded nodes to gold nodes
//! - [`neighbours`]: identifying edge signatures for nodes sharing a label
//! - [`sampling`]: alignments drawn from external probability tables

pub mod matching;
pub mod neighbours;
pub mod sampling;
pub mod tracker;

pub use matching::Matching;
pub use neighbours::{group_by_label, EdgeSignature, GoldNeighbours};
pub use sampling::{sample_alignments, AlignmentProbabilities};
pub use tracker::{AlignTracker, AlignedGraph, DecodedView, LabelMap, MissingEdge};
