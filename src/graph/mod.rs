//! Graph representations
//!
//! - [`gold`]: validated gold graphs consumed by the oracle and the tracker
//! - [`decoded`]: graphs produced by replaying actions
//! - [`repair`]: alignment repair pre-pass for gold graphs

pub mod decoded;
pub mod gold;
pub mod repair;

pub use decoded::Graph;
pub use gold::{GoldEdgeRecord, GoldGraph, GoldGraphRecord, GoldNodeRecord};
pub use repair::{repair_alignments, RepairReport};
