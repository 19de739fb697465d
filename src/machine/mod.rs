//! The shift-reduce automaton with pointer arcs
//!
//! - [`state`]: per-sentence state and the transition function
//! - [`valid`]: action menus offered to decoders

pub mod state;
pub mod valid;

pub use state::{StateMachine, UNK};
pub use valid::ValidActions;
