//! Choice policies for align-mode decoding.
//!
//! An align-mode machine offers a menu of concrete actions at every step.
//! A [`ChoicePolicy`] picks one of them. Any
//! `FnMut(&StateMachine, &[Action]) -> usize` closure is a policy, so tests
//! and scorers can plug in without a named type.

use crate::machine::StateMachine;
use crate::types::Action;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// ChoicePolicy: menu to index
// ============================================================================

/// Picks the next action from a non-empty menu.
///
/// # Contract
///
/// - **Input**: the machine before the action is applied, and the menu in
///   tie-break order (gold-edge order, then ascending decoded id).
/// - **Output**: an index into `options`. Out-of-range indices are rejected
///   by the driver.
pub trait ChoicePolicy {
    fn choose(&mut self, machine: &StateMachine, options: &[Action]) -> usize;
}

impl<F> ChoicePolicy for F
where
    F: FnMut(&StateMachine, &[Action]) -> usize,
{
    #[inline]
    fn choose(&mut self, machine: &StateMachine, options: &[Action]) -> usize {
        self(machine, options)
    }
}

/// Always the first offered action: the reference tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOffered;

impl ChoicePolicy for FirstOffered {
    #[inline]
    fn choose(&mut self, _machine: &StateMachine, _options: &[Action]) -> usize {
        0
    }
}

/// Uniform choice from the menu with a seeded generator.
///
/// Useful for exploring alternative derivations of the same gold graph; a
/// fixed seed reproduces the same sequence.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ChoicePolicy for SeededRandom {
    fn choose(&mut self, _machine: &StateMachine, options: &[Action]) -> usize {
        if options.is_empty() {
            return 0;
        }
        self.rng.gen_range(0..options.len())
    }
}
