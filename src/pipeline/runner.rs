//! Drivers that run a [`StateMachine`] over whole sentences.
//!
//! - [`derive_actions`] / [`derive_corpus`]: oracle action sequences from
//!   gold graphs
//! - [`replay`]: rebuild a graph from tokens and an action sequence
//! - [`replay_aligned`]: the same, checked step by step against a gold graph
//! - [`decode_aligned`]: let a [`ChoicePolicy`] pick from the align-mode menu

use crate::errors::{AmrError, Result};
use crate::graph::decoded::Graph;
use crate::graph::gold::GoldGraph;
use crate::graph::repair::RepairReport;
use crate::machine::{StateMachine, ValidActions};
use crate::oracle::{Oracle, ReconstructionReport};
use crate::pipeline::traits::ChoicePolicy;
use crate::types::{Action, GoldIdx, MachineConfig, NodeId};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Oracle derivation
// ============================================================================

/// Everything the oracle produced for one sentence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleRun {
    pub tokens: Vec<String>,
    /// The full sequence, ending in CLOSE
    pub actions: Vec<Action>,
    /// Gold node → decoded node
    pub node_map: BTreeMap<GoldIdx, NodeId>,
    pub repair: RepairReport,
    pub report: ReconstructionReport,
    pub graph: Graph,
}

impl OracleRun {
    /// Action strings without the trailing CLOSE, as written to action files
    pub fn action_strings(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| **a != Action::Close)
            .map(Action::to_string)
            .collect()
    }
}

/// Upper bound on the length of a derivation for `gold`.
///
/// Every token is shifted once, every node is generated once and may be the
/// ROOT target, every edge is one arc, plus CLOSE and slack.
pub fn step_limit(gold: &GoldGraph) -> usize {
    gold.tokens().len() + 2 * gold.len() + gold.edges().len() + 3
}

/// Run the oracle on `gold` until the machine closes.
///
/// Alignment repair happens on a copy inside the oracle; `gold` is not
/// modified. Edges the stack discipline could not produce are listed in the
/// run's [`ReconstructionReport`].
pub fn derive_actions(gold: &GoldGraph, config: MachineConfig) -> Result<OracleRun> {
    let mut oracle = Oracle::new(config, gold)?;
    let mut machine = StateMachine::for_sentence(config, gold.tokens().iter().cloned());
    let limit = step_limit(gold);

    while !machine.is_closed() {
        if machine.action_history().len() >= limit {
            return Err(AmrError::internal(format!(
                "oracle did not close the machine within {limit} steps"
            )));
        }
        let scored = oracle
            .get_actions(&machine)?
            .into_iter()
            .next()
            .ok_or_else(|| AmrError::internal("oracle offered no action for an open machine"))?;
        let node_id = machine.action_history().len() as NodeId;
        machine.update(scored.action)?;
        if let Some(gold_node) = scored.gold_node {
            oracle.record_generated(gold_node, node_id);
        }
    }

    let report = oracle.reconstruction_report(&machine);
    if !report.is_exact() {
        tracing::debug!(
            missing_edges = report.missing_edges.len(),
            unrealized_nodes = report.unrealized_nodes.len(),
            "oracle derivation does not reproduce the gold graph"
        );
    }
    tracing::debug!(
        tokens = machine.tokens().len(),
        actions = machine.action_history().len(),
        "derived oracle actions"
    );

    Ok(OracleRun {
        tokens: machine.tokens().to_vec(),
        actions: machine.action_history().to_vec(),
        node_map: oracle.node_map().clone(),
        repair: oracle.repair_report().clone(),
        report,
        graph: machine.graph(),
    })
}

/// Derive every sentence of a corpus in parallel.
///
/// Results come back in input order; one failing sentence does not stop the
/// others.
pub fn derive_corpus(graphs: &[GoldGraph], config: MachineConfig) -> Vec<Result<OracleRun>> {
    graphs
        .par_iter()
        .map(|gold| derive_actions(gold, config))
        .collect()
}

// ============================================================================
// Replay
// ============================================================================

fn close_if_open(machine: &mut StateMachine) -> Result<()> {
    if !machine.is_closed() {
        tracing::debug!(
            actions = machine.action_history().len(),
            "action sequence does not end in CLOSE, appending it"
        );
        machine.update(Action::Close)?;
    }
    Ok(())
}

/// Rebuild a graph by applying `actions` to a fresh machine over `tokens`.
///
/// A missing final CLOSE is appended. The returned machine is closed.
pub fn replay<S, I>(
    tokens: impl IntoIterator<Item = S>,
    actions: I,
    config: MachineConfig,
) -> Result<StateMachine>
where
    S: Into<String>,
    I: IntoIterator<Item = Action>,
{
    let mut machine = StateMachine::for_sentence(config, tokens);
    machine.apply_all(actions)?;
    close_if_open(&mut machine)?;
    Ok(machine)
}

/// Apply one action after checking it against the align-mode menu
fn checked_update(machine: &mut StateMachine, action: Action) -> Result<()> {
    let valid = machine.valid_actions()?;
    if !valid.allows(&action) {
        let offered = match &valid {
            ValidActions::Exact(actions) => actions
                .iter()
                .map(Action::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            ValidActions::Base(bases) => bases
                .iter()
                .map(|b| b.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        };
        return Err(AmrError::protocol(
            format!("'{action}' is not valid here, offered: {offered}"),
            machine.to_string(),
        ));
    }
    machine.update(action)
}

/// Replay `actions` through an align-mode machine bound to `gold`, rejecting
/// the first action that would leave the gold graph.
///
/// A missing final CLOSE is appended, and must itself be on the menu.
pub fn replay_aligned<I>(
    gold: Arc<GoldGraph>,
    actions: I,
    config: MachineConfig,
) -> Result<StateMachine>
where
    I: IntoIterator<Item = Action>,
{
    let mut machine = StateMachine::aligned(config, gold)?;
    for action in actions {
        checked_update(&mut machine, action)?;
    }
    if !machine.is_closed() {
        tracing::debug!("aligned replay does not end in CLOSE, appending it");
        checked_update(&mut machine, Action::Close)?;
    }
    Ok(machine)
}

// ============================================================================
// Align-mode decoding
// ============================================================================

/// Decode `gold` by letting `policy` pick from the align-mode menu at every
/// step. Returns the closed machine; its
/// [`aligned_graph`](StateMachine::aligned_graph) holds the result.
pub fn decode_aligned<P>(
    gold: Arc<GoldGraph>,
    config: MachineConfig,
    policy: &mut P,
) -> Result<StateMachine>
where
    P: ChoicePolicy + ?Sized,
{
    let limit = step_limit(&gold);
    let mut machine = StateMachine::aligned(config, gold)?;

    while !machine.is_closed() {
        if machine.action_history().len() >= limit {
            return Err(AmrError::internal(format!(
                "align-mode decoding did not close within {limit} steps"
            )));
        }
        let options = match machine.valid_actions()? {
            ValidActions::Exact(options) => options,
            ValidActions::Base(_) => {
                return Err(AmrError::internal("align-mode machine offered base actions"))
            }
        };
        if options.is_empty() {
            return Err(AmrError::protocol(
                "align-mode menu is empty on an open machine",
                machine.to_string(),
            ));
        }
        let choice = policy.choose(&machine, &options);
        let action = options.get(choice).cloned().ok_or_else(|| {
            AmrError::internal(format!(
                "policy chose option {choice} from a menu of {}",
                options.len()
            ))
        })?;
        machine.update(action)?;
    }

    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::gold::GoldGraphRecord;
    use crate::pipeline::traits::{FirstOffered, SeededRandom};

    fn dog_bites() -> GoldGraph {
        GoldGraphRecord::new(["the", "dog", "bites"])
            .node("b", "bite-01", Some(vec![2]))
            .node("d", "dog", Some(vec![1]))
            .edge("b", ":ARG0", "d")
            .root("b")
            .build()
            .unwrap()
    }

    #[test]
    fn test_derive_and_replay_agree() {
        let config = MachineConfig::default();
        let run = derive_actions(&dog_bites(), config).unwrap();
        assert!(run.report.is_exact());
        assert_eq!(run.actions.last(), Some(&Action::Close));
        assert!(run.actions.len() <= step_limit(&dog_bites()));

        let machine = replay(run.tokens.clone(), run.actions.clone(), config).unwrap();
        assert_eq!(machine.graph(), run.graph);
    }

    #[test]
    fn test_action_strings_drop_close() {
        let config = MachineConfig::default().with_use_copy(false);
        let run = derive_actions(&dog_bites(), config).unwrap();
        assert_eq!(
            run.action_strings(),
            vec!["SHIFT", "dog", "SHIFT", "bite-01", "ROOT", ">LA(0,:ARG0)", "SHIFT"]
        );
    }

    #[test]
    fn test_replay_appends_close() {
        let actions = vec![Action::Shift, Action::node("dog")];
        let machine = replay(["dog"], actions, MachineConfig::default()).unwrap();
        assert!(machine.is_closed());
        assert_eq!(machine.action_history().last(), Some(&Action::Close));
    }

    #[test]
    fn test_replay_propagates_violations() {
        let err = replay(["dog"], vec![Action::Shift, Action::Shift], MachineConfig::default())
            .unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_corpus_keeps_order() {
        let single = GoldGraphRecord::new(["hi"])
            .node("h", "hi-01", None)
            .root("h")
            .build()
            .unwrap();
        let graphs = vec![dog_bites(), single.clone(), dog_bites()];
        let runs = derive_corpus(&graphs, MachineConfig::default());
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1].as_ref().unwrap().tokens, vec!["hi"]);
        assert_eq!(runs[0], runs[2]);
    }

    #[test]
    fn test_replay_aligned_accepts_oracle_and_rejects_detours() {
        let config = MachineConfig::default();
        let gold = Arc::new(dog_bites());
        let run = derive_actions(&gold, config).unwrap();
        let machine = replay_aligned(gold.clone(), run.actions.clone(), config).unwrap();
        assert!(machine.aligned_graph().unwrap().report.is_exact());

        let detour = vec![Action::Shift, Action::node("cat")];
        let err = replay_aligned(gold, detour, config).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_decode_aligned_policies() {
        let config = MachineConfig::default();
        let gold = Arc::new(dog_bites());

        let machine = decode_aligned(gold.clone(), config, &mut FirstOffered).unwrap();
        let aligned = machine.aligned_graph().unwrap();
        assert!(aligned.report.is_exact());
        assert_eq!(aligned.decoded_to_gold.len(), 2);

        let machine = decode_aligned(gold, config, &mut SeededRandom::new(3)).unwrap();
        assert!(machine.is_closed());
    }

    #[test]
    fn test_decode_aligned_rejects_bad_choice() {
        let mut out_of_range = |_: &StateMachine, options: &[Action]| options.len();
        let err = decode_aligned(Arc::new(dog_bites()), MachineConfig::default(), &mut out_of_range)
            .unwrap_err();
        assert!(matches!(err, AmrError::Internal { .. }));
    }
}
