//! Integration tests for transition_amr

use std::collections::BTreeMap;
use std::sync::Arc;
use transition_amr::*;

fn dog_bites() -> GoldGraph {
    GoldGraphRecord::new(["the", "dog", "bites"])
        .node("b", "bite-01", Some(vec![2]))
        .node("d", "dog", Some(vec![1]))
        .edge("b", ":ARG0", "d")
        .root("b")
        .build()
        .unwrap()
}

/// "John saw big dog and small dog": two nodes share the label `dog`
fn two_dogs() -> GoldGraph {
    GoldGraphRecord::new(["John", "saw", "big", "dog", "and", "small", "dog"])
        .node("s", "see-01", Some(vec![1]))
        .node("a", "and", Some(vec![4]))
        .node("d1", "dog", Some(vec![3]))
        .node("d2", "dog", Some(vec![6]))
        .node("g", "big", Some(vec![2]))
        .node("m", "small", Some(vec![5]))
        .edge("s", ":ARG1", "a")
        .edge("a", ":op1", "d1")
        .edge("a", ":op2", "d2")
        .edge("d1", ":mod", "g")
        .edge("d2", ":mod", "m")
        .root("s")
        .build()
        .unwrap()
}

fn strings(actions: &[Action]) -> Vec<String> {
    actions.iter().map(Action::to_string).collect()
}

#[test]
fn test_dog_bites_relative_pointers() {
    let config = MachineConfig::default().with_use_copy(false);
    let run = derive_actions(&dog_bites(), config).unwrap();
    assert_eq!(
        strings(&run.actions),
        vec!["SHIFT", "dog", "SHIFT", "bite-01", "ROOT", ">LA(0,:ARG0)", "SHIFT", "CLOSE"]
    );
    assert!(run.report.is_exact());
    assert_eq!(run.graph.root, Some(3));
    assert!(run.graph.has_edge(3, ":ARG0", 1));
    assert_eq!(run.node_map.get(&0), Some(&3));
    assert_eq!(run.node_map.get(&1), Some(&1));
}

#[test]
fn test_dog_bites_absolute_pointers_with_copy() {
    let config = MachineConfig::default().with_absolute_stack_pos(true);
    let run = derive_actions(&dog_bites(), config).unwrap();
    assert_eq!(
        strings(&run.actions),
        vec!["SHIFT", "COPY", "SHIFT", "bite-01", "ROOT", ">LA(1,:ARG0)", "SHIFT", "CLOSE"]
    );
    assert_eq!(run.graph.label(1), Some("dog"));
}

#[test]
fn test_single_unaligned_token() {
    let gold = GoldGraph::from_json_str(
        r#"{"tokens": ["Hi"], "nodes": [{"id": "h", "label": "hi-01"}], "edges": [], "root": "h"}"#,
    )
    .unwrap();
    let run = derive_actions(&gold, MachineConfig::default()).unwrap();
    assert_eq!(strings(&run.actions), vec!["hi-01", "ROOT", "SHIFT", "CLOSE"]);
    assert_eq!(run.repair.unaligned, vec![0]);
    assert!(!run.repair.is_degraded());
    assert!(run.report.is_exact());
}

#[test]
fn test_replay_auto_close() {
    let actions: Vec<Action> = ["SHIFT", "dog", "SHIFT", "bite-01", "ROOT", ">LA(0,:ARG0)", "SHIFT"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let machine = replay(["the", "dog", "bites"], actions, MachineConfig::default()).unwrap();
    assert!(machine.is_closed());
    assert_eq!(machine.action_history().len(), 8);
    assert_eq!(machine.action_history().last(), Some(&Action::Close));
    assert_eq!(machine.graph().edges, vec![Edge::new(3, ":ARG0", 1)]);
}

#[test]
fn test_reentrant_node_gets_both_parents() {
    let gold = GoldGraphRecord::new(["the", "boy", "wants", "to", "go"])
        .node("w", "want-01", Some(vec![2]))
        .node("b", "boy", Some(vec![1]))
        .node("g", "go-02", Some(vec![4]))
        .edge("w", ":ARG0", "b")
        .edge("w", ":ARG1", "g")
        .edge("g", ":ARG0", "b")
        .root("w")
        .build()
        .unwrap();
    let run = derive_actions(&gold, MachineConfig::default()).unwrap();
    assert_eq!(
        strings(&run.actions),
        vec![
            "SHIFT", "COPY", "SHIFT", "want-01", "ROOT", ">LA(0,:ARG0)", "SHIFT", "SHIFT",
            "go-02", ">RA(0,:ARG1)", ">LA(1,:ARG0)", "SHIFT", "CLOSE",
        ]
    );
    assert!(run.report.is_exact());
    let boy = run.node_map[&1];
    let parents: Vec<NodeId> = run
        .graph
        .edges
        .iter()
        .filter(|e| e.target == boy)
        .map(|e| e.source)
        .collect();
    assert_eq!(parents.len(), 2);
}

#[test]
fn test_two_dogs_oracle_sequence() {
    let run = derive_actions(&two_dogs(), MachineConfig::default()).unwrap();
    assert_eq!(
        strings(&run.actions),
        vec![
            "SHIFT", "see-01", "ROOT", "SHIFT", "COPY", "SHIFT", "COPY", ">LA(0,:mod)", "SHIFT",
            "COPY", ">LA(0,:op1)", ">RA(2,:ARG1)", "SHIFT", "COPY", "SHIFT", "COPY",
            ">LA(0,:mod)", ">RA(1,:op2)", "SHIFT", "CLOSE",
        ]
    );
    assert!(run.report.is_exact());
}

#[test]
fn test_two_dogs_align_mode_accepts_oracle() {
    let config = MachineConfig::default();
    let gold = Arc::new(two_dogs());
    let run = derive_actions(&gold, config).unwrap();

    let machine = replay_aligned(gold.clone(), run.actions.clone(), config).unwrap();
    let aligned = machine.aligned_graph().unwrap();
    assert!(aligned.report.is_exact());
    assert_eq!(aligned.graph, run.graph);

    // both dogs resolved to distinct gold nodes
    let dogs: Vec<GoldIdx> = aligned
        .decoded_to_gold
        .iter()
        .filter(|(node, _)| aligned.graph.label(**node) == Some("dog"))
        .map(|(_, gold)| *gold)
        .collect();
    assert_eq!(dogs.len(), 2);
    assert_ne!(dogs[0], dogs[1]);
}

#[test]
fn test_two_dogs_first_offered_decoding_is_exact() {
    let gold = Arc::new(two_dogs());
    let machine = decode_aligned(gold.clone(), MachineConfig::default(), &mut FirstOffered).unwrap();
    let aligned = machine.aligned_graph().unwrap();
    assert!(aligned.report.is_exact());
    assert_eq!(aligned.decoded_to_gold.len(), gold.len());
    assert_eq!(aligned.graph.edges.len(), gold.edges().len());
}

#[test]
fn test_resolved_dog_no_longer_blurs_the_others() {
    // n0 and n3 both modify the cat; after n3 is pinned by its :ARG0 edge the
    // :mod edge of the next dog can only be n0's
    let gold = Arc::new(
        GoldGraphRecord::new(["the"])
            .node("n0", "dog", None)
            .node("n1", "dog", None)
            .node("n2", "cat", None)
            .node("n3", "dog", None)
            .edge("n3", ":ARG0", "n2")
            .edge("n0", ":mod", "n2")
            .edge("n3", ":mod", "n2")
            .edge("n2", ":ARG0", "n1")
            .build()
            .unwrap(),
    );
    let machine = decode_aligned(gold.clone(), MachineConfig::default(), &mut FirstOffered).unwrap();
    assert_eq!(
        strings(machine.action_history()),
        vec![
            "cat", "dog", ">LA(0,:ARG0)", ">LA(0,:mod)", "dog", ">LA(1,:mod)", "dog",
            ">RA(2,:ARG0)", "SHIFT", "CLOSE",
        ]
    );
    let aligned = machine.aligned_graph().unwrap();
    assert!(aligned.report.is_exact(), "{:?}", aligned.report);
    assert_eq!(aligned.graph.edges.len(), 4);
    assert_eq!(aligned.decoded_to_gold.get(&4), Some(&0));
    assert_eq!(aligned.decoded_to_gold.get(&6), Some(&1));
}

#[test]
fn test_root_with_shared_label_in_align_mode() {
    let config = MachineConfig::default();
    let gold = Arc::new(
        GoldGraphRecord::new(["tiny"])
            .node("n0", "small", Some(vec![0]))
            .node("n1", "small", Some(vec![0]))
            .root("n0")
            .build()
            .unwrap(),
    );
    let run = derive_actions(&gold, config).unwrap();
    assert_eq!(strings(&run.actions), vec!["small", "ROOT", "small", "SHIFT", "CLOSE"]);

    let machine = replay_aligned(gold.clone(), run.actions.clone(), config).unwrap();
    let aligned = machine.aligned_graph().unwrap();
    assert!(aligned.report.is_exact());
    assert_eq!(aligned.decoded_to_gold, BTreeMap::from([(0, 0), (2, 1)]));
}

#[test]
fn test_unresolved_pairs_follow_their_edges() {
    let gold = Arc::new(
        GoldGraphRecord::new(["x"])
            .node("n0", "and", Some(vec![0]))
            .node("n1", "and", Some(vec![0]))
            .edge("n1", ":ARG0", "n0")
            .build()
            .unwrap(),
    );
    let machine = decode_aligned(gold.clone(), MachineConfig::default(), &mut FirstOffered).unwrap();
    assert_eq!(
        strings(machine.action_history()),
        vec!["and", "and", ">RA(0,:ARG0)", "SHIFT", "CLOSE"]
    );
    // the two nodes never tell themselves apart; the edge decides
    assert!(!machine.tracker().unwrap().ambiguous().is_empty());
    let aligned = machine.aligned_graph().unwrap();
    assert!(aligned.report.is_exact(), "{:?}", aligned.report);
    assert_eq!(aligned.decoded_to_gold, BTreeMap::from([(0, 1), (1, 0)]));
}

#[test]
fn test_align_mode_refuses_unknown_word() {
    let mut machine = StateMachine::aligned(MachineConfig::default(), Arc::new(dog_bites())).unwrap();
    let err = machine.update(Action::node(transition_amr::machine::UNK)).unwrap_err();
    assert!(err.is_protocol_violation());
    assert!(machine.action_history().is_empty());
}

#[test]
fn test_failed_update_leaves_machine_untouched() {
    let mut machine = StateMachine::for_sentence(MachineConfig::default(), ["dog"]);
    machine.update(Action::node("dog")).unwrap();
    let before = machine.graph();

    let err = machine.update(Action::left_arc(5, ":ARG0")).unwrap_err();
    assert!(err.is_protocol_violation());
    assert_eq!(machine.graph(), before);
    assert_eq!(machine.action_history().len(), 1);
}

#[test]
fn test_reduce_is_unsupported_everywhere() {
    let config = MachineConfig::default().with_reduce_nodes(Some(ReduceMode::All));
    assert!(matches!(
        derive_actions(&dog_bites(), config),
        Err(AmrError::Unsupported { .. })
    ));
    let machine = StateMachine::for_sentence(config, ["dog"]);
    assert!(matches!(
        machine.valid_actions(),
        Err(AmrError::Unsupported { .. })
    ));
}

#[test]
fn test_config_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("machine_config.json");
    let config = MachineConfig::default()
        .with_absolute_stack_pos(true)
        .with_use_copy(false);
    config.save(&path).unwrap();
    assert_eq!(MachineConfig::load(&path).unwrap(), config);

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["reduce_nodes"], serde_json::Value::Null);
    assert_eq!(value["absolute_stack_pos"], true);
    assert_eq!(value["use_copy"], false);
}

#[test]
fn test_sampled_alignments_feed_the_oracle() {
    let unaligned = GoldGraphRecord::new(["the", "dog", "bites"])
        .node("b", "bite-01", None)
        .node("d", "dog", None)
        .edge("b", ":ARG0", "d")
        .root("b")
        .build()
        .unwrap();
    let table: AlignmentProbabilities = serde_json::from_str(
        r#"{"node_ids": ["b", "d"], "probs": [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]]}"#,
    )
    .unwrap();
    let sampled = sample_alignments(&table, &unaligned, None, 1).unwrap();
    assert_eq!(sampled, dog_bites());

    let run = derive_actions(&sampled, MachineConfig::default()).unwrap();
    assert!(run.repair.is_clean());
    assert!(run.report.is_exact());
}

#[test]
fn test_corpus_vocabulary() {
    let graphs = vec![dog_bites(), two_dogs()];
    let config = MachineConfig::default();
    let mut stats = VocabStats::new(config, true);
    for run in derive_corpus(&graphs, config) {
        let run = run.unwrap();
        stats.update_all(run.action_strings().iter().map(String::as_str));
    }
    assert_eq!(stats.left_arcs.get(">LA(:mod)"), Some(&2));
    assert_eq!(stats.right_arcs.get(">RA(:op2)"), Some(&1));
    assert_eq!(stats.control.get("ROOT"), Some(&2));
    assert!(!stats.control.contains_key("CLOSE"));
    assert!(stats.nodes.contains_key("see-01"));
}

#[test]
fn test_malformed_gold_graphs() {
    let unknown_target = r#"{"tokens": ["a"], "nodes": [{"id": "x", "label": "a"}],
        "edges": [{"source": "x", "label": ":mod", "target": "y"}]}"#;
    assert!(matches!(
        GoldGraph::from_json_str(unknown_target),
        Err(AmrError::Serialization { .. }) | Err(AmrError::MalformedGraph { .. })
    ));

    let out_of_range = r#"{"tokens": ["a"], "nodes": [{"id": "x", "label": "a", "alignment": [4]}],
        "edges": []}"#;
    assert!(GoldGraph::from_json_str(out_of_range).is_err());
}
