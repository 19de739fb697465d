//! Neighbourhood signatures of gold nodes that share a label

use crate::graph::gold::GoldGraph;
use crate::types::{normalize, GoldIdx};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// An edge seen through node labels: `(source label, relation, target label)`
pub type EdgeSignature = (String, String, String);

/// Gold nodes grouped by normalized label, in node order within each group
pub fn group_by_label(gold: &GoldGraph) -> BTreeMap<String, Vec<GoldIdx>> {
    let mut groups: BTreeMap<String, Vec<GoldIdx>> = BTreeMap::new();
    for node in gold.node_indices() {
        groups.entry(normalize(gold.label(node))).or_default().push(node);
    }
    groups
}

/// Incident edge signatures of every gold node whose label is shared.
///
/// Which of them identify a node depends on the same-label nodes still in
/// play: a signature identifies `node` among `among` when no other member of
/// `among` carries it. A decoded node showing such an edge can only be that
/// gold node.
#[derive(Debug, Clone, Default)]
pub struct GoldNeighbours {
    incident: FxHashMap<GoldIdx, BTreeSet<EdgeSignature>>,
}

impl GoldNeighbours {
    pub fn new(gold: &GoldGraph) -> Self {
        let mut incident: FxHashMap<GoldIdx, BTreeSet<EdgeSignature>> = FxHashMap::default();
        for nodes in group_by_label(gold).into_values() {
            if nodes.len() < 2 {
                continue;
            }
            for node in nodes {
                let signatures = gold
                    .edges()
                    .iter()
                    .filter(|e| e.touches(node))
                    .map(|e| {
                        (
                            normalize(gold.label(e.source)),
                            e.label.clone(),
                            normalize(gold.label(e.target)),
                        )
                    })
                    .collect();
                incident.insert(node, signatures);
            }
        }
        Self { incident }
    }

    fn incident(&self, node: GoldIdx) -> Option<&BTreeSet<EdgeSignature>> {
        self.incident.get(&node)
    }

    /// Signatures of `node` that no other node of `among` carries (empty for
    /// nodes with a unique label)
    pub fn signature(&self, node: GoldIdx, among: &[GoldIdx]) -> Vec<&EdgeSignature> {
        let Some(own) = self.incident(node) else {
            return Vec::new();
        };
        own.iter()
            .filter(|sig| {
                among
                    .iter()
                    .filter(|&&other| other != node)
                    .all(|&other| self.incident(other).map_or(true, |s| !s.contains(*sig)))
            })
            .collect()
    }

    /// Check whether any of `key` identifies `node` among `among`
    pub fn identifies(
        &self,
        node: GoldIdx,
        among: &[GoldIdx],
        key: &BTreeSet<EdgeSignature>,
    ) -> bool {
        self.signature(node, among).into_iter().any(|sig| key.contains(sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::gold::GoldGraphRecord;

    fn sig(s: &str, l: &str, t: &str) -> EdgeSignature {
        (s.to_string(), l.to_string(), t.to_string())
    }

    #[test]
    fn test_shared_edges_are_not_identifying() {
        // both dogs are :op of "and"; only the :mod edges tell them apart
        let gold = GoldGraphRecord::new(["big", "dog", "and", "small", "dog"])
            .node("a", "and", Some(vec![2]))
            .node("d1", "dog", Some(vec![1]))
            .node("d2", "dog", Some(vec![4]))
            .node("g", "big", Some(vec![0]))
            .node("m", "small", Some(vec![3]))
            .edge("a", ":op1", "d1")
            .edge("a", ":op1", "d2")
            .edge("d1", ":mod", "g")
            .edge("d2", ":mod", "m")
            .build()
            .unwrap();
        let neighbours = GoldNeighbours::new(&gold);
        let dogs = [1, 2];
        assert_eq!(neighbours.signature(1, &dogs), vec![&sig("dog", ":mod", "big")]);
        assert_eq!(neighbours.signature(2, &dogs), vec![&sig("dog", ":mod", "small")]);
        assert!(neighbours.signature(0, &dogs).is_empty());

        let key = BTreeSet::from([sig("and", ":op1", "dog"), sig("dog", ":mod", "small")]);
        assert!(neighbours.identifies(2, &dogs, &key));
        assert!(!neighbours.identifies(1, &dogs, &key));
    }

    #[test]
    fn test_signatures_narrow_with_the_candidates() {
        // n0 and n3 both modify the cat; once n3 is out of play the :mod edge
        // tells n0 apart from n1
        let gold = GoldGraphRecord::new(["dog", "cat", "dog", "dog"])
            .node("n0", "dog", Some(vec![0]))
            .node("n1", "dog", Some(vec![2]))
            .node("n2", "cat", Some(vec![1]))
            .node("n3", "dog", Some(vec![3]))
            .edge("n3", ":ARG0", "n2")
            .edge("n0", ":mod", "n2")
            .edge("n3", ":mod", "n2")
            .edge("n2", ":ARG0", "n1")
            .build()
            .unwrap();
        let neighbours = GoldNeighbours::new(&gold);
        let key = BTreeSet::from([sig("dog", ":mod", "cat")]);

        assert!(neighbours.signature(0, &[0, 1, 3]).is_empty());
        assert!(!neighbours.identifies(0, &[0, 1, 3], &key));
        assert!(neighbours.identifies(0, &[0, 1], &key));
        assert!(!neighbours.identifies(1, &[0, 1], &key));
    }

    #[test]
    fn test_group_by_label_normalizes() {
        let gold = GoldGraphRecord::new(["Obama"])
            .node("x", "\"Obama\"", Some(vec![0]))
            .node("y", "Obama", Some(vec![0]))
            .build()
            .unwrap();
        let groups = group_by_label(&gold);
        assert_eq!(groups.get("Obama"), Some(&vec![0, 1]));
    }
}
