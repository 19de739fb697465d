//! Gold graphs: the oracle and align-mode input
//!
//! A gold graph arrives as a [`GoldGraphRecord`] with string node ids (the
//! form a graph provider serializes) and is validated into a [`GoldGraph`]
//! that addresses nodes by dense [`GoldIdx`] indices. All structural problems
//! are reported here, at load time, rather than deep inside the oracle loop.

use crate::errors::{AmrError, Result};
use crate::types::{Edge, GoldIdx};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A gold node as supplied by the graph provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldNodeRecord {
    pub id: String,
    pub label: String,
    /// Aligned token positions, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Vec<usize>>,
}

/// A gold edge as supplied by the graph provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldEdgeRecord {
    pub source: String,
    pub label: String,
    pub target: String,
}

/// Serialized form of a gold graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldGraphRecord {
    pub tokens: Vec<String>,
    pub nodes: Vec<GoldNodeRecord>,
    #[serde(default)]
    pub edges: Vec<GoldEdgeRecord>,
    #[serde(default)]
    pub root: Option<String>,
}

impl GoldGraphRecord {
    /// Start a record for a tokenized sentence
    pub fn new<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builder method: add a node
    pub fn node(
        mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        alignment: Option<Vec<usize>>,
    ) -> Self {
        self.nodes.push(GoldNodeRecord {
            id: id.into(),
            label: label.into(),
            alignment,
        });
        self
    }

    /// Builder method: add an edge
    pub fn edge(
        mut self,
        source: impl Into<String>,
        label: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edges.push(GoldEdgeRecord {
            source: source.into(),
            label: label.into(),
            target: target.into(),
        });
        self
    }

    /// Builder method: declare the root
    pub fn root(mut self, id: impl Into<String>) -> Self {
        self.root = Some(id.into());
        self
    }

    /// Validate into a [`GoldGraph`]
    pub fn build(self) -> Result<GoldGraph> {
        GoldGraph::try_from(self)
    }
}

/// A validated gold graph with dense node indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GoldGraphRecord", into = "GoldGraphRecord")]
pub struct GoldGraph {
    tokens: Vec<String>,
    ids: Vec<String>,
    labels: Vec<String>,
    alignments: Vec<Option<Vec<usize>>>,
    edges: Vec<Edge<GoldIdx>>,
    root: Option<GoldIdx>,
    index: FxHashMap<String, GoldIdx>,
}

impl TryFrom<GoldGraphRecord> for GoldGraph {
    type Error = AmrError;

    fn try_from(record: GoldGraphRecord) -> Result<Self> {
        if record.tokens.is_empty() && !record.nodes.is_empty() {
            return Err(AmrError::malformed_graph(
                "graph has nodes but the sentence has no tokens",
            ));
        }

        let num_tokens = record.tokens.len();
        let mut index = FxHashMap::with_capacity_and_hasher(record.nodes.len(), Default::default());
        let mut ids = Vec::with_capacity(record.nodes.len());
        let mut labels = Vec::with_capacity(record.nodes.len());
        let mut alignments = Vec::with_capacity(record.nodes.len());

        for node in record.nodes {
            if index.contains_key(&node.id) {
                return Err(AmrError::malformed_graph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            let alignment = match node.alignment {
                Some(positions) if !positions.is_empty() => {
                    if let Some(&bad) = positions.iter().find(|&&p| p >= num_tokens) {
                        return Err(AmrError::malformed_graph(format!(
                            "node '{}' aligned to token {} but the sentence has {} tokens",
                            node.id, bad, num_tokens
                        )));
                    }
                    Some(positions)
                }
                _ => None,
            };
            index.insert(node.id.clone(), ids.len());
            ids.push(node.id);
            labels.push(node.label);
            alignments.push(alignment);
        }

        let lookup = |id: &str, role: &str| -> Result<GoldIdx> {
            index.get(id).copied().ok_or_else(|| {
                AmrError::malformed_graph(format!("{role} '{id}' is not in the node list"))
            })
        };

        let mut edges = Vec::with_capacity(record.edges.len());
        for edge in &record.edges {
            if !edge.label.starts_with(':') {
                return Err(AmrError::malformed_graph(format!(
                    "edge label '{}' lacks the ':' relation marker",
                    edge.label
                )));
            }
            let source = lookup(&edge.source, "edge source")?;
            let target = lookup(&edge.target, "edge target")?;
            edges.push(Edge::new(source, edge.label.clone(), target));
        }

        let root = match record.root.as_deref() {
            Some(id) => Some(lookup(id, "root")?),
            None => None,
        };

        Ok(Self {
            tokens: record.tokens,
            ids,
            labels,
            alignments,
            edges,
            root,
            index,
        })
    }
}

impl From<GoldGraph> for GoldGraphRecord {
    fn from(graph: GoldGraph) -> Self {
        let nodes = graph
            .ids
            .iter()
            .zip(&graph.labels)
            .zip(&graph.alignments)
            .map(|((id, label), alignment)| GoldNodeRecord {
                id: id.clone(),
                label: label.clone(),
                alignment: alignment.clone(),
            })
            .collect();
        let edges = graph
            .edges
            .iter()
            .map(|e| GoldEdgeRecord {
                source: graph.ids[e.source].clone(),
                label: e.label.clone(),
                target: graph.ids[e.target].clone(),
            })
            .collect();
        let root = graph.root.map(|r| graph.ids[r].clone());
        GoldGraphRecord {
            tokens: graph.tokens,
            nodes,
            edges,
            root,
        }
    }
}

impl GoldGraph {
    /// Parse and validate a gold graph from its JSON record
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sentence tokens
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over node indices in provider order
    pub fn node_indices(&self) -> std::ops::Range<GoldIdx> {
        0..self.ids.len()
    }

    /// Provider id of a node
    pub fn id(&self, node: GoldIdx) -> &str {
        &self.ids[node]
    }

    /// Raw label of a node
    pub fn label(&self, node: GoldIdx) -> &str {
        &self.labels[node]
    }

    /// Aligned token positions of a node, if aligned
    pub fn alignment(&self, node: GoldIdx) -> Option<&[usize]> {
        self.alignments[node].as_deref()
    }

    /// Look up a node index by provider id
    pub fn index_of(&self, id: &str) -> Option<GoldIdx> {
        self.index.get(id).copied()
    }

    /// Edges in provider order
    pub fn edges(&self) -> &[Edge<GoldIdx>] {
        &self.edges
    }

    /// The declared root
    pub fn root(&self) -> Option<GoldIdx> {
        self.root
    }

    /// Outgoing `(target, relation)` pairs of a node
    pub fn children(&self, node: GoldIdx) -> impl Iterator<Item = (GoldIdx, &str)> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.source == node)
            .map(|e| (e.target, e.label.as_str()))
    }

    /// Incoming `(source, relation)` pairs of a node
    pub fn parents(&self, node: GoldIdx) -> impl Iterator<Item = (GoldIdx, &str)> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.target == node)
            .map(|e| (e.source, e.label.as_str()))
    }

    pub fn has_edge(&self, source: GoldIdx, label: &str, target: GoldIdx) -> bool {
        self.children(source).any(|(t, l)| t == target && l == label)
    }

    /// Nodes without any aligned token, in provider order
    pub fn unaligned_nodes(&self) -> Vec<GoldIdx> {
        self.node_indices()
            .filter(|&n| self.alignments[n].is_none())
            .collect()
    }

    /// Replace the alignment of a node
    pub(crate) fn set_alignment(&mut self, node: GoldIdx, positions: Vec<usize>) {
        self.alignments[node] = Some(positions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dog_bites() -> GoldGraphRecord {
        GoldGraphRecord::new(["the", "dog", "bites"])
            .node("b", "bite-01", Some(vec![2]))
            .node("d", "dog", Some(vec![1]))
            .edge("b", ":ARG0", "d")
            .root("b")
    }

    #[test]
    fn test_build_indexes_nodes() {
        let gold = dog_bites().build().unwrap();
        assert_eq!(gold.len(), 2);
        assert_eq!(gold.index_of("d"), Some(1));
        assert_eq!(gold.label(0), "bite-01");
        assert_eq!(gold.root(), Some(0));
        assert_eq!(gold.edges()[0], Edge::new(0, ":ARG0", 1));
        assert_eq!(gold.children(0).collect::<Vec<_>>(), vec![(1, ":ARG0")]);
        assert_eq!(gold.parents(1).collect::<Vec<_>>(), vec![(0, ":ARG0")]);
    }

    #[test]
    fn test_unknown_edge_endpoint_rejected() {
        let err = dog_bites().edge("b", ":ARG1", "x").build().unwrap_err();
        assert!(matches!(err, AmrError::MalformedGraph { .. }));
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_alignment_out_of_range_rejected() {
        let err = dog_bites()
            .node("c", "cat", Some(vec![3]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("token 3"));
    }

    #[test]
    fn test_duplicate_id_and_bad_label_rejected() {
        assert!(dog_bites().node("d", "cat", None).build().is_err());
        assert!(dog_bites().edge("b", "ARG1", "d").build().is_err());
        assert!(dog_bites().root("zz").build().is_err());
    }

    #[test]
    fn test_empty_alignment_is_unaligned() {
        let gold = dog_bites().node("x", "thing", Some(vec![])).build().unwrap();
        assert_eq!(gold.unaligned_nodes(), vec![2]);
    }

    #[test]
    fn test_json_roundtrip() {
        let json = r#"{
            "tokens": ["the", "dog", "bites"],
            "nodes": [
                {"id": "b", "label": "bite-01", "alignment": [2]},
                {"id": "d", "label": "dog"}
            ],
            "edges": [{"source": "b", "label": ":ARG0", "target": "d"}],
            "root": "b"
        }"#;
        let gold = GoldGraph::from_json_str(json).unwrap();
        assert_eq!(gold.alignment(1), None);

        let back: GoldGraph =
            serde_json::from_str(&serde_json::to_string(&gold).unwrap()).unwrap();
        assert_eq!(back, gold);
    }
}
