//! Action vocabulary helpers
//!
//! Downstream models work with a vocabulary of action strings. Arc pointers
//! are peeled off before counting, so `>LA(3,:ARG0)` and `>LA(7,:ARG0)` are
//! the same vocabulary entry `>LA(:ARG0)`.

use crate::errors::Result;
use crate::types::{base_action, split_arc, BaseAction, MachineConfig};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Vocabulary entries that never map to an action
const SPECIAL_SYMBOLS: [&str; 4] = ["<s>", "<pad>", "<unk>", "<mask>"];

/// Strip the pointer off an arc action.
///
/// `>LA(3,:ARG0)` becomes `(">LA(:ARG0)", Some(3))`. Anything else is returned
/// unchanged with no pointer.
pub fn peel_pointer(action: &str) -> (String, Option<u32>) {
    let Some((base, inner)) = split_arc(action) else {
        return (action.to_string(), None);
    };
    let Some((pos, label)) = inner.split_once(',') else {
        return (action.to_string(), None);
    };
    match pos.trim().parse::<u32>() {
        Ok(pos) => (format!("{}({})", base.as_str(), label.trim()), Some(pos)),
        Err(_) => (action.to_string(), None),
    }
}

/// Group vocabulary indices by the base action they stand for.
///
/// Special symbols are skipped, the end-of-sentence entry maps to CLOSE, and
/// only base actions enabled by `config` are kept.
pub fn canonical_action_ids(
    vocab: &[String],
    eos_index: usize,
    config: &MachineConfig,
) -> BTreeMap<BaseAction, Vec<usize>> {
    let enabled = config.base_vocabulary();
    let mut ids: BTreeMap<BaseAction, Vec<usize>> = BTreeMap::new();
    for (idx, entry) in vocab.iter().enumerate() {
        if SPECIAL_SYMBOLS.contains(&entry.as_str()) || entry.starts_with("madeupword") {
            continue;
        }
        let base = if idx == eos_index {
            BaseAction::Close
        } else {
            base_action(entry)
        };
        if enabled.contains(&base) {
            ids.entry(base).or_default().push(idx);
        }
    }
    ids
}

/// Frequency counts over oracle action sequences, split into node names,
/// left arcs, right arcs and control actions
#[derive(Debug, Clone, Default)]
pub struct VocabStats {
    no_close: bool,
    config: MachineConfig,
    pub nodes: FxHashMap<String, usize>,
    pub left_arcs: FxHashMap<String, usize>,
    pub right_arcs: FxHashMap<String, usize>,
    pub control: FxHashMap<String, usize>,
}

impl VocabStats {
    /// Create empty counts. With `no_close`, CLOSE is not counted (models
    /// emit end-of-sentence instead).
    pub fn new(config: MachineConfig, no_close: bool) -> Self {
        Self {
            no_close,
            config,
            ..Self::default()
        }
    }

    /// Count one action string
    pub fn update(&mut self, action: &str) {
        if self.no_close && matches!(action, "CLOSE" | "_CLOSE_") {
            return;
        }

        let base = base_action(action);
        let enabled = self.config.base_vocabulary().contains(&base);
        let counter = match base {
            BaseAction::LeftArc => &mut self.left_arcs,
            BaseAction::RightArc => &mut self.right_arcs,
            BaseAction::Node => &mut self.nodes,
            _ if enabled => &mut self.control,
            // e.g. COPY with copy disabled reads as a node name
            _ => &mut self.nodes,
        };
        let (entry, _) = peel_pointer(action);
        *counter.entry(entry).or_insert(0) += 1;
    }

    /// Count every action of a sequence
    pub fn update_all<'a>(&mut self, actions: impl IntoIterator<Item = &'a str>) {
        for action in actions {
            self.update(action);
        }
    }

    /// Number of distinct node names
    pub fn num_node_names(&self) -> usize {
        self.nodes.len()
    }

    /// Merge counts from another collection (e.g. a parallel shard)
    pub fn merge(&mut self, other: &VocabStats) {
        for (mine, theirs) in [
            (&mut self.nodes, &other.nodes),
            (&mut self.left_arcs, &other.left_arcs),
            (&mut self.right_arcs, &other.right_arcs),
            (&mut self.control, &other.control),
        ] {
            for (key, count) in theirs {
                *mine.entry(key.clone()).or_insert(0) += count;
            }
        }
    }

    /// `key\tcount` lines for the node-name file
    pub fn node_lines(&self) -> Vec<String> {
        most_common(&self.nodes)
            .into_iter()
            .map(|(k, v)| format!("{k}\t{v}"))
            .collect()
    }

    /// `key\tcount` lines for everything else: control, left arcs, right arcs
    pub fn other_lines(&self) -> Vec<String> {
        [&self.control, &self.left_arcs, &self.right_arcs]
            .into_iter()
            .flat_map(most_common)
            .map(|(k, v)| format!("{k}\t{v}"))
            .collect()
    }

    /// Write `<prefix>.nodes` and `<prefix>.others`
    pub fn write(&self, prefix: impl AsRef<Path>) -> Result<()> {
        let prefix = prefix.as_ref().to_string_lossy().into_owned();
        for (suffix, lines) in [("nodes", self.node_lines()), ("others", self.other_lines())] {
            let mut file = std::fs::File::create(format!("{prefix}.{suffix}"))?;
            for line in lines {
                writeln!(file, "{line}")?;
            }
        }
        Ok(())
    }
}

/// Entries by descending count, ties by key
pub fn most_common(counts: &FxHashMap<String, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> =
        counts.iter().map(|(k, &v)| (k.clone(), v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

impl fmt::Display for VocabStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top = |counts: &FxHashMap<String, usize>| {
            most_common(counts)
                .into_iter()
                .take(20)
                .map(|(k, v)| format!("{k}:{v}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(f, "node names: {}", self.num_node_names())?;
        writeln!(f, "most frequent node names: {}", top(&self.nodes))?;
        writeln!(f, "most frequent left arcs: {}", top(&self.left_arcs))?;
        writeln!(f, "most frequent right arcs: {}", top(&self.right_arcs))?;
        write!(f, "control actions: {}", top(&self.control))
    }
}
