//! Alignment repair for gold graphs
//!
//! Nodes without a token alignment inherit one from their graph neighbours,
//! one hop per sweep: the largest position among aligned children, or failing
//! that the smallest position among aligned parents. Nodes still unaligned
//! when a sweep makes no progress are force-aligned to token 0.

use crate::graph::gold::GoldGraph;
use crate::types::GoldIdx;
use serde::Serialize;

/// What the repair pass had to do to a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Nodes that were unaligned before the repair
    pub unaligned: Vec<GoldIdx>,
    /// Nodes that could not be reached through neighbours and were
    /// force-aligned to token 0
    pub forced: Vec<GoldIdx>,
}

impl RepairReport {
    /// Check if the graph needed no repair at all
    pub fn is_clean(&self) -> bool {
        self.unaligned.is_empty()
    }

    /// Check if the degraded token-0 fallback was used
    pub fn is_degraded(&self) -> bool {
        !self.forced.is_empty()
    }
}

/// One sweep: alignments inferred from the current (pre-sweep) state
fn sweep(gold: &GoldGraph, unaligned: &[GoldIdx]) -> Vec<(GoldIdx, usize)> {
    let mut fixes = Vec::new();
    for &node in unaligned {
        let from_children = gold
            .children(node)
            .filter_map(|(child, _)| gold.alignment(child))
            .filter_map(|positions| positions.iter().max().copied())
            .max();
        let inferred = from_children.or_else(|| {
            gold.parents(node)
                .filter_map(|(parent, _)| gold.alignment(parent))
                .filter_map(|positions| positions.iter().min().copied())
                .min()
        });
        if let Some(position) = inferred {
            fixes.push((node, position));
        }
    }
    fixes
}

/// Fill in missing alignments on `gold` in place.
///
/// Terminates after at most `|nodes| + 1` sweeps; every sweep either aligns at
/// least one node or triggers the token-0 fallback.
pub fn repair_alignments(gold: &mut GoldGraph) -> RepairReport {
    let mut unaligned = gold.unaligned_nodes();
    let mut report = RepairReport {
        unaligned: unaligned.clone(),
        forced: Vec::new(),
    };
    if unaligned.is_empty() {
        return report;
    }

    // single token, single unaligned node: nothing else it could align to
    if unaligned.len() == 1 && gold.tokens().len() == 1 {
        gold.set_alignment(unaligned[0], vec![0]);
        return report;
    }

    let max_sweeps = gold.len() + 1;
    let mut sweeps = 0;
    while !unaligned.is_empty() {
        let fixes = if sweeps < max_sweeps {
            sweep(gold, &unaligned)
        } else {
            Vec::new()
        };
        sweeps += 1;

        if fixes.is_empty() {
            tracing::warn!(
                nodes = unaligned.len(),
                "alignment repair stalled, force-aligning remaining nodes to token 0"
            );
            for &node in &unaligned {
                gold.set_alignment(node, vec![0]);
            }
            report.forced = std::mem::take(&mut unaligned);
            break;
        }

        for &(node, position) in &fixes {
            gold.set_alignment(node, vec![position]);
        }
        unaligned.retain(|node| !fixes.iter().any(|(fixed, _)| fixed == node));
    }

    report
}
