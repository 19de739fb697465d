//! Alignment sampling from node × token probability tables
//!
//! An external aligner scores every (node, token) pair. Each row is normalized
//! into a token posterior for its node, optionally sharpened or flattened by
//! a temperature, and one token position is drawn per node. Draws come from a
//! seeded [`StdRng`], so a fixed seed reproduces the same alignments.

use crate::errors::{AmrError, Result};
use crate::graph::gold::GoldGraph;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Joint node × token probabilities for one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentProbabilities {
    /// Gold node ids, one per row of `probs`
    pub node_ids: Vec<String>,
    /// `probs[i][j]`: weight of aligning node `node_ids[i]` to token `j`
    pub probs: Vec<Vec<f64>>,
}

impl AlignmentProbabilities {
    /// Token posterior of each node, after optional temperature scaling
    pub fn posteriors(&self, temperature: Option<f64>) -> Result<Vec<Vec<f64>>> {
        if let Some(t) = temperature {
            if !(t.is_finite() && t > 0.0) {
                return Err(AmrError::invalid_alignments(format!(
                    "temperature must be positive, got {t}"
                )));
            }
        }

        self.probs
            .iter()
            .zip(&self.node_ids)
            .map(|(row, id)| {
                let mut posterior = normalized(row, id)?;
                if let Some(t) = temperature {
                    for p in posterior.iter_mut() {
                        *p = p.powf(1.0 / t);
                    }
                    posterior = normalized(&posterior, id)?;
                }
                Ok(posterior)
            })
            .collect()
    }
}

fn normalized(row: &[f64], id: &str) -> Result<Vec<f64>> {
    if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(AmrError::invalid_alignments(format!(
            "node '{id}' has a negative or non-finite probability"
        )));
    }
    let total: f64 = row.iter().sum();
    if total <= 0.0 {
        return Err(AmrError::invalid_alignments(format!(
            "node '{id}' has no probability mass"
        )));
    }
    Ok(row.iter().map(|p| p / total).collect())
}

/// Draw one token position per node and return `gold` with those alignments.
///
/// The table must cover exactly the nodes of `gold`, and every draw must land
/// inside the sentence.
pub fn sample_alignments(
    table: &AlignmentProbabilities,
    gold: &GoldGraph,
    temperature: Option<f64>,
    seed: u64,
) -> Result<GoldGraph> {
    if table.node_ids.len() != table.probs.len() {
        return Err(AmrError::invalid_alignments(format!(
            "{} node ids but {} probability rows",
            table.node_ids.len(),
            table.probs.len()
        )));
    }

    let table_ids: BTreeSet<&str> = table.node_ids.iter().map(String::as_str).collect();
    let gold_ids: BTreeSet<&str> = gold.node_indices().map(|n| gold.id(n)).collect();
    if table_ids.len() != table.node_ids.len() || table_ids != gold_ids {
        return Err(AmrError::invalid_alignments(
            "node ids do not match the graph's node set",
        ));
    }

    let posteriors = table.posteriors(temperature)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sampled = gold.clone();
    let num_tokens = gold.tokens().len();

    for (id, posterior) in table.node_ids.iter().zip(&posteriors) {
        let dist = WeightedIndex::new(posterior).map_err(|err| {
            AmrError::invalid_alignments(format!("node '{id}': {err}"))
        })?;
        let position = dist.sample(&mut rng);
        if position >= num_tokens {
            return Err(AmrError::invalid_alignments(format!(
                "node '{id}' sampled token {position} but the sentence has {num_tokens} tokens"
            )));
        }
        let node = gold
            .index_of(id)
            .ok_or_else(|| AmrError::internal(format!("node '{id}' vanished from the graph")))?;
        sampled.set_alignment(node, vec![position]);
    }

    Ok(sampled)
}
