//! Atlas aggregation.
//!
//! Merges the per-example semantic and gradient rankings, the
//! per-relation syntactic ranking and the corpus confidence statistic
//! into one dataset-level record per (layer, head). Absent signals
//! default to zero so the output always holds exactly layers x heads
//! entries.

use std::collections::HashMap;

use crate::artifacts::{AtlasEntry, HeadId, RankedHeads, RankingById, SyntacticRanking};
use crate::config::PipelineConfig;

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.is_nan() {
        0.0
    } else {
        mean
    }
}

/// Aggregate all four signals into atlas records, layer-major.
pub fn build_atlas(
    semantic: &RankingById,
    syntactic: &SyntacticRanking,
    gradient: &RankingById,
    confidence: &RankedHeads,
    cfg: &PipelineConfig,
) -> Vec<AtlasEntry> {
    let mut semantic_scores: HashMap<HeadId, Vec<f64>> = HashMap::new();
    for ranking in semantic.values() {
        for &(score, head) in ranking {
            semantic_scores.entry(head).or_default().push(score);
        }
    }

    let mut gradient_scores: HashMap<HeadId, Vec<f64>> = HashMap::new();
    for ranking in gradient.values() {
        for &(score, head) in ranking {
            gradient_scores.entry(head).or_default().push(score);
        }
    }

    // Max accuracy over every relation whose top-heads list names the head.
    let mut syntactic_best: HashMap<HeadId, f64> = HashMap::new();
    for relation in syntactic.values() {
        for top in &relation.top_heads {
            let entry = syntactic_best.entry(top.head).or_insert(f64::NEG_INFINITY);
            *entry = entry.max(top.acc);
        }
    }

    let confidence_by_head: HashMap<HeadId, f64> =
        confidence.iter().map(|&(score, head)| (head, score)).collect();

    let mut atlas = Vec::with_capacity(cfg.num_head_ids());
    for layer in 0..cfg.num_layers {
        for head in 0..cfg.num_heads {
            let id = (layer, head);
            atlas.push(AtlasEntry {
                layer,
                head,
                semantic: mean_or_zero(semantic_scores.get(&id).map_or(&[], Vec::as_slice)),
                syntactic: syntactic_best.get(&id).copied().unwrap_or(0.0),
                gradient: mean_or_zero(gradient_scores.get(&id).map_or(&[], Vec::as_slice)),
                confidence: confidence_by_head.get(&id).copied().unwrap_or(0.0),
            });
        }
    }
    atlas
}
