//! Saliency-list assembly.
//!
//! The saliency attributor runs over the same batches as the encoder but
//! in a separate pass, so its rows are re-joined to the selected subset
//! by token overlap on padding-stripped sequences. Each entry carries
//! per-token scores for every class plus example-level metadata.

use std::collections::BTreeMap;

use tracing::warn;

use crate::artifacts::{SaliencyEntry, SaliencyMeta, SaliencyToken, SubsetEntry};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::subset::token_overlap;
use crate::subword::strip_padding;

/// Match threshold for joining attribution rows to subset entries.
const MATCH_THRESHOLD: f64 = 0.95;

/// Build the saliency-list artifact, keyed by dataset identifier.
///
/// `attributions` is indexed `[class][example][padded position]`.
/// Unmatched entries keep an empty token list; metadata is still emitted
/// from the example's own prediction record.
pub fn build_saliency_list(
    subset: &[SubsetEntry],
    tokens: &[Vec<String>],
    attributions: &[Vec<Vec<f64>>],
    labels: &[usize],
    predictions: &[usize],
    softmaxes: &[Vec<f64>],
    cfg: &PipelineConfig,
) -> BTreeMap<i64, SaliencyEntry> {
    let mut out = BTreeMap::new();

    for entry in subset {
        if entry.idx < 0 {
            continue;
        }
        let target = strip_padding(&entry.tokens, &cfg.pad_token);

        let mut saliency_tokens: Vec<SaliencyToken> = Vec::new();
        let mut found = false;
        for (i, candidate) in tokens.iter().enumerate() {
            let stripped = strip_padding(candidate, &cfg.pad_token);
            if token_overlap(&stripped, &target) > MATCH_THRESHOLD {
                for (j, token) in stripped.iter().enumerate() {
                    let scores: BTreeMap<String, f64> = attributions
                        .iter()
                        .enumerate()
                        .map(|(class, rows)| (cfg.class_name(class).to_string(), rows[i][j]))
                        .collect();
                    saliency_tokens.push(SaliencyToken {
                        token: token.clone(),
                        scores,
                    });
                }
                found = true;
                break;
            }
        }

        if !found {
            let err = PipelineError::JoinNotFound {
                attention_id: entry.attention_id,
            };
            warn!("Saliency entry for id {} left empty: {err}", entry.idx);
        }

        let attention_id = entry.attention_id;
        let softmax_scores: BTreeMap<String, f64> = softmaxes[attention_id]
            .iter()
            .enumerate()
            .map(|(class, &score)| (cfg.class_name(class).to_string(), score))
            .collect();
        out.insert(
            entry.idx,
            SaliencyEntry {
                tokens: saliency_tokens,
                meta: SaliencyMeta {
                    true_label: cfg.class_name(labels[attention_id]).to_string(),
                    predicted_label: cfg.class_name(predictions[attention_id]).to_string(),
                    softmax_scores,
                },
            },
        );
    }

    out
}

/// Extract the predicted-class saliency vector of one entry, stopping at
/// the first padding token.
pub fn predicted_saliency(entry: &SaliencyEntry, cfg: &PipelineConfig) -> Vec<f64> {
    let mut values = Vec::with_capacity(entry.tokens.len());
    for token in &entry.tokens {
        if token.token == cfg.pad_token {
            break;
        }
        values.push(
            token
                .scores
                .get(&entry.meta.predicted_label)
                .copied()
                .unwrap_or(0.0),
        );
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(words: &[&str], total: usize) -> Vec<String> {
        let mut out: Vec<String> = words.iter().map(|s| (*s).to_string()).collect();
        while out.len() < total {
            out.push("[PAD]".to_string());
        }
        out
    }

    #[test]
    fn test_build_saliency_list_matches_tokens() {
        let cfg = PipelineConfig::default();
        let tokens = vec![
            padded(&["[CLS]", "good", "film", "[SEP]"], 6),
            padded(&["[CLS]", "bad", "film", "[SEP]"], 6),
        ];
        let subset = vec![SubsetEntry {
            attention_id: 0,
            tokens: tokens[0].clone(),
            idx: 42,
        }];
        // Attribution rows per class, aligned with padded positions.
        let neg = vec![vec![0.0; 6], vec![0.1; 6]];
        let pos = vec![vec![0.5, 0.9, 0.2, 0.1, 0.0, 0.0], vec![0.2; 6]];
        let list = build_saliency_list(
            &subset,
            &tokens,
            &[neg, pos],
            &[1, 0],
            &[1, 0],
            &[vec![0.2, 0.8], vec![0.7, 0.3]],
            &cfg,
        );

        let entry = &list[&42];
        assert_eq!(entry.tokens.len(), 4);
        assert_eq!(entry.tokens[1].token, "good");
        assert_eq!(entry.tokens[1].scores["positive"], 0.9);
        assert_eq!(entry.tokens[1].scores["negative"], 0.0);
        assert_eq!(entry.meta.true_label, "positive");
        assert_eq!(entry.meta.predicted_label, "positive");
        assert_eq!(entry.meta.softmax_scores["positive"], 0.8);
    }

    #[test]
    fn test_flagged_entries_skipped() {
        let cfg = PipelineConfig::default();
        let subset = vec![SubsetEntry {
            attention_id: 0,
            tokens: padded(&["[CLS]", "x", "[SEP]"], 4),
            idx: -1,
        }];
        let list = build_saliency_list(&subset, &[], &[], &[0], &[0], &[vec![1.0, 0.0]], &cfg);
        assert!(list.is_empty());
    }

    #[test]
    fn test_predicted_saliency_stops_at_padding() {
        let cfg = PipelineConfig::default();
        let entry = SaliencyEntry {
            tokens: vec![
                SaliencyToken {
                    token: "good".into(),
                    scores: BTreeMap::from([
                        ("negative".to_string(), -0.1),
                        ("positive".to_string(), 0.7),
                    ]),
                },
                SaliencyToken {
                    token: "[PAD]".into(),
                    scores: BTreeMap::from([
                        ("negative".to_string(), 0.0),
                        ("positive".to_string(), 0.0),
                    ]),
                },
            ],
            meta: SaliencyMeta {
                true_label: "positive".into(),
                predicted_label: "positive".into(),
                softmax_scores: BTreeMap::new(),
            },
        };
        assert_eq!(predicted_saliency(&entry, &cfg), vec![0.7]);
    }
}
