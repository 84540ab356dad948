//! Selected-subset construction.
//!
//! The dashboard anchors every per-example artifact on a fixed-size
//! subset of the longest evaluation sentences. Each selected example is
//! re-matched to its original dataset record by token-set overlap so the
//! artifacts can be keyed by the dataset's native identifier.

use std::collections::HashSet;

use tracing::warn;

use crate::artifacts::SubsetEntry;
use crate::config::PipelineConfig;
use crate::corpus::EvalSplit;
use crate::error::PipelineError;
use crate::model::SubwordTokenizer;
use crate::subword::strip_padding;

/// Overlap thresholds tried in order; matching is approximate because the
/// subset tokens went through batch padding and truncation.
const OVERLAP_THRESHOLDS: [f64; 2] = [0.95, 0.93];

/// Jaccard overlap between two token sequences, as sets.
pub fn token_overlap(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Pick the `subset_size` examples with the longest non-padded token
/// length, descending. Ties keep ascending attention-id order.
pub fn select_longest(tokens: &[Vec<String>], cfg: &PipelineConfig) -> Vec<usize> {
    let mut lengths: Vec<(usize, usize)> = tokens
        .iter()
        .enumerate()
        .map(|(id, seq)| {
            let non_pad = seq.iter().filter(|t| **t != cfg.pad_token).count();
            (id, non_pad)
        })
        .collect();
    lengths.sort_by(|a, b| b.1.cmp(&a.1));
    lengths
        .into_iter()
        .take(cfg.subset_size)
        .map(|(id, _)| id)
        .collect()
}

/// Re-match selected examples to dataset records by token overlap,
/// relaxing the threshold once for anything the strict pass missed.
///
/// Unmatched entries are flagged with `idx = -1` and logged; downstream
/// stages skip them (a partial result is still useful).
pub fn match_subset(
    selected: &[usize],
    tokens: &[Vec<String>],
    split: &EvalSplit,
    tokenizer: &dyn SubwordTokenizer,
    cfg: &PipelineConfig,
) -> Vec<SubsetEntry> {
    let encoded: Vec<(i64, Vec<String>)> = split
        .records()
        .iter()
        .map(|r| (r.idx, tokenizer.encode(&r.sentence, cfg.max_seq_len)))
        .collect();

    let mut entries: Vec<SubsetEntry> = selected
        .iter()
        .map(|&attention_id| SubsetEntry {
            attention_id,
            tokens: tokens[attention_id].clone(),
            idx: -1,
        })
        .collect();

    for threshold in OVERLAP_THRESHOLDS {
        for entry in &mut entries {
            if entry.idx != -1 {
                continue;
            }
            let stripped = strip_padding(&entry.tokens, &cfg.pad_token);
            for (idx, target) in &encoded {
                if token_overlap(&stripped, target) > threshold {
                    entry.idx = *idx;
                    break;
                }
            }
        }
    }

    for entry in &entries {
        if entry.idx == -1 {
            let err = PipelineError::JoinNotFound {
                attention_id: entry.attention_id,
            };
            warn!("Flagging subset entry: {err}");
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SentenceRecord;

    struct WhitespaceTokenizer;

    impl SubwordTokenizer for WhitespaceTokenizer {
        fn encode(&self, sentence: &str, max_len: usize) -> Vec<String> {
            let mut out = vec!["[CLS]".to_string()];
            out.extend(sentence.split_whitespace().map(String::from));
            out.push("[SEP]".to_string());
            out.truncate(max_len);
            out
        }
    }

    fn padded(words: &[&str], total: usize) -> Vec<String> {
        let mut out = vec!["[CLS]".to_string()];
        out.extend(words.iter().map(|s| (*s).to_string()));
        out.push("[SEP]".to_string());
        while out.len() < total {
            out.push("[PAD]".to_string());
        }
        out
    }

    #[test]
    fn test_token_overlap() {
        let a = padded(&["a", "b"], 4);
        assert!((token_overlap(&a, &a) - 1.0).abs() < 1e-12);
        let b = padded(&["a", "c"], 4);
        // Sets {CLS, a, b, SEP} vs {CLS, a, c, SEP}: 3 shared of 5.
        assert!((token_overlap(&a, &b) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_select_longest_ignores_padding() {
        let cfg = PipelineConfig {
            subset_size: 2,
            ..PipelineConfig::default()
        };
        let tokens = vec![
            padded(&["a"], 8),
            padded(&["a", "b", "c", "d"], 8),
            padded(&["a", "b"], 8),
        ];
        let selected = select_longest(&tokens, &cfg);
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn test_select_longest_ties_keep_id_order() {
        let cfg = PipelineConfig {
            subset_size: 3,
            ..PipelineConfig::default()
        };
        let tokens = vec![padded(&["a"], 4), padded(&["b"], 4), padded(&["c"], 4)];
        assert_eq!(select_longest(&tokens, &cfg), vec![0, 1, 2]);
    }

    #[test]
    fn test_match_subset_joins_by_overlap() {
        let cfg = PipelineConfig::default();
        let split = EvalSplit::from_records(vec![
            SentenceRecord {
                idx: 10,
                sentence: "the movie was long and dull".into(),
                label: 0,
            },
            SentenceRecord {
                idx: 11,
                sentence: "a fine effort".into(),
                label: 1,
            },
        ]);
        let tokens = vec![
            padded(&["a", "fine", "effort"], 10),
            padded(&["the", "movie", "was", "long", "and", "dull"], 10),
        ];
        let entries = match_subset(&[0, 1], &tokens, &split, &WhitespaceTokenizer, &cfg);
        assert_eq!(entries[0].idx, 11);
        assert_eq!(entries[1].idx, 10);
        assert_eq!(entries[0].attention_id, 0);
    }

    #[test]
    fn test_unmatched_entry_flagged() {
        let cfg = PipelineConfig::default();
        let split = EvalSplit::from_records(vec![SentenceRecord {
            idx: 0,
            sentence: "completely different words here".into(),
            label: 0,
        }]);
        let tokens = vec![padded(&["nothing", "in", "common"], 8)];
        let entries = match_subset(&[0], &tokens, &split, &WhitespaceTokenizer, &cfg);
        assert_eq!(entries[0].idx, -1);
    }
}
