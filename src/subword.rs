//! Subword Merger.
//!
//! The tokenizer splits rare words into sub-word units flagged with a
//! continuation prefix. Dependency parsing operates on whole words, so
//! this stage collapses a padding-stripped token sequence and its
//! attention tensor to word boundaries: continuation text is concatenated
//! onto its anchor token, attention columns within a merge group are
//! summed into the anchor's key column, and rows are averaged into the
//! anchor's query row.

use ndarray::{Array4, ArrayView4};

/// A maximal run of continuation tokens attached to one anchor token.
///
/// `anchor` is the index of the first sub-word unit in the original
/// padding-stripped sequence; `run` is the number of continuation tokens
/// that follow it. Groups are non-overlapping and ordered by anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeGroup {
    pub anchor: usize,
    pub run: usize,
}

/// Word-level view of one example's token sequence.
#[derive(Debug, Clone)]
pub struct WordMerge {
    /// Reconstructed surface words, boundary markers included.
    pub words: Vec<String>,
    /// Token span `(start, len)` per word, in original token coordinates.
    pub spans: Vec<(usize, usize)>,
}

impl WordMerge {
    /// Merge groups in ascending anchor order (spans with continuations).
    pub fn merge_groups(&self) -> Vec<MergeGroup> {
        self.spans
            .iter()
            .filter(|(_, len)| *len > 1)
            .map(|&(start, len)| MergeGroup {
                anchor: start,
                run: len - 1,
            })
            .collect()
    }
}

/// Drop padding tokens from a sequence.
pub fn strip_padding(tokens: &[String], pad_token: &str) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| t.as_str() != pad_token)
        .cloned()
        .collect()
}

/// Scan a padding-stripped token sequence once, grouping each maximal
/// continuation run with the non-continuation token preceding it.
///
/// The scan never looks past the array end: a continuation run that
/// finishes on the final token closes its group at the boundary.
pub fn merge_subwords(tokens: &[String], subword_prefix: &str) -> WordMerge {
    let mut words: Vec<String> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let is_continuation = token.starts_with(subword_prefix) && !words.is_empty();
        if is_continuation {
            if let Some(word) = words.last_mut() {
                word.push_str(&token[subword_prefix.len()..]);
            }
            if let Some(last) = spans.last_mut() {
                last.1 += 1;
            }
        } else {
            words.push(token.clone());
            spans.push((i, 1));
        }
    }

    WordMerge { words, spans }
}

/// Collapse an attention tensor `[layers, heads, seq, seq]` (already
/// sliced to the padding-stripped token length) to word boundaries.
///
/// For each output cell, the key axis is summed over the source word's
/// token span and the query axis is averaged; the result is cropped to
/// the word count on both axes. Equivalent to applying each merge group
/// in ascending anchor order with index-shift accounting.
pub fn collapse_attention(attn: ArrayView4<'_, f32>, spans: &[(usize, usize)]) -> Array4<f32> {
    let (layers, heads, _, _) = attn.dim();
    let n_words = spans.len();
    let mut out = Array4::<f32>::zeros((layers, heads, n_words, n_words));

    for layer in 0..layers {
        for head in 0..heads {
            for (i, &(q_start, q_len)) in spans.iter().enumerate() {
                for (j, &(k_start, k_len)) in spans.iter().enumerate() {
                    let mut acc = 0.0f32;
                    for q in q_start..q_start + q_len {
                        for k in k_start..k_start + k_len {
                            acc += attn[[layer, head, q, k]];
                        }
                    }
                    out[[layer, head, i, j]] = acc / q_len as f32;
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn toks(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_merge_reconstructs_words() {
        let tokens = toks(&["[CLS]", "un", "##bel", "##iev", "##able", "plot", "[SEP]"]);
        let merge = merge_subwords(&tokens, "##");
        assert_eq!(
            merge.words,
            vec!["[CLS]", "unbelievable", "plot", "[SEP]"]
        );
        assert_eq!(merge.spans, vec![(0, 1), (1, 4), (5, 1), (6, 1)]);
        assert_eq!(
            merge.merge_groups(),
            vec![MergeGroup { anchor: 1, run: 3 }]
        );
    }

    #[test]
    fn test_word_count_equals_non_continuation_count() {
        let tokens = toks(&["[CLS]", "a", "##b", "c", "##d", "##e", "f", "[SEP]"]);
        let merge = merge_subwords(&tokens, "##");
        let non_continuation = tokens.iter().filter(|t| !t.starts_with("##")).count();
        assert_eq!(merge.words.len(), non_continuation);
    }

    #[test]
    fn test_trailing_continuation_run_closes_at_boundary() {
        // No look-ahead past the final token.
        let tokens = toks(&["[CLS]", "resp", "##ons", "##ible"]);
        let merge = merge_subwords(&tokens, "##");
        assert_eq!(merge.words, vec!["[CLS]", "responsible"]);
        assert_eq!(merge.spans, vec![(0, 1), (1, 3)]);
    }

    #[test]
    fn test_strip_padding() {
        let tokens = toks(&["[CLS]", "a", "[SEP]", "[PAD]", "[PAD]"]);
        assert_eq!(strip_padding(&tokens, "[PAD]"), toks(&["[CLS]", "a", "[SEP]"]));
    }

    #[test]
    fn test_collapse_sums_keys_and_averages_queries() {
        // 4 tokens, one merge group spanning tokens 1..3.
        let spans = vec![(0, 1), (1, 2), (3, 1)];
        let mut attn = Array4::<f32>::zeros((1, 1, 4, 4));
        for q in 0..4 {
            for k in 0..4 {
                attn[[0, 0, q, k]] = (q * 4 + k) as f32;
            }
        }
        let out = collapse_attention(attn.view(), &spans);
        assert_eq!(out.dim(), (1, 1, 3, 3));

        // Key column at the anchor = sum of columns 1 and 2 for row 0.
        let expected_key = attn[[0, 0, 0, 1]] + attn[[0, 0, 0, 2]];
        assert!((out[[0, 0, 0, 1]] - expected_key).abs() < 1e-6);

        // Query row at the anchor = mean of rows 1 and 2 at column 3.
        let expected_query = (attn[[0, 0, 1, 3]] + attn[[0, 0, 2, 3]]) / 2.0;
        assert!((out[[0, 0, 1, 2]] - expected_query).abs() < 1e-6);

        // Merged cell combines both: mean over rows of the column sums.
        let expected_both = ((attn[[0, 0, 1, 1]] + attn[[0, 0, 1, 2]])
            + (attn[[0, 0, 2, 1]] + attn[[0, 0, 2, 2]]))
            / 2.0;
        assert!((out[[0, 0, 1, 1]] - expected_both).abs() < 1e-6);
    }

    #[test]
    fn test_collapse_identity_when_no_groups() {
        let spans = vec![(0, 1), (1, 1), (2, 1)];
        let attn = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, q, k)| (q + k) as f32);
        let out = collapse_attention(attn.view(), &spans);
        assert_eq!(out, attn);
    }
}
