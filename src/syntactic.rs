//! Syntactic head scorer.
//!
//! Treats each attention head as a dependency-edge predictor: a word's
//! predicted parent is the word it attends to most (self-attention and
//! boundary markers excluded). Head accuracies are aggregated per
//! relation over the whole corpus, in both edge directions, and compared
//! against simple fixed-offset baselines.

use std::collections::HashMap;

use ndarray::{Array2, Array4, ArrayView2};
use tracing::debug;

use crate::artifacts::{HeadId, RelationHeads, SyntacticRanking, TopHead};
use crate::config::PipelineConfig;

/// Relations rarer than this are not ranked.
pub const MIN_RELATION_COUNT: usize = 100;

/// Pseudo-relation aggregating every edge.
pub const ALL_RELATIONS: &str = "all";

/// Attention orientation used when reading a head as an edge predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Row i attends to its parent (dep -> head edges).
    Normal,
    /// Column i attends to its parent (head <- dep edges).
    Transpose,
    /// Sum of both orientations.
    Both,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Normal => "dep->head",
            Direction::Transpose => "head<-dep",
            Direction::Both => "both",
        }
    }
}

/// One corpus example with word-level attention and gold dependencies.
#[derive(Debug, Clone)]
pub struct ParsedExample {
    /// Words with boundary markers stripped.
    pub words: Vec<String>,
    /// Word-level attention `[layers, heads, words + 2, words + 2]`;
    /// boundary-marker rows and columns are still present.
    pub attentions: Array4<f32>,
    /// Gold parent per word, 1-based; 0 marks the root.
    pub heads: Vec<usize>,
    /// Gold relation label per word.
    pub relations: Vec<String>,
}

/// Predict a 1-based parent index for every word from one head's
/// word-level attention matrix (boundary rows/columns included).
pub fn head_predictions(attn: ArrayView2<'_, f32>, direction: Direction) -> Vec<usize> {
    let n = attn.nrows();
    let mut m: Array2<f32> = match direction {
        Direction::Normal => attn.to_owned(),
        Direction::Transpose => attn.t().to_owned(),
        Direction::Both => &attn.to_owned() + &attn.t(),
    };

    // Ignore attention to self and to the boundary markers.
    for i in 0..n {
        m[[i, i]] = 0.0;
    }
    if n < 2 {
        return Vec::new();
    }

    let mut predictions = Vec::with_capacity(n - 2);
    for i in 1..n - 1 {
        let mut best_j = 0;
        let mut best = f32::NEG_INFINITY;
        for j in 1..n - 1 {
            if m[[i, j]] > best {
                best = m[[i, j]];
                best_j = j - 1;
            }
        }
        // +1 because ROOT occupies index 0 in gold head space.
        predictions.push(best_j + 1);
    }
    predictions
}

/// Baseline: predict the word at a fixed offset as the parent, clamped
/// to the sequence.
pub fn offset_predictions(n_words: usize, offset: isize) -> Vec<usize> {
    (0..n_words)
        .map(|i| (i as isize + offset + 1).clamp(0, n_words as isize) as usize)
        .collect()
}

/// Accuracy per relation label (plus the "all" pseudo-relation) for a
/// predictor over the whole corpus.
///
/// Special case for "poss": when the gold parent is a possessive clitic
/// immediately following the child, a prediction pointing one position
/// further is also accepted (handles "'s"/"s'" attachment ambiguity).
pub fn evaluate_predictions<F>(predict: F, examples: &[ParsedExample]) -> HashMap<String, f64>
where
    F: Fn(&ParsedExample) -> Vec<usize>,
{
    let mut n_correct: HashMap<String, usize> = HashMap::new();
    let mut n_incorrect: HashMap<String, usize> = HashMap::new();

    for example in examples {
        let predictions = predict(example);
        let words = &example.words;
        for (i, ((&p, &y), r)) in predictions
            .iter()
            .zip(&example.heads)
            .zip(&example.relations)
            .enumerate()
        {
            let mut is_correct = p == y;
            if r == "poss"
                && p < words.len()
                && i + 1 < words.len()
                && (words[i + 1] == "'s" || words[i + 1] == "s'")
            {
                is_correct = predictions.get(i + 1) == Some(&y);
            }
            let bucket = if is_correct {
                &mut n_correct
            } else {
                &mut n_incorrect
            };
            *bucket.entry(r.clone()).or_default() += 1;
            *bucket.entry(ALL_RELATIONS.to_string()).or_default() += 1;
        }
    }

    let mut accuracies = HashMap::new();
    for key in n_correct.keys().chain(n_incorrect.keys()) {
        if accuracies.contains_key(key) {
            continue;
        }
        let correct = *n_correct.get(key).unwrap_or(&0);
        let incorrect = *n_incorrect.get(key).unwrap_or(&0);
        accuracies.insert(key.clone(), correct as f64 / (correct + incorrect) as f64);
    }
    accuracies
}

/// Relation labels with occurrence counts, descending by frequency.
/// Ties keep first-occurrence order for determinism.
pub fn relation_counts(examples: &[ParsedExample]) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for example in examples {
        for relation in &example.relations {
            if !counts.contains_key(relation) {
                order.push(relation.clone());
            }
            *counts.entry(relation.clone()).or_default() += 1;
        }
    }
    let mut out: Vec<(String, usize)> = order
        .into_iter()
        .map(|r| {
            let c = counts[&r];
            (r, c)
        })
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

/// Accuracy maps for every (direction, layer, head) predictor, in
/// direction-major, layer-major, head-minor iteration order.
fn score_all_heads(
    examples: &[ParsedExample],
    cfg: &PipelineConfig,
) -> Vec<(Direction, HeadId, HashMap<String, f64>)> {
    let mut scores = Vec::with_capacity(2 * cfg.num_head_ids());
    for direction in [Direction::Normal, Direction::Transpose] {
        for layer in 0..cfg.num_layers {
            for head in 0..cfg.num_heads {
                let accs = evaluate_predictions(
                    |example: &ParsedExample| {
                        head_predictions(
                            example.attentions.index_axis(ndarray::Axis(0), layer).index_axis(
                                ndarray::Axis(0),
                                head,
                            ),
                            direction,
                        )
                    },
                    examples,
                );
                scores.push((direction, (layer, head), accs));
            }
        }
    }
    scores
}

/// Rank every (head, direction) combination per relation and record the
/// heads beating the best fixed-offset baseline.
///
/// Relations are processed in descending frequency order; ranking stops
/// once frequency drops below the occurrence threshold. "root" and
/// "punct" edges are excluded as trivial.
pub fn rank_relations(examples: &[ParsedExample], cfg: &PipelineConfig) -> SyntacticRanking {
    let head_scores = score_all_heads(examples, cfg);
    let baselines: Vec<(isize, HashMap<String, f64>)> = (-3..3)
        .map(|offset| {
            let accs = evaluate_predictions(
                |example: &ParsedExample| offset_predictions(example.words.len(), offset),
                examples,
            );
            (offset, accs)
        })
        .collect();

    let counts = relation_counts(examples);
    let mut ranking = SyntacticRanking::new();

    let candidates =
        std::iter::once((ALL_RELATIONS.to_string(), 0)).chain(counts.iter().cloned());
    for (relation, count) in candidates {
        if relation == "root" || relation == "punct" {
            continue;
        }
        if count < MIN_RELATION_COUNT && relation != ALL_RELATIONS {
            break;
        }

        let mut relation_scores: Vec<(f64, HeadId)> = head_scores
            .iter()
            .map(|(_, head_id, accs)| (accs.get(&relation).copied().unwrap_or(0.0), *head_id))
            .collect();
        crate::artifacts::sort_ranked(&mut relation_scores);

        let base_acc = baselines
            .iter()
            .map(|(_, accs)| accs.get(&relation).copied().unwrap_or(0.0))
            .fold(0.0f64, f64::max);

        let top_heads: Vec<TopHead> = relation_scores
            .iter()
            .take_while(|(acc, _)| *acc >= base_acc)
            .map(|&(acc, head)| TopHead { head, acc })
            .collect();

        debug!(
            "{relation}: {count} edges, best head acc {:.3}, baseline {base_acc:.3}, {} heads qualify",
            relation_scores.first().map_or(0.0, |s| s.0),
            top_heads.len()
        );

        ranking.insert(relation, RelationHeads { base_acc, top_heads });
    }

    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    /// Build an example whose layer-0 head-0 attention encodes the gold
    /// tree exactly and whose head 1 is uniform.
    fn diagnostic_example(words: &[&str], heads: &[usize], relations: &[&str]) -> ParsedExample {
        let n = words.len() + 2;
        let mut attentions = Array4::<f32>::from_elem((1, 2, n, n), 0.01);
        for (i, &h) in heads.iter().enumerate() {
            // Word i sits at row i + 1; parent h is 1-based so its word
            // column is h (ROOT has no column, clamp to [CLS]).
            let col = h.min(n - 2);
            attentions[[0, 0, i + 1, col]] = 1.0;
        }
        ParsedExample {
            words: words.iter().map(|s| (*s).to_string()).collect(),
            attentions,
            heads: heads.to_vec(),
            relations: relations.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_head_predictions_pick_max_column() {
        // 3 words + 2 boundaries.
        let mut attn = ndarray::Array2::<f32>::zeros((5, 5));
        attn[[1, 2]] = 0.9; // word 0 -> word 1
        attn[[2, 3]] = 0.8; // word 1 -> word 2
        attn[[3, 1]] = 0.7; // word 2 -> word 0
        let preds = head_predictions(attn.view(), Direction::Normal);
        assert_eq!(preds, vec![2, 3, 1]);
    }

    #[test]
    fn test_head_predictions_ignore_self_and_boundaries() {
        let mut attn = ndarray::Array2::<f32>::zeros((4, 4));
        attn[[1, 1]] = 5.0; // self, must be ignored
        attn[[1, 0]] = 4.0; // boundary, outside the argmax window
        attn[[1, 2]] = 0.1;
        let preds = head_predictions(attn.view(), Direction::Normal);
        assert_eq!(preds[0], 2);
    }

    #[test]
    fn test_transpose_reverses_edge_direction() {
        let mut attn = ndarray::Array2::<f32>::zeros((4, 4));
        attn[[2, 1]] = 0.9; // word 1 attends to word 0
        let preds = head_predictions(attn.view(), Direction::Transpose);
        // After transposing, word 0 points at word 1.
        assert_eq!(preds[0], 2);
    }

    #[test]
    fn test_offset_predictions_clamped() {
        assert_eq!(offset_predictions(3, 0), vec![1, 2, 3]);
        assert_eq!(offset_predictions(3, -2), vec![0, 0, 1]);
        assert_eq!(offset_predictions(3, 2), vec![3, 3, 3]);
    }

    #[test]
    fn test_accuracy_formula_per_relation() {
        let example = diagnostic_example(
            &["the", "cat", "sat"],
            &[2, 3, 0],
            &["det", "nsubj", "root"],
        );
        let accs = evaluate_predictions(
            |e: &ParsedExample| {
                head_predictions(
                    e.attentions
                        .index_axis(ndarray::Axis(0), 0)
                        .index_axis(ndarray::Axis(0), 0),
                    Direction::Normal,
                )
            },
            &[example],
        );
        // Heads 2 and 3 are predictable from attention; root (head 0) is not.
        assert_eq!(accs["det"], 1.0);
        assert_eq!(accs["nsubj"], 1.0);
        assert_eq!(accs["root"], 0.0);
        assert!((accs["all"] - 2.0 / 3.0).abs() < 1e-12);
        for acc in accs.values() {
            assert!((0.0..=1.0).contains(acc));
        }
    }

    #[test]
    fn test_poss_clitic_special_case() {
        // "john 's dog": gold parent of "john" is "dog" (3), but the
        // predictor points at the clitic's own parent via position i+1.
        let example = ParsedExample {
            words: vec!["john".into(), "'s".into(), "dog".into()],
            attentions: Array4::zeros((1, 1, 5, 5)),
            heads: vec![3, 3, 0],
            relations: vec!["poss".into(), "case".into(), "root".into()],
        };
        // Word 0 predicts 2 (wrong), but word 1 predicts 3 (the gold
        // parent), which the poss rule accepts.
        let accs = evaluate_predictions(|_| vec![2, 3, 1], &[example]);
        assert_eq!(accs["poss"], 1.0);
    }

    #[test]
    fn test_relation_counts_descending() {
        let example = diagnostic_example(
            &["a", "b", "c"],
            &[2, 2, 0],
            &["det", "det", "root"],
        );
        let counts = relation_counts(&[example.clone(), example]);
        assert_eq!(counts[0], ("det".to_string(), 4));
        assert_eq!(counts[1], ("root".to_string(), 2));
    }

    #[test]
    fn test_rank_relations_always_includes_all() {
        let cfg = PipelineConfig {
            num_layers: 1,
            num_heads: 2,
            ..PipelineConfig::default()
        };
        let example = diagnostic_example(
            &["the", "cat", "sat"],
            &[2, 3, 0],
            &["det", "nsubj", "root"],
        );
        let ranking = rank_relations(&[example], &cfg);

        // Rare relations (< 100 occurrences) are dropped, "all" stays.
        assert!(ranking.contains_key("all"));
        assert!(!ranking.contains_key("det"));
        assert!(!ranking.contains_key("root"));

        let all = &ranking["all"];
        assert!((0.0..=1.0).contains(&all.base_acc));
        for top in &all.top_heads {
            assert!(top.acc >= all.base_acc);
        }
    }
}
