//! Artifact schemas and JSON I/O.
//!
//! Every stage boundary is a self-contained JSON document so any stage can
//! be re-run independently given only its declared inputs. All per-example
//! artifacts are keyed by the dataset's native example identifier; the
//! dashboard joins across artifacts by `id` equality, never by position.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::ArrayView4;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A (layer, head) pair. Serializes as `[layer, head]`.
pub type HeadId = (usize, usize);

/// An ordered ranking: `[score, [layer, head]]` entries, descending.
pub type RankedHeads = Vec<(f64, HeadId)>;

/// Round to 4 decimal digits, matching the artifact precision.
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Sort a ranking descending by score. The sort is stable, so tied scores
/// keep their original layer-major, head-minor iteration order.
pub fn sort_ranked(ranked: &mut RankedHeads) {
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
}

/// One entry of the selected-subset index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetEntry {
    /// Position of the example in the reshaped attention array.
    pub attention_id: usize,
    /// Padded surface tokens of the example.
    pub tokens: Vec<String>,
    /// Matched dataset identifier, or -1 if the join failed.
    pub idx: i64,
}

/// Per-token saliency scores, one field per class label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyToken {
    pub token: String,
    #[serde(flatten)]
    pub scores: BTreeMap<String, f64>,
}

/// Example-level metadata attached to a saliency entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyMeta {
    pub true_label: String,
    pub predicted_label: String,
    pub softmax_scores: BTreeMap<String, f64>,
}

/// Saliency-list entry for one example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyEntry {
    pub tokens: Vec<SaliencyToken>,
    pub meta: SaliencyMeta,
}

/// One dependency edge in an example's parse tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNode {
    pub child: usize,
    /// 0-based parent index; `None` marks the root word.
    pub parent: Option<usize>,
    pub relation: String,
}

/// Dependency tree for one example, word-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyTree {
    pub list: Vec<DependencyNode>,
    pub words: Vec<String>,
}

/// One head that beats the baseline for a relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopHead {
    pub head: HeadId,
    pub acc: f64,
}

/// Syntactic ranking entry for one relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationHeads {
    /// Best fixed-offset baseline accuracy for the relation.
    pub base_acc: f64,
    /// Heads with accuracy >= base_acc, descending.
    pub top_heads: Vec<TopHead>,
}

/// One point of the 2-D sentence projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingPoint {
    pub id: i64,
    pub sentence: String,
    pub coords: [f64; 2],
    pub label: usize,
}

/// One row of the sentence table summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    pub id: i64,
    pub sentence: String,
    pub true_label: usize,
    pub predicted_label: usize,
    pub logit_distance: f64,
}

/// One aggregated record per (layer, head) in the atlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasEntry {
    pub layer: usize,
    pub head: usize,
    pub semantic: f64,
    pub syntactic: f64,
    pub gradient: f64,
    pub confidence: f64,
}

/// Mapping from example id to a head ranking.
pub type RankingById = BTreeMap<i64, RankedHeads>;

/// Mapping from relation label to its top heads.
pub type SyntacticRanking = BTreeMap<String, RelationHeads>;

/// Artifact file locations for one dataset under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    output_dir: PathBuf,
    dataset: String,
}

impl ArtifactPaths {
    pub fn new(output_dir: impl Into<PathBuf>, dataset: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            dataset: dataset.to_string(),
        }
    }

    fn named(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}-{name}", self.dataset))
    }

    pub fn subset_index(&self, subset_size: usize) -> PathBuf {
        self.named(&format!("longest-{subset_size}-id.json"))
    }

    pub fn gradient_ranking(&self) -> PathBuf {
        self.named("sorted-grad-heads.json")
    }

    /// Directory of per-example attention maps.
    pub fn attention_dir(&self) -> PathBuf {
        self.named("attention-data")
    }

    pub fn attention_map(&self, idx: i64) -> PathBuf {
        self.attention_dir().join(format!("attention-{idx:04}.json"))
    }

    pub fn saliency_list(&self) -> PathBuf {
        self.named("saliency-list-grad-l1.json")
    }

    pub fn semantic_ranking(&self) -> PathBuf {
        self.named("sorted-saliency-heads.json")
    }

    pub fn dependencies(&self) -> PathBuf {
        self.named("dependencies.json")
    }

    pub fn syntactic_ranking(&self) -> PathBuf {
        self.named("sorted-syntactic-heads.json")
    }

    pub fn mean_confidence(&self) -> PathBuf {
        self.named("mean-confidence-heads.json")
    }

    pub fn confidence_ranking(&self) -> PathBuf {
        self.named("sorted-confidence-heads.json")
    }

    pub fn embedding_list(&self) -> PathBuf {
        self.output_dir
            .join(format!("embedding-list-{}.json", self.dataset))
    }

    pub fn table_list(&self) -> PathBuf {
        self.output_dir
            .join(format!("table-list-{}.json", self.dataset))
    }

    pub fn atlas(&self) -> PathBuf {
        self.named("atlas.json")
    }
}

/// Serialize a value to a JSON file, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string(value).context("Failed to serialize artifact")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Deserialize a JSON artifact file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Export one example's attention tensor as a nested `[layer][head][q][k]`
/// array rounded to 4 decimal digits.
pub fn attention_to_nested(attn: ArrayView4<'_, f32>) -> Vec<Vec<Vec<Vec<f64>>>> {
    let (layers, heads, seq_q, seq_k) = attn.dim();
    (0..layers)
        .map(|l| {
            (0..heads)
                .map(|h| {
                    (0..seq_q)
                        .map(|q| {
                            (0..seq_k)
                                .map(|k| round4(f64::from(attn[[l, h, q, k]])))
                                .collect()
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(-0.000_04), -0.0);
    }

    #[test]
    fn test_sort_ranked_stable_on_ties() {
        let mut ranked: RankedHeads =
            vec![(0.5, (0, 0)), (0.3, (0, 1)), (0.3, (1, 0)), (0.1, (1, 1))];
        sort_ranked(&mut ranked);
        assert_eq!(
            ranked,
            vec![(0.5, (0, 0)), (0.3, (0, 1)), (0.3, (1, 0)), (0.1, (1, 1))]
        );
    }

    #[test]
    fn test_ranking_serializes_as_score_head_pairs() {
        let ranked: RankedHeads = vec![(0.25, (3, 7))];
        let json = serde_json::to_string(&ranked).unwrap();
        assert_eq!(json, "[[0.25,[3,7]]]");
    }

    #[test]
    fn test_ranking_by_id_round_trip() {
        let mut ranking = RankingById::new();
        ranking.insert(42, vec![(1.0, (0, 0)), (0.5, (0, 1))]);
        let json = serde_json::to_string(&ranking).unwrap();
        let back: RankingById = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ranking);
    }

    #[test]
    fn test_saliency_token_flattens_class_scores() {
        let token = SaliencyToken {
            token: "good".to_string(),
            scores: BTreeMap::from([
                ("negative".to_string(), -0.2),
                ("positive".to_string(), 0.9),
            ]),
        };
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"token":"good","negative":-0.2,"positive":0.9}"#);
    }

    #[test]
    fn test_attention_nested_rounding() {
        let attn = Array4::from_elem((1, 2, 2, 2), 0.123_456f32);
        let nested = attention_to_nested(attn.view());
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].len(), 2);
        assert_eq!(nested[0][0][0][0], 0.1235);
    }

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::new("/out", "sst2");
        assert_eq!(
            paths.gradient_ranking(),
            PathBuf::from("/out/sst2-sorted-grad-heads.json")
        );
        assert_eq!(
            paths.attention_map(7),
            PathBuf::from("/out/sst2-attention-data/attention-0007.json")
        );
        assert_eq!(
            paths.embedding_list(),
            PathBuf::from("/out/embedding-list-sst2.json")
        );
    }
}
