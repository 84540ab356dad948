//! Evaluation-split loading and batching.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::model::{SubwordTokenizer, TokenBatch};

/// One evaluation-set sentence with its dataset-native identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceRecord {
    /// Stable dataset index; all per-example artifacts are keyed by this.
    pub idx: i64,
    pub sentence: String,
    /// True class index.
    pub label: usize,
}

/// Raw JSON structure for loading.
#[derive(Debug, Deserialize)]
struct SplitFile {
    sentences: Vec<SentenceRecord>,
    #[allow(dead_code)]
    metadata: Option<serde_json::Value>,
}

/// The held-out evaluation split.
#[derive(Debug, Clone)]
pub struct EvalSplit {
    records: Vec<SentenceRecord>,
}

impl EvalSplit {
    /// Load the split from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read eval split {path}"))?;
        let file: SplitFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse eval split {path}"))?;
        Ok(Self {
            records: file.sentences,
        })
    }

    pub fn from_records(records: Vec<SentenceRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SentenceRecord] {
        &self.records
    }

    /// Look up a record by its dataset index.
    pub fn find(&self, idx: i64) -> Option<&SentenceRecord> {
        self.records.iter().find(|r| r.idx == idx)
    }

    /// Tokenize the split into fixed-size sequential batches, each padded
    /// to its own maximum length. Deterministic: records are batched in
    /// dataset order.
    pub fn batches(&self, tokenizer: &dyn SubwordTokenizer, cfg: &PipelineConfig) -> Vec<TokenBatch> {
        self.records
            .chunks(cfg.batch_size)
            .map(|chunk| {
                let mut tokens: Vec<Vec<String>> = chunk
                    .iter()
                    .map(|r| tokenizer.encode(&r.sentence, cfg.max_seq_len))
                    .collect();
                let batch_max = tokens.iter().map(Vec::len).max().unwrap_or(0);
                for seq in &mut tokens {
                    seq.resize(batch_max, cfg.pad_token.clone());
                }
                TokenBatch {
                    tokens,
                    labels: chunk.iter().map(|r| r.label).collect(),
                }
            })
            .collect()
    }
}
