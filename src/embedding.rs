//! Sentence-selection data.
//!
//! Produces the two artifacts backing the dashboard's sentence picker: a
//! 2-D projection of sentence embeddings and a flat table summary with
//! prediction outcomes per selected sentence.

use anyhow::Result;
use tracing::info;

use crate::artifacts::{EmbeddingPoint, SubsetEntry, TableRow};
use crate::config::PipelineConfig;
use crate::corpus::{EvalSplit, SentenceRecord};
use crate::model::{Projector, SentenceEncoder, SubwordTokenizer};

/// Resolve subset entries back to dataset records, skipping flagged ones.
fn resolve_records<'a>(subset: &[SubsetEntry], split: &'a EvalSplit) -> Vec<&'a SentenceRecord> {
    subset
        .iter()
        .filter(|entry| entry.idx >= 0)
        .filter_map(|entry| split.find(entry.idx))
        .collect()
}

/// Project sentence embeddings of the selected subset to 2-D points.
pub fn build_embedding_list(
    subset: &[SubsetEntry],
    split: &EvalSplit,
    tokenizer: &dyn SubwordTokenizer,
    encoder: &mut dyn SentenceEncoder,
    projector: &dyn Projector,
    cfg: &PipelineConfig,
) -> Result<Vec<EmbeddingPoint>> {
    let records = resolve_records(subset, split);
    info!("Embedding {} selected sentences", records.len());

    let mut vectors = Vec::with_capacity(records.len());
    for record in &records {
        let tokens = tokenizer.encode(&record.sentence, cfg.max_seq_len);
        vectors.push(encoder.sentence_embedding(&tokens)?);
    }
    let coords = projector.project(&vectors)?;

    Ok(records
        .iter()
        .zip(coords)
        .map(|(record, coords)| EmbeddingPoint {
            id: record.idx,
            sentence: record.sentence.clone(),
            coords,
            label: record.label,
        })
        .collect())
}

/// Classify each selected sentence and summarize the outcome per row.
pub fn build_table_list(
    subset: &[SubsetEntry],
    split: &EvalSplit,
    tokenizer: &dyn SubwordTokenizer,
    encoder: &mut dyn SentenceEncoder,
    cfg: &PipelineConfig,
) -> Result<Vec<TableRow>> {
    let records = resolve_records(subset, split);
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let tokens = tokenizer.encode(&record.sentence, cfg.max_seq_len);
        let classification = encoder.classify(&tokens)?;
        let predicted_label = classification
            .softmax
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(0, |(i, _)| i);
        let logit_distance = classification
            .logits
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &v| acc.max(f64::from(v)));

        rows.push(TableRow {
            id: record.idx,
            sentence: record.sentence.clone(),
            true_label: record.label,
            predicted_label,
            logit_distance,
        });
    }

    Ok(rows)
}
