//! Error taxonomy for the data-preparation pipeline.
//!
//! External collaborator failures (encoder, parser, projector) are not
//! represented here; they propagate as `anyhow::Error` and abort the
//! current stage.

use thiserror::Error;

/// Errors the pipeline itself can produce.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An example's sequence length exceeds the configured global maximum.
    /// Fatal: downstream indexing would silently corrupt data.
    #[error("sequence length {seq_len} exceeds configured maximum {max_seq_len}")]
    ShapeMismatch { seq_len: usize, max_seq_len: usize },

    /// A selected example could not be re-matched to a dataset record by
    /// token overlap. Non-fatal: the record is flagged and skipped.
    #[error("no dataset record matches attention id {attention_id} by token overlap")]
    JoinNotFound { attention_id: usize },

    /// Cosine similarity against a zero vector. Non-fatal: the single
    /// (example, head) entry is omitted.
    #[error("cosine similarity undefined for layer {layer} head {head}: zero-norm vector")]
    UndefinedSimilarity { layer: usize, head: usize },
}
