//! Tensor Reshaper.
//!
//! Attention and gradient tensors come out of the encoder padded only to
//! each batch's own maximum length, so batches have incompatible shapes.
//! This stage normalizes every batch to one dense example-major array of
//! shape `[examples, layers, heads, max_seq, max_seq]`, zero-padding the
//! bottom-right block of shorter examples.
//!
//! Applied identically and independently to attention and gradient tensors
//! so corresponding entries stay index-aligned.

use ndarray::{concatenate, s, Array5, Axis};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Pad one batch tensor of shape `[layers, batch, heads, seq_b, seq_b]`
/// into an example-major tensor `[batch, layers, heads, max_seq, max_seq]`.
///
/// Fails with `ShapeMismatch` if `seq_b` exceeds the configured maximum;
/// truncating would silently corrupt downstream indexing.
pub fn pad_batch(
    batch: &Array5<f32>,
    cfg: &PipelineConfig,
) -> Result<Array5<f32>, PipelineError> {
    let (_layers, batch_size, _heads, seq_len, _) = batch.dim();
    if seq_len > cfg.max_seq_len {
        return Err(PipelineError::ShapeMismatch {
            seq_len,
            max_seq_len: cfg.max_seq_len,
        });
    }

    let swapped = batch.view().permuted_axes([1, 0, 2, 3, 4]);
    let mut target = Array5::<f32>::zeros((
        batch_size,
        cfg.num_layers,
        cfg.num_heads,
        cfg.max_seq_len,
        cfg.max_seq_len,
    ));
    target
        .slice_mut(s![.., .., .., ..seq_len, ..seq_len])
        .assign(&swapped);
    Ok(target)
}

/// Pad every batch and concatenate along the example axis.
pub fn reshape_batches(
    batches: &[Array5<f32>],
    cfg: &PipelineConfig,
) -> Result<Array5<f32>, PipelineError> {
    let padded: Vec<Array5<f32>> = batches
        .iter()
        .map(|b| pad_batch(b, cfg))
        .collect::<Result<_, _>>()?;
    let views: Vec<_> = padded.iter().map(Array5::view).collect();
    // Only fails on inconsistent shapes, which pad_batch has ruled out.
    Ok(concatenate(Axis(0), &views).unwrap_or_else(|_| {
        Array5::zeros((0, cfg.num_layers, cfg.num_heads, cfg.max_seq_len, cfg.max_seq_len))
    }))
}
