//! Semantic head scorer.
//!
//! Measures how well each head's attention mass lines up with the
//! gradient-saliency map of the predicted class: the head's attention
//! matrix is summed along the query axis (one weight per key token,
//! restricted to the saliency span) and compared to the saliency vector
//! by cosine similarity.

use ndarray::{s, ArrayView4};
use tracing::warn;

use crate::artifacts::{sort_ranked, RankedHeads};
use crate::error::PipelineError;

/// Cosine similarity between two equal-length vectors, or `None` when
/// either vector has zero norm.
fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// Rank all heads of one example descending by cosine similarity between
/// the saliency vector and the head's column-summed attention.
///
/// Degenerate zero-vector entries are omitted from the ranking rather
/// than failing the run; each omission is logged.
pub fn rank_by_saliency(attn: ArrayView4<'_, f32>, saliency: &[f64]) -> RankedHeads {
    let (layers, heads, _, _) = attn.dim();
    let n = saliency.len();
    let mut ranked: RankedHeads = Vec::with_capacity(layers * heads);

    for layer in 0..layers {
        for head in 0..heads {
            let summed: Vec<f64> = attn
                .slice(s![layer, head, ..n, ..n])
                .sum_axis(ndarray::Axis(0))
                .iter()
                .map(|&v| f64::from(v))
                .collect();

            match cosine(saliency, &summed) {
                Some(score) => ranked.push((score, (layer, head))),
                None => {
                    let err = PipelineError::UndefinedSimilarity { layer, head };
                    warn!("Skipping head ({layer}, {head}): {err}");
                }
            }
        }
    }

    sort_ranked(&mut ranked);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine(&v, &v).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_cosine_zero_vector_undefined() {
        assert!(cosine(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_rank_by_saliency_prefers_aligned_head() {
        let saliency = vec![1.0, 0.0, 0.0];
        let mut attn = Array4::<f32>::zeros((1, 2, 4, 4));
        // Head 0 concentrates mass on the salient key token.
        attn[[0, 0, 0, 0]] = 1.0;
        attn[[0, 0, 1, 0]] = 1.0;
        // Head 1 spreads mass away from it.
        attn[[0, 1, 0, 1]] = 1.0;
        attn[[0, 1, 1, 2]] = 1.0;

        let ranked = rank_by_saliency(attn.view(), &saliency);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].1, (0, 0));
        assert!((ranked[0].0 - 1.0).abs() < 1e-9);
        assert!(ranked[1].0.abs() < 1e-9);
    }

    #[test]
    fn test_zero_attention_head_omitted() {
        let saliency = vec![1.0, 1.0];
        let mut attn = Array4::<f32>::zeros((1, 2, 3, 3));
        attn[[0, 1, 0, 0]] = 0.5;
        // Head (0, 0) has an all-zero attention block over the span.

        let ranked = rank_by_saliency(attn.view(), &saliency);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].1, (0, 1));
    }
}
