//! Attention-confidence statistics.
//!
//! A head's confidence for one example is the maximum attention weight
//! anywhere in its map; confident heads place sharp probability mass
//! instead of diffuse patterns. Ranked per example for the selected
//! subset, and as a corpus mean over all examples.

use ndarray::{s, Array5, ArrayView4};

use crate::artifacts::{sort_ranked, RankedHeads};
use crate::config::PipelineConfig;

fn max_weight(attn: ArrayView4<'_, f32>, layer: usize, head: usize) -> f64 {
    attn.slice(s![layer, head, .., ..])
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(f64::from(v)))
}

/// Rank one example's heads descending by maximum attention weight.
pub fn example_confidence(attn: ArrayView4<'_, f32>) -> RankedHeads {
    let (layers, heads, _, _) = attn.dim();
    let mut ranked: RankedHeads = Vec::with_capacity(layers * heads);
    for layer in 0..layers {
        for head in 0..heads {
            ranked.push((max_weight(attn, layer, head), (layer, head)));
        }
    }
    sort_ranked(&mut ranked);
    ranked
}

/// Rank heads descending by per-example maximum attention weight averaged
/// over every example in the corpus.
pub fn mean_confidence(all_attentions: &Array5<f32>, cfg: &PipelineConfig) -> RankedHeads {
    let n_examples = all_attentions.dim().0;
    let mut ranked: RankedHeads = Vec::with_capacity(cfg.num_head_ids());

    for layer in 0..cfg.num_layers {
        for head in 0..cfg.num_heads {
            let mean = if n_examples == 0 {
                0.0
            } else {
                (0..n_examples)
                    .map(|i| {
                        max_weight(
                            all_attentions.index_axis(ndarray::Axis(0), i),
                            layer,
                            head,
                        )
                    })
                    .sum::<f64>()
                    / n_examples as f64
            };
            ranked.push((mean, (layer, head)));
        }
    }

    sort_ranked(&mut ranked);
    ranked
}
