//! Gradient head scorer.
//!
//! Ranks every (layer, head) pair of one example by the sum of absolute
//! attention-gradient values, flattened over both sequence axes. Heads
//! that the loss gradient flows through strongly rank first.

use ndarray::{s, ArrayView4};

use crate::artifacts::{round4, sort_ranked, RankedHeads};

/// Rank all heads of one example descending by summed |gradient|.
///
/// Scores are rounded to 4 decimal digits; ties keep layer-major,
/// head-minor order.
pub fn rank_by_gradient(grads: ArrayView4<'_, f32>) -> RankedHeads {
    let (layers, heads, _, _) = grads.dim();
    let mut ranked: RankedHeads = Vec::with_capacity(layers * heads);

    for layer in 0..layers {
        for head in 0..heads {
            let sum: f64 = grads
                .slice(s![layer, head, .., ..])
                .iter()
                .map(|&g| f64::from(g.abs()))
                .sum();
            ranked.push((round4(sum), (layer, head)));
        }
    }

    sort_ranked(&mut ranked);
    ranked
}
