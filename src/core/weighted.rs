//! Weighted choice over integer weights.

use rand::Rng;

/// Pick an index with probability proportional to its weight.
///
/// Weights are normalized to probabilities, one uniform draw in `[0, 1)`
/// is taken, and each probability is subtracted in order until the draw
/// is used up. Floating error that leaves nothing selected falls back to
/// the last index with a non-zero weight. Returns `None` when there is
/// nothing to choose from (no weights, or every weight zero).
pub fn choose_weighted<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }

    let mut remaining: f64 = rng.gen();
    for (index, weight) in weights.iter().enumerate() {
        remaining -= f64::from(*weight) / total as f64;
        if remaining <= 0.0 && *weight > 0 {
            return Some(index);
        }
    }
    weights.iter().rposition(|weight| *weight > 0)
}
