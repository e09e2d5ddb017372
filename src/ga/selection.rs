//! Selection primitives shared by the drivers.
//!
//! Selection determines which candidates become parents (GA), which are
//! resampled into the next generation (Russian roulette), or which crow is
//! followed (crow search).
//!
//! # References
//!
//! - Blickle & Thiele (1996), "A Comparison of Selection Schemes used in
//!   Evolutionary Algorithms"
//! - Goldberg & Deb (1991), "A Comparative Analysis of Selection Schemes
//!   Used in Genetic Algorithms"

use rand::Rng;

/// Offset added to minimized fitness before inversion.
pub const ROULETTE_EPSILON: f64 = 1e-15;

/// Draws `k` distinct indices out of `0..n` uniformly without replacement.
///
/// `k` is capped at `n`.
///
/// # Complexity
/// O(k) expected
pub fn sample_distinct<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    rand::seq::index::sample(rng, n, k.min(n)).into_vec()
}

/// Fitness-proportionate weights.
///
/// Maximizing uses the raw fitness; minimizing uses `1 / (f + ε)`. The
/// weights are then shifted so the smallest is zero. If every shifted weight
/// is zero (all candidates equally fit) the weights become uniform ones.
///
/// Non-finite raw weights (worst-fit penalties, NaN) are treated as the
/// smallest finite weight, so they end up with zero probability.
pub fn roulette_weights(fitness: &[f64], maximize: bool) -> Vec<f64> {
    let raw: Vec<f64> = fitness
        .iter()
        .map(|&f| if maximize { f } else { 1.0 / (f + ROULETTE_EPSILON) })
        .collect();

    let floor = raw
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !floor.is_finite() {
        return vec![1.0; fitness.len()];
    }

    let shifted: Vec<f64> = raw
        .iter()
        .map(|&w| if w.is_finite() { w - floor } else { 0.0 })
        .collect();

    let total: f64 = shifted.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return vec![1.0; fitness.len()];
    }
    shifted
}

/// Draws `k` indices with replacement, each with probability proportional
/// to its weight.
///
/// # Complexity
/// O(k·n) (linear scan per draw)
pub fn weighted_draws<R: Rng>(weights: &[f64], k: usize, rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return (0..k).map(|_| rng.random_range(0..n)).collect();
    }

    (0..k)
        .map(|_| {
            let threshold = rng.random_range(0.0..total);
            let mut cumulative = 0.0;
            for (i, &w) in weights.iter().enumerate() {
                cumulative += w;
                if cumulative > threshold {
                    return i;
                }
            }
            // Floating-point rounding: land on the last positive weight.
            weights.iter().rposition(|&w| w > 0.0).unwrap_or(n - 1)
        })
        .collect()
}
