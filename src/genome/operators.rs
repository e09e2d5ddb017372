//! Bit-string genetic operators.
//!
//! Operators for binary-encoded chromosomes. They work on `&[bool]` and know
//! nothing about stages or evaluators, so any binary encoding can use them.
//!
//! # Mutation Operators
//!
//! - [`bit_flip_mutation`]: independent per-bit flips — O(n)
//!
//! # Swarm Operators
//!
//! - [`binary_pursuit`]: crow-search movement toward a target memory using a
//!   sigmoid transfer function — O(n)
//!
//! # References
//!
//! - Xie & Yuille (2017), "Genetic CNN"
//! - Askarzadeh (2016), "A novel metaheuristic method for solving constrained
//!   engineering optimization problems: Crow search algorithm"
//! - Laabadi et al. (2020), "A Binary Crow Search Algorithm for Solving
//!   Two-dimensional Bin Packing Problem"

use rand::Rng;

/// Steepness of the sigmoid transfer used by [`binary_pursuit`].
const TRANSFER_SLOPE: f64 = 10.0;

/// Draws `n` uniformly random bits.
pub fn random_bits<R: Rng>(n: usize, rng: &mut R) -> Vec<bool> {
    (0..n).map(|_| rng.random_bool(0.5)).collect()
}

/// Flips every bit independently with probability `rate`.
///
/// Returns the number of flipped bits.
///
/// # Complexity
/// O(n)
pub fn bit_flip_mutation<R: Rng>(bits: &mut [bool], rate: f64, rng: &mut R) -> usize {
    let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
    let mut flips = 0;
    for bit in bits.iter_mut() {
        if rng.random_bool(rate) {
            *bit = !*bit;
            flips += 1;
        }
    }
    flips
}

/// Moves a binary position toward `target`.
///
/// Each bit is treated as a real coordinate `x ∈ {0, 1}` and displaced by
/// `step · (t − x)`. The displaced coordinate goes through the sigmoid
/// `1 / (1 + e^(−k(x' − ½)))` and the new bit is set with that probability.
/// A `step` of 0 keeps the position (up to transfer noise); a step of 1 or
/// more lands on the target with high probability.
///
/// # Panics
/// Panics if the two positions have different lengths.
pub fn binary_pursuit<R: Rng>(current: &[bool], target: &[bool], step: f64, rng: &mut R) -> Vec<bool> {
    assert_eq!(
        current.len(),
        target.len(),
        "positions must have equal length"
    );

    current
        .iter()
        .zip(target)
        .map(|(&x, &t)| {
            let x = if x { 1.0 } else { 0.0 };
            let t = if t { 1.0 } else { 0.0 };
            let moved = x + step * (t - x);
            let p = 1.0 / (1.0 + (-TRANSFER_SLOPE * (moved - 0.5)).exp());
            rng.random_range(0.0..1.0) < p
        })
        .collect()
}

/// Parses a `"0101"` string into bits. Returns `None` on any other character.
pub fn parse_bits(text: &str) -> Option<Vec<bool>> {
    text.chars()
        .map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect()
}

/// Formats bits as a `"0101"` string.
pub fn format_bits(bits: &[bool]) -> String {
    bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
}
