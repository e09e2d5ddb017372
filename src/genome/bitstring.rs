//! Stage-wise binary genome.
//!
//! Each gene is a named stage holding a `"0101"` string. In Genetic CNN a
//! stage with `K` nodes is encoded with `K(K−1)/2` bits, one per possible
//! connection between its nodes.

use super::operators::{binary_pursuit, bit_flip_mutation, format_bits, parse_bits, random_bits};
use super::Genes;
use crate::population::Species;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rates read from untrusted configuration; NaN counts as 0.
fn probability(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// A fixed list of named bit-string stages.
///
/// Crossover swaps whole stages between the parents; mutation flips bits
/// independently; pursuit moves bit-wise toward the target memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitStringSpecies {
    stages: Vec<(String, usize)>,
    crossover_rate: f64,
    mutation_rate: f64,
}

impl BitStringSpecies {
    /// Creates a species from `(name, bit length)` stages.
    ///
    /// Defaults: stage swap probability 0.3, bit flip probability 0.1.
    pub fn new<I, N>(stages: I) -> Self
    where
        I: IntoIterator<Item = (N, usize)>,
        N: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(|(n, l)| (n.into(), l)).collect(),
            crossover_rate: 0.3,
            mutation_rate: 0.1,
        }
    }

    /// Genetic CNN encoding: stage `S_i` has `K_i(K_i−1)/2` connection bits
    /// for `K_i = nodes[i-1]`.
    pub fn genetic_cnn(nodes: &[usize]) -> Self {
        Self::new(
            nodes
                .iter()
                .enumerate()
                .map(|(i, &k)| (format!("S_{}", i + 1), k * k.saturating_sub(1) / 2)),
        )
    }

    /// Sets the per-stage swap probability (clamped to `[0, 1]`).
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = probability(rate);
        self
    }

    /// Sets the per-bit flip probability (clamped to `[0, 1]`).
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = probability(rate);
        self
    }

    /// Stage names and lengths.
    pub fn stages(&self) -> &[(String, usize)] {
        &self.stages
    }

    /// Total number of bits across stages.
    pub fn total_bits(&self) -> usize {
        self.stages.iter().map(|(_, l)| l).sum()
    }

    /// Validates the species.
    pub fn validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("at least one stage is required".into());
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(format!("crossover_rate must be in [0, 1], got {}", self.crossover_rate));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(format!("mutation_rate must be in [0, 1], got {}", self.mutation_rate));
        }
        for (i, (name, _)) in self.stages.iter().enumerate() {
            if self.stages[..i].iter().any(|(other, _)| other == name) {
                return Err(format!("duplicate stage name '{name}'"));
            }
        }
        Ok(())
    }

    /// Bits of one stage.
    ///
    /// A missing or malformed stage reads as all zeros of the expected
    /// length so that variation never panics on foreign genes.
    pub fn stage_bits(genes: &Genes, name: &str, length: usize) -> Vec<bool> {
        genes
            .get(name)
            .and_then(Value::as_str)
            .and_then(parse_bits)
            .filter(|bits| bits.len() == length)
            .unwrap_or_else(|| vec![false; length])
    }

    /// Number of set bits across all stages.
    pub fn count_ones(genes: &Genes) -> usize {
        genes
            .values()
            .filter_map(Value::as_str)
            .map(|s| s.chars().filter(|&c| c == '1').count())
            .sum()
    }

    fn write(genes: &mut Genes, name: &str, bits: &[bool]) {
        genes.insert(name.to_string(), Value::String(format_bits(bits)));
    }
}

impl Species for BitStringSpecies {
    fn create_genes<R: Rng>(&self, rng: &mut R) -> Genes {
        self.stages
            .iter()
            .map(|(name, length)| (name.clone(), Value::String(format_bits(&random_bits(*length, rng)))))
            .collect()
    }

    fn crossover<R: Rng>(&self, first: &mut Genes, second: &mut Genes, rng: &mut R) {
        for (name, _) in &self.stages {
            if rng.random_bool(probability(self.crossover_rate)) {
                let a = first.remove(name);
                let b = second.remove(name);
                if let Some(b) = b {
                    first.insert(name.clone(), b);
                }
                if let Some(a) = a {
                    second.insert(name.clone(), a);
                }
            }
        }
    }

    fn mutate<R: Rng>(&self, genes: &mut Genes, rng: &mut R) {
        for (name, length) in &self.stages {
            let mut bits = Self::stage_bits(genes, name, *length);
            if bit_flip_mutation(&mut bits, probability(self.mutation_rate), rng) > 0 {
                Self::write(genes, name, &bits);
            }
        }
    }

    fn pursue<R: Rng>(&self, location: &Genes, target: &Genes, step: f64, rng: &mut R) -> Genes {
        let mut moved = Genes::new();
        for (name, length) in &self.stages {
            let current = Self::stage_bits(location, name, *length);
            let goal = Self::stage_bits(target, name, *length);
            Self::write(&mut moved, name, &binary_pursuit(&current, &goal, step, rng));
        }
        moved
    }
}
