//! Fixtures shared by unit tests.

use crate::genome::{BitStringSpecies, Genes, Parameters};
use crate::population::{Evaluator, FitnessReport, Species};
use anyhow::{bail, Context};
use rand::Rng;
use serde_json::Value;

/// Bit-string species with a single stage of `bits` bits.
pub fn onemax_species(bits: usize) -> BitStringSpecies {
    BitStringSpecies::new([("bits", bits)])
}

/// Genes `{"value": v}`.
pub fn value_genes(value: f64) -> Genes {
    [("value".to_string(), Value::from(value))].into()
}

/// Fitness = number of set bits.
pub struct CountOnes;

impl Evaluator for CountOnes {
    type Data = ();

    fn evaluate(&self, genes: &Genes, _: &Parameters, _: &()) -> anyhow::Result<FitnessReport> {
        Ok(FitnessReport::new(BitStringSpecies::count_ones(genes) as f64))
    }
}

/// Fitness = the `value` gene. Fails for negative values.
pub struct ReadValue;

impl Evaluator for ReadValue {
    type Data = ();

    fn evaluate(&self, genes: &Genes, _: &Parameters, _: &()) -> anyhow::Result<FitnessReport> {
        let value = genes
            .get("value")
            .and_then(Value::as_f64)
            .context("missing value gene")?;
        if value < 0.0 {
            bail!("negative value {value}");
        }
        Ok(FitnessReport::new(value))
    }
}

/// Like [`ReadValue`], but scores a value of exactly zero as NaN.
pub struct NanAtZero;

impl Evaluator for NanAtZero {
    type Data = ();

    fn evaluate(&self, genes: &Genes, params: &Parameters, data: &()) -> anyhow::Result<FitnessReport> {
        let report = ReadValue.evaluate(genes, params, data)?;
        if report.fitness == 0.0 {
            return Ok(FitnessReport::new(f64::NAN));
        }
        Ok(report)
    }
}

/// One real coordinate `value ∈ [0, 1)`; pursuit interpolates linearly.
pub struct LineSpecies;

impl Species for LineSpecies {
    fn create_genes<R: Rng>(&self, rng: &mut R) -> Genes {
        value_genes(rng.random_range(0.0..1.0))
    }

    fn mutate<R: Rng>(&self, genes: &mut Genes, rng: &mut R) {
        *genes = self.create_genes(rng);
    }

    fn pursue<R: Rng>(&self, location: &Genes, target: &Genes, step: f64, _rng: &mut R) -> Genes {
        let x = location.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        let t = target.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        value_genes(x + step * (t - x))
    }
}
