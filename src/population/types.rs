//! Core trait definitions shared by populations, flocks and the RPC layer.
//!
//! [`Species`] is the coordinator-side contract (how genomes are created and
//! varied). [`Evaluator`] is the worker-side contract (how a genome is
//! scored). [`Candidate`] ties a candidate representation to the request and
//! reply messages exchanged with the evaluation backend.

use crate::genome::{Genes, Parameters};
use crate::rpc::message::{EvaluationReply, EvaluationRequest, Mode};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of a candidate, unique within a generation.
pub type CandidateId = usize;

/// Genome schema plus the variation operators that act on it.
///
/// All operators are pure on genes; the candidate types take care of
/// invalidating cached fitness whenever they apply one.
///
/// # Implementing
///
/// ```ignore
/// struct Sphere { dim: usize }
///
/// impl Species for Sphere {
///     fn create_genes<R: Rng>(&self, rng: &mut R) -> Genes {
///         (0..self.dim).map(|i| (format!("x{i}"), rng.random_range(-5.0..5.0).into())).collect()
///     }
/// }
/// ```
pub trait Species: Send + Sync {
    /// Creates a random genome.
    fn create_genes<R: Rng>(&self, rng: &mut R) -> Genes;

    /// Recombines two genomes in place (both are replaced).
    ///
    /// The default implementation leaves both untouched.
    fn crossover<R: Rng>(&self, _first: &mut Genes, _second: &mut Genes, _rng: &mut R) {}

    /// Produces one child from two parents.
    ///
    /// The default crosses copies of both parents and keeps the first.
    fn reproduce<R: Rng>(&self, first: &Genes, second: &Genes, rng: &mut R) -> Genes {
        let mut child = first.clone();
        let mut other = second.clone();
        self.crossover(&mut child, &mut other, rng);
        child
    }

    /// Perturbs a genome in place.
    ///
    /// The default implementation is a no-op.
    fn mutate<R: Rng>(&self, _genes: &mut Genes, _rng: &mut R) {}

    /// Random location used by crows that notice they are being followed.
    fn random_location<R: Rng>(&self, rng: &mut R) -> Genes {
        self.create_genes(rng)
    }

    /// Moves `location` toward `target` by `step` (flight length times a
    /// uniform draw).
    ///
    /// The default jumps straight to the target.
    fn pursue<R: Rng>(&self, _location: &Genes, target: &Genes, _step: f64, _rng: &mut R) -> Genes {
        target.clone()
    }
}

/// Auxiliary regression metrics reported by swarm evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Final training loss.
    pub loss: Option<f64>,
    /// Mean absolute error.
    pub mae: Option<f64>,
    /// Mean squared error.
    pub mse: Option<f64>,
    /// Mean squared logarithmic error.
    pub msle: Option<f64>,
}

/// What an evaluator returns for one genome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessReport {
    /// Scalar fitness; direction fixed by the population.
    pub fitness: f64,
    /// Optional auxiliary metrics.
    pub metrics: TrainingMetrics,
}

impl FitnessReport {
    /// Report carrying only a fitness value.
    pub fn new(fitness: f64) -> Self {
        Self {
            fitness,
            metrics: TrainingMetrics::default(),
        }
    }

    /// Attaches auxiliary metrics.
    pub fn with_metrics(mut self, metrics: TrainingMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Computes the fitness of one genome.
///
/// This is the expensive part (training a model, cross validation) and runs
/// either in-process through [`LocalAssessor`](super::LocalAssessor) or on a
/// remote [`WorkerClient`](crate::rpc::WorkerClient).
pub trait Evaluator: Send + Sync + 'static {
    /// Training data handed to every evaluation.
    type Data: Send + Sync + 'static;

    /// Scores `genes` with the given extra parameters.
    fn evaluate(
        &self,
        genes: &Genes,
        parameters: &Parameters,
        data: &Self::Data,
    ) -> anyhow::Result<FitnessReport>;
}

/// A member of a population or flock.
///
/// Bridges the candidate representation and the evaluation protocol.
pub trait Candidate: Clone + Send + Sync {
    /// Protocol mode used when this candidate is evaluated.
    const MODE: Mode;

    /// Candidate id.
    fn id(&self) -> CandidateId;

    /// Reassigns the id (used when a candidate joins a new population).
    fn set_id(&mut self, id: CandidateId);

    /// Ranking key; `None` until evaluated.
    fn score(&self) -> Option<f64>;

    /// Whether the cached fitness is missing.
    fn needs_evaluation(&self) -> bool;

    /// Builds the evaluation request for this candidate.
    fn to_request(&self, generation: u64, context: &RequestContext<'_>) -> EvaluationRequest;

    /// Writes a successful reply into the candidate.
    ///
    /// Returns an error if the reply does not match the candidate's mode.
    fn absorb(&mut self, reply: EvaluationReply) -> Result<(), String>;

    /// Marks the candidate as permanently worst-fit.
    fn penalize(&mut self, worst: f64);
}

/// Population-wide fields copied into every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Extra evaluator parameters.
    pub parameters: &'a Parameters,
    /// Experiment id forwarded to workers.
    pub experiment_id: Option<&'a str>,
    /// Fitness direction.
    pub maximize: bool,
}

/// Returns `true` if `candidate` is strictly better than `incumbent`.
///
/// NaN is never better than anything.
pub fn is_better(candidate: f64, incumbent: f64, maximize: bool) -> bool {
    if maximize {
        candidate > incumbent
    } else {
        candidate < incumbent
    }
}

/// The worst possible fitness for a direction.
pub fn worst_fitness(maximize: bool) -> f64 {
    if maximize {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_better_respects_direction() {
        assert!(is_better(0.9, 0.5, true));
        assert!(!is_better(0.9, 0.5, false));
        assert!(is_better(0.1, 0.5, false));
        assert!(!is_better(0.5, 0.5, true));
    }

    #[test]
    fn test_nan_is_never_better() {
        assert!(!is_better(f64::NAN, 0.0, true));
        assert!(!is_better(f64::NAN, 0.0, false));
    }

    #[test]
    fn test_worst_fitness_loses_to_everything() {
        assert!(is_better(-1e300, worst_fitness(true), true));
        assert!(is_better(1e300, worst_fitness(false), false));
    }

    #[test]
    fn test_fitness_report_builder() {
        let report = FitnessReport::new(0.5).with_metrics(TrainingMetrics {
            loss: Some(0.1),
            ..TrainingMetrics::default()
        });
        assert_eq!(report.fitness, 0.5);
        assert_eq!(report.metrics.loss, Some(0.1));
        assert_eq!(report.metrics.mae, None);
    }
}
