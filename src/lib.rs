//! Distributed genetic algorithms and crow search.
//!
//! Candidates are evolved on a coordinator while their fitness, typically
//! the validation score of a model trained from the candidate's genes, is
//! computed elsewhere:
//!
//! - **Genetic Algorithm**: tournament selection with optional elitism
//!   ([`ga::GeneticAlgorithm`]).
//! - **Russian Roulette GA**: fitness-proportional resampling followed by
//!   pairwise crossover or mutation ([`ga::RussianRouletteGA`]).
//! - **Crow Search Algorithm**: each crow follows the memory of a
//!   tournament-selected peer, or moves at random when that peer is aware
//!   of it ([`csa::CrowSearchAlgorithm`]).
//!
//! # Architecture
//!
//! Drivers only ask their [`Population`] to evaluate pending candidates; the
//! population hands every pending candidate in one batch to an
//! [`Assessor`]. [`LocalAssessor`] evaluates in-process (in parallel with
//! the `parallel` feature); [`rpc::DistributedAssessor`] publishes the batch
//! to a broker and waits for [`rpc::WorkerClient`]s to reply.
//!
//! What a candidate *is* comes from a [`Species`] (gene layout and the
//! genetic operators); what it is *worth* comes from an [`Evaluator`].

pub mod csa;
pub mod error;
pub mod ga;
pub mod genome;
pub mod population;
pub mod random;
pub mod rpc;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::{EvaluationError, GentunError};
pub use genome::{BitStringSpecies, Genes, ParamValue, Parameters};
pub use population::{
    Assessor, Candidate, Crow, Evaluator, FailurePolicy, FitnessReport, Flock, Individual, LocalAssessor,
    Population, PopulationSettings, Species,
};
