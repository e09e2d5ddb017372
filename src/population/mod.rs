//! Candidates, populations and evaluation backends.
//!
//! # Core Traits
//!
//! - [`Species`]: genome schema and variation operators (coordinator side)
//! - [`Evaluator`]: fitness computation (worker side)
//! - [`Candidate`]: bridges a candidate type and the evaluation messages
//! - [`Assessor`]: evaluates a batch of requests, locally or remotely
//!
//! # Key Types
//!
//! - [`Individual`]: genes plus lazily cached fitness
//! - [`Crow`]: location, memory and their fitness
//! - [`Population`] / [`Flock`]: ordered candidates sharing a species,
//!   backend and settings
//! - [`LocalAssessor`]: in-process backend

mod assess;
mod crow;
mod individual;
#[allow(clippy::module_inception)]
mod population;
mod types;

pub use assess::{Assessor, LocalAssessor};
pub use crow::{Crow, Movement};
pub use individual::Individual;
pub use population::{FailurePolicy, Flock, Population, PopulationSettings};
pub use types::{
    is_better, worst_fitness, Candidate, CandidateId, Evaluator, FitnessReport, RequestContext,
    Species, TrainingMetrics,
};
