//! Evaluation request and reply messages.

use crate::error::EvaluationError;
use crate::genome::{Genes, Parameters};
use crate::population::{CandidateId, RequestContext, TrainingMetrics};
use serde::{Deserialize, Serialize};

/// Which algorithm produced a request; decides the reply shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Genetic algorithms: reply carries `(id, fitness)`.
    #[default]
    #[serde(rename = "ga")]
    Genetic,
    /// Crow search: reply carries the crow's full updated state.
    #[serde(rename = "csa")]
    Swarm,
}

fn default_maximize() -> bool {
    true
}

/// One candidate to evaluate.
///
/// The swarm fields are `None` for genetic requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Algorithm mode.
    #[serde(default)]
    pub mode: Mode,
    /// Candidate id within the generation.
    pub id: CandidateId,
    /// Generation (or iteration) the request belongs to.
    #[serde(default)]
    pub generation: u64,
    /// Genes, or the crow's current location.
    pub genes: Genes,
    /// Fitness at the current location.
    #[serde(default)]
    pub fitness: Option<f64>,
    /// Location before the last move.
    #[serde(default)]
    pub last_location: Option<Genes>,
    /// Fitness at `memory`.
    #[serde(default)]
    pub best_fitness: Option<f64>,
    /// Best location visited.
    #[serde(default)]
    pub memory: Option<Genes>,
    /// Destination to evaluate; the current location when `None`.
    #[serde(default)]
    pub new_location: Option<Genes>,
    /// Extra evaluator parameters.
    #[serde(default)]
    pub additional_parameters: Parameters,
    /// Experiment id.
    #[serde(default)]
    pub experiment_id: Option<String>,
    /// Fitness direction, used by the worker to update crow memory.
    #[serde(default = "default_maximize")]
    pub maximize: bool,
}

impl EvaluationRequest {
    /// Genetic-mode request.
    pub fn genetic(id: CandidateId, genes: Genes) -> Self {
        Self::with_mode(Mode::Genetic, id, genes)
    }

    /// Swarm-mode request for a crow at `location`.
    pub fn swarm(id: CandidateId, location: Genes) -> Self {
        Self::with_mode(Mode::Swarm, id, location)
    }

    fn with_mode(mode: Mode, id: CandidateId, genes: Genes) -> Self {
        Self {
            mode,
            id,
            generation: 0,
            genes,
            fitness: None,
            last_location: None,
            best_fitness: None,
            memory: None,
            new_location: None,
            additional_parameters: Parameters::new(),
            experiment_id: None,
            maximize: true,
        }
    }

    /// Sets the generation.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the crow state fields.
    pub fn with_swarm_state(
        mut self,
        fitness: Option<f64>,
        last_location: Option<Genes>,
        best_fitness: Option<f64>,
        memory: Option<Genes>,
        new_location: Option<Genes>,
    ) -> Self {
        self.fitness = fitness;
        self.last_location = last_location;
        self.best_fitness = best_fitness;
        self.memory = memory;
        self.new_location = new_location;
        self
    }

    /// Copies the population-wide fields.
    pub fn with_context(mut self, context: &RequestContext<'_>) -> Self {
        self.additional_parameters = context.parameters.clone();
        self.experiment_id = context.experiment_id.map(str::to_string);
        self.maximize = context.maximize;
        self
    }
}

/// Updated crow state returned by a swarm evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmReply {
    /// Crow id.
    pub id: CandidateId,
    /// Location the crow moved from.
    pub last_location: Genes,
    /// Fitness at the new location.
    pub fitness: f64,
    /// Best location visited, possibly the new one.
    pub memory: Genes,
    /// Fitness at `memory`.
    pub best_fitness: f64,
    /// New location.
    pub location: Genes,
    /// Seconds spent evaluating.
    pub training_time: f64,
    /// Final training loss.
    #[serde(default)]
    pub loss: Option<f64>,
    /// Mean absolute error.
    #[serde(default)]
    pub mae: Option<f64>,
    /// Mean squared error.
    #[serde(default)]
    pub mse: Option<f64>,
    /// Mean squared logarithmic error.
    #[serde(default)]
    pub msle: Option<f64>,
}

impl SwarmReply {
    /// Auxiliary metrics bundled together.
    pub fn metrics(&self) -> TrainingMetrics {
        TrainingMetrics {
            loss: self.loss,
            mae: self.mae,
            mse: self.mse,
            msle: self.msle,
        }
    }
}

/// A worker's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationReply {
    /// Genetic result.
    #[serde(rename = "ga")]
    Genetic {
        /// Candidate id.
        id: CandidateId,
        /// Fitness.
        fitness: f64,
    },
    /// Swarm result.
    #[serde(rename = "csa")]
    Swarm(SwarmReply),
    /// The evaluator (or the request decoding) failed.
    Failed {
        /// Candidate id, when the request could be decoded.
        id: Option<CandidateId>,
        /// Error chain.
        reason: String,
    },
}

impl EvaluationReply {
    /// Candidate id the reply refers to.
    pub fn id(&self) -> Option<CandidateId> {
        match self {
            EvaluationReply::Genetic { id, .. } => Some(*id),
            EvaluationReply::Swarm(state) => Some(state.id),
            EvaluationReply::Failed { id, .. } => *id,
        }
    }

    /// Short name of the variant for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationReply::Genetic { .. } => "ga",
            EvaluationReply::Swarm(_) => "csa",
            EvaluationReply::Failed { .. } => "failed",
        }
    }

    /// Turns a failure reply into an [`EvaluationError`] attributed to
    /// `request`.
    pub fn into_outcome(self, request: &EvaluationRequest) -> Result<Self, EvaluationError> {
        match self {
            EvaluationReply::Failed { reason, .. } => Err(EvaluationError::Failed {
                id: request.id,
                generation: request.generation,
                reason,
            }),
            reply => Ok(reply),
        }
    }
}
