//! Crow-search candidate.

use super::types::{Candidate, CandidateId, RequestContext, Species, TrainingMetrics};
use crate::genome::Genes;
use crate::rpc::message::{EvaluationReply, EvaluationRequest, Mode};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a crow moved when following a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Moved toward the target's memory.
    Pursuit,
    /// The target noticed and the crow flew to a random location.
    Evasion,
}

/// A crow: current location, best location remembered, and the fitness of
/// both.
///
/// `follow` only picks a destination; the move is completed when the
/// destination has been evaluated and the reply absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crow {
    id: CandidateId,
    location: Genes,
    memory: Genes,
    best_fitness: Option<f64>,
    fitness: Option<f64>,
    last_location: Option<Genes>,
    destination: Option<Genes>,
    training_time: Option<f64>,
    metrics: TrainingMetrics,
}

impl Crow {
    /// Creates an unevaluated crow whose memory is its starting location.
    pub fn new(location: Genes) -> Self {
        Self {
            id: 0,
            memory: location.clone(),
            location,
            best_fitness: None,
            fitness: None,
            last_location: None,
            destination: None,
            training_time: None,
            metrics: TrainingMetrics::default(),
        }
    }

    /// Creates a crow at a random location.
    pub fn random<S: Species, R: Rng>(species: &S, rng: &mut R) -> Self {
        Self::new(species.random_location(rng))
    }

    /// Current location.
    pub fn location(&self) -> &Genes {
        &self.location
    }

    /// Best location visited so far.
    pub fn memory(&self) -> &Genes {
        &self.memory
    }

    /// Fitness at [`memory`](Self::memory).
    pub fn best_fitness(&self) -> Option<f64> {
        self.best_fitness
    }

    /// Fitness at the current location (or `None` while a move is pending).
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Location before the last completed move.
    pub fn last_location(&self) -> Option<&Genes> {
        self.last_location.as_ref()
    }

    /// Destination chosen by the last `follow`, until it is evaluated.
    pub fn destination(&self) -> Option<&Genes> {
        self.destination.as_ref()
    }

    /// Wall-clock seconds the last evaluation took on the worker.
    pub fn training_time(&self) -> Option<f64> {
        self.training_time
    }

    /// Auxiliary metrics of the last evaluation.
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Chooses the next destination while following a crow whose memory is
    /// `target_memory`.
    ///
    /// With probability `awareness_probability` the followed crow notices and
    /// this crow flies to a random location. Otherwise it pursues the target
    /// memory with step `flight_length · r`, `r ~ U(0, 1)`. Either way the
    /// cached fitness is cleared until the destination is evaluated.
    pub fn follow<S: Species, R: Rng>(
        &mut self,
        target_memory: &Genes,
        species: &S,
        awareness_probability: f64,
        flight_length: f64,
        rng: &mut R,
    ) -> Movement {
        let (destination, movement) = if rng.random_range(0.0..1.0) < awareness_probability {
            (species.random_location(rng), Movement::Evasion)
        } else {
            let step = flight_length * rng.random_range(0.0..1.0);
            (
                species.pursue(&self.location, target_memory, step, rng),
                Movement::Pursuit,
            )
        };
        self.destination = Some(destination);
        self.fitness = None;
        movement
    }
}

impl Candidate for Crow {
    const MODE: Mode = Mode::Swarm;

    fn id(&self) -> CandidateId {
        self.id
    }

    fn set_id(&mut self, id: CandidateId) {
        self.id = id;
    }

    fn score(&self) -> Option<f64> {
        self.best_fitness
    }

    fn needs_evaluation(&self) -> bool {
        self.fitness.is_none()
    }

    fn to_request(&self, generation: u64, context: &RequestContext<'_>) -> EvaluationRequest {
        EvaluationRequest::swarm(self.id, self.location.clone())
            .with_generation(generation)
            .with_swarm_state(
                self.fitness,
                self.last_location.clone(),
                self.best_fitness,
                Some(self.memory.clone()),
                self.destination.clone(),
            )
            .with_context(context)
    }

    fn absorb(&mut self, reply: EvaluationReply) -> Result<(), String> {
        match reply {
            EvaluationReply::Swarm(state) => {
                self.metrics = state.metrics();
                self.last_location = Some(state.last_location);
                self.location = state.location;
                self.fitness = Some(state.fitness);
                self.memory = state.memory;
                self.best_fitness = Some(state.best_fitness);
                self.training_time = Some(state.training_time);
                self.destination = None;
                Ok(())
            }
            other => Err(format!(
                "expected a swarm reply for crow {}, got {}",
                self.id,
                other.kind()
            )),
        }
    }

    fn penalize(&mut self, worst: f64) {
        self.destination = None;
        self.fitness = Some(worst);
        if self.best_fitness.is_none() {
            self.best_fitness = Some(worst);
        }
    }
}
