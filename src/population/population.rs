//! Ordered candidate collections bound to a species and an evaluation backend.

use super::assess::Assessor;
use super::crow::Crow;
use super::individual::Individual;
use super::types::{is_better, worst_fitness, Candidate, RequestContext, Species};
use crate::error::{EvaluationError, GentunError};
use crate::genome::{Genes, Parameters};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a population does with a candidate whose evaluation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop and surface the first failure.
    #[default]
    Abort,
    /// Assign the worst possible fitness and keep going.
    WorstFit,
}

/// Settings shared by a population and every population derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSettings {
    /// Fitness direction.
    pub maximize: bool,
    /// Extra evaluator parameters forwarded with every request.
    pub parameters: Parameters,
    /// Experiment id forwarded with every request.
    pub experiment_id: Option<String>,
    /// Failure handling.
    pub on_failure: FailurePolicy,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            maximize: true,
            parameters: Parameters::new(),
            experiment_id: None,
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl PopulationSettings {
    /// Sets the fitness direction.
    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    /// Sets the extra evaluator parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the experiment id.
    pub fn with_experiment_id(mut self, id: impl Into<String>) -> Self {
        self.experiment_id = Some(id.into());
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// An ordered collection of candidates.
///
/// Evaluation is lazy: fitness is computed on first access by
/// [`get_fittest`](Self::get_fittest) or [`fittest_of`](Self::fittest_of),
/// in one batch for every candidate that lacks it.
pub struct Population<S: Species, C: Candidate = Individual> {
    species: Arc<S>,
    assessor: Arc<dyn Assessor>,
    settings: Arc<PopulationSettings>,
    members: Vec<C>,
    generation: u64,
}

/// A population of crows.
pub type Flock<S> = Population<S, Crow>;

impl<S: Species, C: Candidate> Population<S, C> {
    /// Creates an empty population.
    pub fn new(species: Arc<S>, assessor: Arc<dyn Assessor>, settings: PopulationSettings) -> Self {
        Self {
            species,
            assessor,
            settings: Arc::new(settings),
            members: Vec::new(),
            generation: 0,
        }
    }

    /// Creates a population from explicit candidates. Ids are reassigned in
    /// order.
    pub fn from_candidates<I>(
        species: Arc<S>,
        assessor: Arc<dyn Assessor>,
        settings: PopulationSettings,
        candidates: I,
    ) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let mut population = Self::new(species, assessor, settings);
        for candidate in candidates {
            population.add_individual(candidate);
        }
        population
    }

    /// Empty population sharing species, backend and settings.
    pub fn sibling(&self) -> Self {
        Self {
            species: Arc::clone(&self.species),
            assessor: Arc::clone(&self.assessor),
            settings: Arc::clone(&self.settings),
            members: Vec::with_capacity(self.members.len()),
            generation: self.generation,
        }
    }

    /// Appends a candidate, giving it the next id.
    pub fn add_individual(&mut self, mut candidate: C) {
        candidate.set_id(self.members.len());
        self.members.push(candidate);
    }

    /// Number of candidates.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Whether the population has no candidates.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Candidates in order.
    pub fn members(&self) -> &[C] {
        &self.members
    }

    /// Mutable access to two distinct candidates.
    ///
    /// # Panics
    /// Panics if `first == second` or either index is out of bounds.
    pub fn pair_mut(&mut self, first: usize, second: usize) -> (&mut C, &mut C) {
        assert_ne!(first, second, "pair indices must differ");
        if first < second {
            let (head, tail) = self.members.split_at_mut(second);
            (&mut head[first], &mut tail[0])
        } else {
            let (head, tail) = self.members.split_at_mut(first);
            (&mut tail[0], &mut head[second])
        }
    }

    /// The species.
    pub fn species(&self) -> &Arc<S> {
        &self.species
    }

    /// The evaluation backend.
    pub fn assessor(&self) -> &Arc<dyn Assessor> {
        &self.assessor
    }

    /// Shared settings.
    pub fn settings(&self) -> &PopulationSettings {
        &self.settings
    }

    /// Fitness direction.
    pub fn maximize(&self) -> bool {
        self.settings.maximize
    }

    /// Generation label attached to requests.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sets the generation label.
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Evaluates every candidate lacking a fitness in one batch.
    ///
    /// Returns the number of candidates evaluated.
    pub fn evaluate(&mut self) -> Result<usize, GentunError> {
        let all: Vec<usize> = (0..self.members.len()).collect();
        self.evaluate_indices(&all)
    }

    fn evaluate_indices(&mut self, indices: &[usize]) -> Result<usize, GentunError> {
        let pending: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| self.members[i].needs_evaluation())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let settings = Arc::clone(&self.settings);
        let context = RequestContext {
            parameters: &settings.parameters,
            experiment_id: settings.experiment_id.as_deref(),
            maximize: settings.maximize,
        };
        let generation = self.generation;
        let batch: Vec<_> = pending
            .iter()
            .map(|&i| self.members[i].to_request(generation, &context))
            .collect();

        debug!(generation, count = batch.len(), "evaluating batch");
        let outcomes = self.assessor.assess(batch);
        if outcomes.len() != pending.len() {
            return Err(GentunError::Transport(format!(
                "backend returned {} outcomes for {} requests",
                outcomes.len(),
                pending.len()
            )));
        }

        let worst = worst_fitness(settings.maximize);
        let mut first_error = None;
        for (&index, outcome) in pending.iter().zip(outcomes) {
            let member = &mut self.members[index];
            let id = member.id();
            let applied = outcome.and_then(|reply| {
                member
                    .absorb(reply)
                    .map_err(|reason| EvaluationError::Serialization { id, generation, reason })
            });
            if let Err(err) = applied {
                warn!(candidate = id, generation, error = %err, "evaluation failed");
                match settings.on_failure {
                    FailurePolicy::WorstFit => member.penalize(worst),
                    FailurePolicy::Abort => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(pending.len()),
        }
    }

    /// Index of the best-scored candidate among `indices`, without
    /// evaluating anything. Ties keep the first index seen; unscored
    /// candidates and NaN scores are skipped.
    pub fn best_among(&self, indices: &[usize]) -> Option<usize> {
        let maximize = self.settings.maximize;
        let mut best: Option<(usize, f64)> = None;
        for &i in indices {
            let Some(score) = self.members[i].score().filter(|s| !s.is_nan()) else {
                continue;
            };
            match best {
                Some((_, incumbent)) if !is_better(score, incumbent, maximize) => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Evaluates the given candidates if needed and returns the index of the
    /// best one.
    pub fn fittest_of(&mut self, indices: &[usize]) -> Result<usize, GentunError> {
        if indices.is_empty() {
            return Err(GentunError::Configuration(
                "cannot select from an empty set of candidates".into(),
            ));
        }
        self.evaluate_indices(indices)?;
        self.best_among(indices).ok_or_else(|| {
            GentunError::Configuration("no candidate has a fitness to compare".into())
        })
    }

    /// Evaluates the population if needed and returns its best candidate.
    ///
    /// Calling it again without changes returns the same candidate and
    /// triggers no evaluation.
    pub fn get_fittest(&mut self) -> Result<&C, GentunError> {
        if self.members.is_empty() {
            return Err(GentunError::Configuration("population is empty".into()));
        }
        let all: Vec<usize> = (0..self.members.len()).collect();
        let index = self.fittest_of(&all)?;
        Ok(&self.members[index])
    }
}

impl<S: Species> Population<S, Individual> {
    /// Population of `size` random individuals.
    pub fn random<R: Rng>(
        species: Arc<S>,
        assessor: Arc<dyn Assessor>,
        settings: PopulationSettings,
        size: usize,
        rng: &mut R,
    ) -> Self {
        let members: Vec<Individual> = (0..size).map(|_| Individual::random(&*species, rng)).collect();
        Self::from_candidates(species, assessor, settings, members)
    }

    /// Population with one individual per combination of grid values.
    ///
    /// Each key of `grid` names a gene and lists the values it may take.
    /// Combinations are enumerated with the last key varying fastest, so a
    /// grid `{a: [1, 2], b: [x, y]}` yields `(1, x), (1, y), (2, x), (2, y)`.
    /// A key with no values yields an empty population.
    pub fn grid(
        species: Arc<S>,
        assessor: Arc<dyn Assessor>,
        settings: PopulationSettings,
        grid: &BTreeMap<String, Vec<Value>>,
    ) -> Self {
        let mut combinations = vec![Genes::new()];
        for (gene, values) in grid {
            combinations = combinations
                .into_iter()
                .flat_map(|genes| {
                    values.iter().map(move |value| {
                        let mut genes = genes.clone();
                        genes.insert(gene.clone(), value.clone());
                        genes
                    })
                })
                .collect();
        }
        debug!(size = combinations.len(), "built grid population");
        Self::from_candidates(species, assessor, settings, combinations.into_iter().map(Individual::new))
    }
}

impl<S: Species> Population<S, Crow> {
    /// Flock of `size` crows at random locations.
    pub fn random<R: Rng>(
        species: Arc<S>,
        assessor: Arc<dyn Assessor>,
        settings: PopulationSettings,
        size: usize,
        rng: &mut R,
    ) -> Self {
        let members: Vec<Crow> = (0..size).map(|_| Crow::random(&*species, rng)).collect();
        Self::from_candidates(species, assessor, settings, members)
    }
}

impl<S: Species, C: Candidate> Index<usize> for Population<S, C> {
    type Output = C;

    fn index(&self, index: usize) -> &C {
        &self.members[index]
    }
}

impl<S: Species, C: Candidate> IndexMut<usize> for Population<S, C> {
    fn index_mut(&mut self, index: usize) -> &mut C {
        &mut self.members[index]
    }
}
