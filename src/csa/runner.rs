//! Crow search loop.

use super::config::CsaConfig;
use crate::error::GentunError;
use crate::ga::selection::sample_distinct;
use crate::population::{is_better, Candidate, Crow, Flock, Movement, Species};
use crate::random::rng_from;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a crow search run.
#[derive(Debug, Clone)]
pub struct CsaResult {
    /// Crow holding the best memory reported during the run.
    pub best: Crow,

    /// Fitness at `best.memory()`.
    pub best_fitness: f64,

    /// Number of iterations run.
    pub iterations: u64,

    /// Whether the run was cancelled externally.
    pub cancelled: bool,

    /// Best remembered fitness at each iteration.
    pub fitness_history: Vec<f64>,
}

/// Summary of one iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// Iteration that was evaluated.
    pub iteration: u64,
    /// Crow with the best memory.
    pub fittest: Crow,
    /// Fitness at its memory.
    pub best_fitness: f64,
    /// Number of crows that pursued their target.
    pub pursuits: usize,
    /// Number of crows sent to a random location.
    pub evasions: usize,
}

/// Crow search: every crow follows the best of a small tournament and moves
/// toward its memory, unless the followed crow notices.
///
/// # References
///
/// - Askarzadeh (2016), "A novel metaheuristic method for solving constrained
///   engineering optimization problems: Crow search algorithm"
pub struct CrowSearchAlgorithm<S: Species> {
    flock: Flock<S>,
    config: CsaConfig,
    iteration: u64,
    max_iterations: u64,
    rng: StdRng,
}

impl<S: Species> CrowSearchAlgorithm<S> {
    /// Creates a driver starting at iteration 1.
    pub fn new(flock: Flock<S>, config: CsaConfig) -> Result<Self, GentunError> {
        config.validate().map_err(GentunError::Configuration)?;
        let rng = rng_from(config.seed);
        Ok(Self {
            flock,
            config,
            iteration: 1,
            max_iterations: 0,
            rng,
        })
    }

    /// Current flock.
    pub fn flock(&self) -> &Flock<S> {
        &self.flock
    }

    /// Iteration counter.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Last iteration after which crows still move.
    pub fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    /// Sets the last iteration after which crows still move. [`run`](Self::run)
    /// sets it from its argument.
    pub fn set_max_iterations(&mut self, max_iterations: u64) {
        self.max_iterations = max_iterations;
    }

    /// Picks the crow that `crow` will follow from an explicit sample.
    ///
    /// Candidates with the same id as `crow` are excluded, so a crow never
    /// follows itself. Returns `None` when nothing eligible remains.
    pub fn tournament_from(&self, crow: usize, sample: &[usize]) -> Option<usize> {
        let own = self.flock[crow].id();
        let eligible: Vec<usize> = sample
            .iter()
            .copied()
            .filter(|&i| self.flock[i].id() != own)
            .collect();
        self.flock.best_among(&eligible)
    }

    /// Draws `tournament_size` distinct crows and returns the best one other
    /// than `crow`.
    pub fn tournament_select(&mut self, crow: usize) -> Option<usize> {
        let sample = sample_distinct(self.flock.size(), self.config.tournament_size, &mut self.rng);
        self.tournament_from(crow, &sample)
    }

    /// Evaluates pending moves, reports the best crow and, unless this is
    /// the final iteration, moves every crow.
    ///
    /// Targets are chosen before any crow moves, so all crows follow the
    /// memories of the same iteration.
    pub fn release_flock(&mut self) -> Result<IterationReport, GentunError> {
        let size = self.flock.size();
        if size < self.config.tournament_size {
            return Err(GentunError::Configuration(format!(
                "flock size {size} is smaller than tournament size {}",
                self.config.tournament_size
            )));
        }
        let iteration = self.iteration;
        self.flock.set_generation(iteration);

        info!(iteration, size, "evaluating flock");
        let fittest = self.flock.get_fittest()?.clone();
        let best_fitness = fittest.best_fitness().unwrap_or(f64::NAN);
        info!(
            iteration,
            crow = fittest.id(),
            best_fitness,
            memory = ?fittest.memory(),
            "best performance"
        );

        let mut pursuits = 0;
        let mut evasions = 0;
        if iteration < self.max_iterations {
            let targets: Vec<Option<usize>> = (0..size).map(|i| self.tournament_select(i)).collect();
            let species = Arc::clone(self.flock.species());
            for (crow, target) in targets.into_iter().enumerate() {
                let Some(target) = target else {
                    debug!(iteration, crow, "no crow to follow");
                    continue;
                };
                let memory = self.flock[target].memory().clone();
                let movement = self.flock[crow].follow(
                    &memory,
                    &*species,
                    self.config.awareness_probability,
                    self.config.flight_length,
                    &mut self.rng,
                );
                debug!(iteration, crow, target, ?movement, "crow moved");
                match movement {
                    Movement::Pursuit => pursuits += 1,
                    Movement::Evasion => evasions += 1,
                }
            }
        }

        Ok(IterationReport {
            iteration,
            fittest,
            best_fitness,
            pursuits,
            evasions,
        })
    }

    /// Runs iterations `1..=max_iterations`.
    pub fn run(&mut self, max_iterations: u64) -> Result<CsaResult, GentunError> {
        self.run_with_cancel(max_iterations, None)
    }

    /// Runs with an optional cancellation token.
    pub fn run_with_cancel(
        &mut self,
        max_iterations: u64,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<CsaResult, GentunError> {
        self.max_iterations = max_iterations;
        info!(
            size = self.flock.size(),
            max_iterations,
            tournament_size = self.config.tournament_size,
            awareness_probability = self.config.awareness_probability,
            flight_length = self.config.flight_length,
            "starting crow search algorithm"
        );

        let maximize = self.flock.maximize();
        let mut best: Option<(Crow, f64)> = None;
        let mut fitness_history = Vec::new();
        let mut iterations = 0;
        let mut cancelled = false;

        while self.iteration <= max_iterations {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }

            let report = self.release_flock()?;
            iterations += 1;
            fitness_history.push(report.best_fitness);
            let improved = match &best {
                Some((_, incumbent)) => is_better(report.best_fitness, *incumbent, maximize),
                None => true,
            };
            if improved {
                best = Some((report.fittest, report.best_fitness));
            }
            self.iteration += 1;
        }

        let (best, best_fitness) = match best {
            Some(found) => found,
            None => {
                let fittest = self.flock.get_fittest()?.clone();
                let fitness = fittest.best_fitness().unwrap_or(f64::NAN);
                (fittest, fitness)
            }
        };
        info!(best_fitness, iterations, cancelled, "crow search finished");

        Ok(CsaResult {
            best,
            best_fitness,
            iterations,
            cancelled,
            fitness_history,
        })
    }
}
