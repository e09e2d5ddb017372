//! Tournament genetic algorithm.
//!
//! [`GeneticAlgorithm`] runs the generational loop:
//! evaluate → report fittest → elitism → tournament selection →
//! reproduction → mutation → replace.

use super::config::GaConfig;
use super::selection::sample_distinct;
use crate::error::GentunError;
use crate::population::{is_better, Candidate, Individual, Population, Species};
use crate::random::rng_from;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Result of a genetic algorithm run.
#[derive(Debug, Clone)]
pub struct GaResult<C: Candidate> {
    /// The best candidate reported during the run.
    pub best: C,

    /// Fitness of `best`.
    pub best_fitness: f64,

    /// Number of generations evolved.
    pub generations: u64,

    /// Whether the run was cancelled externally.
    pub cancelled: bool,

    /// Fittest fitness of each evolved generation.
    pub fitness_history: Vec<f64>,
}

/// Summary of one evolved generation.
#[derive(Debug, Clone)]
pub struct GenerationReport<C: Candidate> {
    /// Generation that was evaluated.
    pub generation: u64,
    /// Its fittest candidate.
    pub fittest: C,
    /// Fitness of `fittest`.
    pub best_fitness: f64,
}

/// Generational GA with tournament selection and optional elitism.
///
/// # Usage
///
/// ```ignore
/// let population = Population::<_, Individual>::random(species, assessor, settings, 20, &mut rng);
/// let mut ga = GeneticAlgorithm::new(population, GaConfig::default().with_seed(42))?;
/// let result = ga.run(50)?;
/// println!("best fitness: {}", result.best_fitness);
/// ```
pub struct GeneticAlgorithm<S: Species> {
    population: Population<S, Individual>,
    config: GaConfig,
    generation: u64,
    rng: StdRng,
}

impl<S: Species> GeneticAlgorithm<S> {
    /// Creates a driver starting at generation 1.
    pub fn new(population: Population<S, Individual>, config: GaConfig) -> Result<Self, GentunError> {
        config.validate().map_err(GentunError::Configuration)?;
        let rng = rng_from(config.seed);
        Ok(Self {
            population,
            config,
            generation: 1,
            rng,
        })
    }

    /// Current population.
    pub fn population(&self) -> &Population<S, Individual> {
        &self.population
    }

    /// Mutable access to the current population.
    pub fn population_mut(&mut self) -> &mut Population<S, Individual> {
        &mut self.population
    }

    /// Generation counter (the next generation to be evaluated).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Configuration in use.
    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    fn check_tournament(&self) -> Result<(), GentunError> {
        let size = self.population.size();
        if size < self.config.tournament_size {
            return Err(GentunError::Configuration(format!(
                "population size {size} is smaller than tournament size {}",
                self.config.tournament_size
            )));
        }
        Ok(())
    }

    /// Runs a tournament: draws `tournament_size` distinct individuals
    /// uniformly and returns a copy of the fittest (evaluating them if
    /// needed).
    pub fn tournament_select(&mut self) -> Result<Individual, GentunError> {
        self.check_tournament()?;
        let contestants = sample_distinct(
            self.population.size(),
            self.config.tournament_size,
            &mut self.rng,
        );
        let winner = self.population.fittest_of(&contestants)?;
        Ok(self.population[winner].clone())
    }

    /// Evaluates the current generation and replaces it with its offspring.
    pub fn evolve_population(&mut self) -> Result<GenerationReport<Individual>, GentunError> {
        self.check_tournament()?;
        let generation = self.generation;
        let size = self.population.size();
        self.population.set_generation(generation);

        info!(generation, size, "evaluating generation");
        let fittest = self.population.get_fittest()?.clone();
        let best_fitness = fittest.fitness().unwrap_or(f64::NAN);
        info!(
            generation,
            candidate = fittest.id(),
            fitness = best_fitness,
            genes = ?fittest.genes(),
            "fittest individual"
        );

        let species = Arc::clone(self.population.species());
        let mut next = self.population.sibling();
        next.set_generation(generation + 1);
        if self.config.elitism {
            next.add_individual(fittest.clone());
        }
        while next.size() < size {
            let first = self.tournament_select()?;
            let second = self.tournament_select()?;
            let mut child = first.reproduce(&second, &*species, &mut self.rng);
            child.mutate(&*species, &mut self.rng);
            next.add_individual(child);
        }

        self.population = next;
        self.generation += 1;
        Ok(GenerationReport {
            generation,
            fittest,
            best_fitness,
        })
    }

    /// Evolves until the generation counter exceeds `max_generations`.
    pub fn run(&mut self, max_generations: u64) -> Result<GaResult<Individual>, GentunError> {
        self.run_with_cancel(max_generations, None)
    }

    /// Runs with an optional cancellation token.
    ///
    /// If `cancel` is set to `true`, the run stops before the next generation
    /// and returns the best individual reported so far.
    pub fn run_with_cancel(
        &mut self,
        max_generations: u64,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<GaResult<Individual>, GentunError> {
        self.check_tournament()?;
        info!(
            size = self.population.size(),
            max_generations,
            tournament_size = self.config.tournament_size,
            elitism = self.config.elitism,
            "starting genetic algorithm"
        );

        let maximize = self.population.maximize();
        let mut best: Option<(Individual, f64)> = None;
        let mut fitness_history = Vec::new();
        let mut generations = 0;
        let mut cancelled = false;

        while self.generation <= max_generations {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }

            let report = self.evolve_population()?;
            generations += 1;
            fitness_history.push(report.best_fitness);
            let improved = match &best {
                Some((_, incumbent)) => is_better(report.best_fitness, *incumbent, maximize),
                None => true,
            };
            if improved {
                best = Some((report.fittest, report.best_fitness));
            }
        }

        let (best, best_fitness) = match best {
            Some(found) => found,
            None => {
                let fittest = self.population.get_fittest()?.clone();
                let fitness = fittest.fitness().unwrap_or(f64::NAN);
                (fittest, fitness)
            }
        };
        info!(best_fitness, generations, cancelled, "genetic algorithm finished");

        Ok(GaResult {
            best,
            best_fitness,
            generations,
            cancelled,
            fitness_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{LocalAssessor, PopulationSettings};
    use crate::random::create_rng;
    use crate::testing::{onemax_species, value_genes, CountOnes, LineSpecies, ReadValue};
    use proptest::prelude::*;

    fn onemax(size: usize, seed: u64) -> Population<crate::genome::BitStringSpecies> {
        let mut rng = create_rng(seed);
        Population::<_, Individual>::random(
            Arc::new(onemax_species(16)),
            Arc::new(LocalAssessor::new(CountOnes, ())),
            PopulationSettings::default(),
            size,
            &mut rng,
        )
    }

    fn valued(values: &[f64]) -> Population<LineSpecies> {
        Population::from_candidates(
            Arc::new(LineSpecies),
            Arc::new(LocalAssessor::new(ReadValue, ())),
            PopulationSettings::default(),
            values.iter().map(|&v| Individual::new(value_genes(v))),
        )
    }

    #[test]
    fn test_tournament_returns_best_contestant() {
        let mut pop = valued(&[0.9, 0.2, 0.5, 0.8, 0.3]);
        let winner = pop.fittest_of(&[0, 2, 4]).unwrap();
        assert_eq!(pop[winner].fitness(), Some(0.9));
    }

    #[test]
    fn test_full_tournament_picks_global_best() {
        let pop = valued(&[0.9, 0.2, 0.5, 0.8, 0.3]);
        let mut ga = GeneticAlgorithm::new(pop, GaConfig::default().with_seed(1)).unwrap();
        for _ in 0..10 {
            assert_eq!(ga.tournament_select().unwrap().fitness(), Some(0.9));
        }
    }

    proptest! {
        #[test]
        fn prop_tournament_winner_is_best_of_its_sample(
            values in proptest::collection::vec(0.0f64..1.0, 3..25),
            k_pick in any::<usize>(),
            seed in any::<u64>(),
        ) {
            let n = values.len();
            let k = 2 + k_pick % (n - 2);
            let sample = sample_distinct(n, k, &mut create_rng(seed));
            let best = sample.iter().map(|&i| values[i]).fold(f64::NEG_INFINITY, f64::max);

            let config = GaConfig::default().with_tournament_size(k).with_seed(seed);
            let mut ga = GeneticAlgorithm::new(valued(&values), config).unwrap();
            let winner = ga.tournament_select().unwrap();
            prop_assert_eq!(winner.fitness(), Some(best));

            let evaluated = ga.population().members().iter().filter(|m| m.fitness().is_some()).count();
            prop_assert_eq!(evaluated, k);
        }
    }

    #[test]
    fn test_population_smaller_than_tournament() {
        let pop = valued(&[0.1, 0.2, 0.3]);
        let mut ga = GeneticAlgorithm::new(pop, GaConfig::default().with_tournament_size(5)).unwrap();
        match ga.evolve_population() {
            Err(GentunError::Configuration(msg)) => assert!(msg.contains("tournament")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ga.generation(), 1);
    }

    #[test]
    fn test_elitism_keeps_fittest_first() {
        let pop = valued(&[0.1, 0.7, 0.3, 0.2, 0.4, 0.5]);
        let mut ga = GeneticAlgorithm::new(pop, GaConfig::default().with_seed(3)).unwrap();
        let report = ga.evolve_population().unwrap();
        assert_eq!(report.best_fitness, 0.7);
        let next = ga.population();
        assert_eq!(next.size(), 6);
        assert_eq!(next[0].genes(), &value_genes(0.7));
        assert_eq!(next[0].fitness(), Some(0.7));
        assert_eq!(ga.generation(), 2);
        assert_eq!(next.generation(), 2);
    }

    #[test]
    fn test_run_counts_generations() {
        let mut ga = GeneticAlgorithm::new(onemax(10, 42), GaConfig::default().with_seed(42)).unwrap();
        let result = ga.run(4).unwrap();
        assert_eq!(result.generations, 4);
        assert_eq!(result.fitness_history.len(), 4);
        assert!(!result.cancelled);
        assert_eq!(ga.generation(), 5);
    }

    #[test]
    fn test_elitism_never_regresses() {
        let mut ga = GeneticAlgorithm::new(onemax(12, 7), GaConfig::default().with_seed(7)).unwrap();
        let result = ga.run(15).unwrap();
        for pair in result.fitness_history.windows(2) {
            assert!(pair[1] >= pair[0], "history regressed: {:?}", result.fitness_history);
        }
        assert_eq!(result.best_fitness, *result.fitness_history.last().unwrap());
    }

    #[test]
    fn test_cancel_before_first_generation() {
        let mut ga = GeneticAlgorithm::new(onemax(10, 1), GaConfig::default().with_seed(1)).unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let result = ga.run_with_cancel(10, Some(cancel)).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.generations, 0);
        assert!(result.best_fitness.is_finite());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = |seed| {
            let mut ga =
                GeneticAlgorithm::new(onemax(10, seed), GaConfig::default().with_seed(seed)).unwrap();
            ga.run(5).unwrap().fitness_history
        };
        assert_eq!(run(11), run(11));
    }
}
