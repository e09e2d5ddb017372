//! Russian-roulette genetic algorithm.
//!
//! Each generation is resampled with replacement proportionally to fitness,
//! then adjacent pairs are either crossed over or independently mutated.
//! There is no elitism: the fittest may be lost.

use super::config::RouletteConfig;
use super::runner::{GaResult, GenerationReport};
use super::selection::{roulette_weights, weighted_draws};
use crate::error::GentunError;
use crate::population::{is_better, worst_fitness, Candidate, Individual, Population, Species};
use crate::random::rng_from;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Fitness-proportionate GA with pairwise crossover or mutation.
pub struct RussianRouletteGA<S: Species> {
    population: Population<S, Individual>,
    config: RouletteConfig,
    generation: u64,
    rng: StdRng,
}

impl<S: Species> RussianRouletteGA<S> {
    /// Creates a driver starting at generation 1.
    pub fn new(population: Population<S, Individual>, config: RouletteConfig) -> Result<Self, GentunError> {
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

    /// Generation counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Evaluates the current generation and replaces it with the resampled,
    /// varied one.
    ///
    /// Resampled copies keep their cached fitness until they are varied, so
    /// untouched survivors are not evaluated again.
    pub fn evolve_population(&mut self) -> Result<GenerationReport<Individual>, GentunError> {
        if self.population.is_empty() {
            return Err(GentunError::Configuration("population is empty".into()));
        }
        let generation = self.generation;
        let size = self.population.size();
        let maximize = self.population.maximize();
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

        let worst = worst_fitness(maximize);
        let fitness: Vec<f64> = self
            .population
            .members()
            .iter()
            .map(|m| m.fitness().unwrap_or(worst))
            .collect();
        let weights = roulette_weights(&fitness, maximize);
        let draws = weighted_draws(&weights, size, &mut self.rng);
        debug!(generation, ?draws, "roulette draws");

        let mut next = self.population.sibling();
        next.set_generation(generation + 1);
        for index in draws {
            next.add_individual(self.population[index].clone());
        }

        let species = Arc::clone(self.population.species());
        let mut crossed = 0;
        let mut mutated = 0;
        for pair in 0..size / 2 {
            let (first, second) = next.pair_mut(2 * pair, 2 * pair + 1);
            if self.rng.random_range(0.0..1.0) < self.config.crossover_probability {
                first.crossover(second, &*species, &mut self.rng);
                crossed += 1;
            } else {
                if self.rng.random_range(0.0..1.0) < self.config.mutation_probability {
                    first.mutate(&*species, &mut self.rng);
                    mutated += 1;
                }
                if self.rng.random_range(0.0..1.0) < self.config.mutation_probability {
                    second.mutate(&*species, &mut self.rng);
                    mutated += 1;
                }
            }
        }
        debug!(generation, crossed, mutated, "pairs varied");

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
    pub fn run_with_cancel(
        &mut self,
        max_generations: u64,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<GaResult<Individual>, GentunError> {
        info!(
            size = self.population.size(),
            max_generations,
            crossover_probability = self.config.crossover_probability,
            mutation_probability = self.config.mutation_probability,
            "starting russian roulette genetic algorithm"
        );

        let maximize = self.population.maximize();
        let mut best: Option<(Individual, f64)> = None;
        let mut fitness_history = Vec::new();
        let mut generations = 0;
        let mut cancelled = false;

        while self.generation <= max_generations {
            if cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                cancelled = true;
                break;
            }

            let report = self.evolve_population()?;
            generations += 1;
            fitness_history.push(report.best_fitness);
            if best
                .as_ref()
                .map_or(true, |(_, incumbent)| is_better(report.best_fitness, *incumbent, maximize))
            {
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
        info!(best_fitness, generations, cancelled, "russian roulette finished");

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

    fn valued(values: &[f64], maximize: bool) -> Population<LineSpecies> {
        Population::from_candidates(
            Arc::new(LineSpecies),
            Arc::new(LocalAssessor::new(ReadValue, ())),
            PopulationSettings::default().with_maximize(maximize),
            values.iter().map(|&v| Individual::new(value_genes(v))),
        )
    }

    #[test]
    fn test_no_variation_resamples_existing_genes() {
        let pop = valued(&[0.2, 0.4, 0.6, 0.8], true);
        let config = RouletteConfig::default()
            .with_crossover_probability(0.0)
            .with_mutation_probability(0.0)
            .with_seed(9);
        let mut ga = RussianRouletteGA::new(pop, config).unwrap();
        ga.evolve_population().unwrap();

        let next = ga.population();
        assert_eq!(next.size(), 4);
        for (i, member) in next.members().iter().enumerate() {
            assert_eq!(member.id(), i);
            // Resampled copies keep their cached fitness.
            let value = member.genes()["value"].as_f64().unwrap();
            assert_eq!(member.fitness(), Some(value));
            // The lowest value has zero weight after the shift.
            assert!(value > 0.2);
        }
    }

    #[test]
    fn test_equal_fitness_keeps_population_size() {
        let pop = valued(&[0.5; 6], false);
        let config = RouletteConfig::default().with_seed(4);
        let mut ga = RussianRouletteGA::new(pop, config).unwrap();
        let report = ga.evolve_population().unwrap();
        assert_eq!(report.best_fitness, 0.5);
        assert_eq!(ga.population().size(), 6);
    }

    #[test]
    fn test_full_mutation_clears_all_pairs() {
        let pop = valued(&[0.2, 0.4, 0.6, 0.8, 0.9], true);
        let config = RouletteConfig::default()
            .with_crossover_probability(0.0)
            .with_mutation_probability(1.0)
            .with_seed(2);
        let mut ga = RussianRouletteGA::new(pop, config).unwrap();
        ga.evolve_population().unwrap();
        let members = ga.population().members();
        assert!(members[..4].iter().all(Candidate::needs_evaluation));
        // Odd one out is neither crossed nor mutated.
        assert!(!members[4].needs_evaluation());
    }

    #[test]
    fn test_run_on_onemax() {
        let mut rng = create_rng(3);
        let pop = Population::<_, Individual>::random(
            Arc::new(onemax_species(12)),
            Arc::new(LocalAssessor::new(CountOnes, ())),
            PopulationSettings::default(),
            8,
            &mut rng,
        );
        let mut ga = RussianRouletteGA::new(pop, RouletteConfig::default().with_seed(3)).unwrap();
        let result = ga.run(6).unwrap();
        assert_eq!(result.generations, 6);
        assert!(result.best_fitness >= result.fitness_history[0]);
    }

    #[test]
    fn test_empty_population_rejected() {
        let mut ga = RussianRouletteGA::new(valued(&[], true), RouletteConfig::default()).unwrap();
        assert!(matches!(ga.evolve_population(), Err(GentunError::Configuration(_))));
    }
}
