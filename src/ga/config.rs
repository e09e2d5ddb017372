//! Genetic algorithm configuration.
//!
//! [`GaConfig`] drives [`GeneticAlgorithm`](super::GeneticAlgorithm);
//! [`RouletteConfig`] drives [`RussianRouletteGA`](super::RussianRouletteGA).

use serde::{Deserialize, Serialize};

/// Configuration for the tournament genetic algorithm.
///
/// # Defaults
///
/// ```
/// use gentun::ga::GaConfig;
///
/// let config = GaConfig::default();
/// assert_eq!(config.tournament_size, 5);
/// assert!(config.elitism);
/// ```
///
/// # Builder Pattern
///
/// ```
/// use gentun::ga::GaConfig;
///
/// let config = GaConfig::default()
///     .with_tournament_size(3)
///     .with_elitism(false)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaConfig {
    /// Number of distinct individuals drawn per tournament.
    ///
    /// Higher values increase selection pressure. The population must hold
    /// at least this many individuals.
    pub tournament_size: usize,

    /// Whether the fittest individual is copied unchanged into the next
    /// generation.
    pub elitism: bool,

    /// Random seed for reproducibility. `None` uses a random seed.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            tournament_size: 5,
            elitism: true,
            seed: None,
        }
    }
}

impl GaConfig {
    /// Sets the tournament size (at least 1).
    pub fn with_tournament_size(mut self, k: usize) -> Self {
        self.tournament_size = k.max(1);
        self
    }

    /// Enables or disables elitism.
    pub fn with_elitism(mut self, elitism: bool) -> Self {
        self.elitism = elitism;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.tournament_size == 0 {
            return Err("tournament_size must be at least 1".into());
        }
        Ok(())
    }
}

/// Configuration for the Russian-roulette genetic algorithm.
///
/// # Defaults
///
/// ```
/// use gentun::ga::RouletteConfig;
///
/// let config = RouletteConfig::default();
/// assert_eq!(config.crossover_probability, 0.2);
/// assert_eq!(config.mutation_probability, 0.8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouletteConfig {
    /// Probability that an adjacent pair is crossed over instead of mutated.
    pub crossover_probability: f64,

    /// Probability that each member of a non-crossed pair is mutated.
    pub mutation_probability: f64,

    /// Random seed for reproducibility. `None` uses a random seed.
    pub seed: Option<u64>,
}

impl Default for RouletteConfig {
    fn default() -> Self {
        Self {
            crossover_probability: 0.2,
            mutation_probability: 0.8,
            seed: None,
        }
    }
}

impl RouletteConfig {
    /// Sets the crossover probability (clamped to `[0, 1]`).
    pub fn with_crossover_probability(mut self, p: f64) -> Self {
        self.crossover_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the mutation probability (clamped to `[0, 1]`).
    pub fn with_mutation_probability(mut self, p: f64) -> Self {
        self.mutation_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            return Err("crossover_probability must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err("mutation_probability must be in [0.0, 1.0]".into());
        }
        Ok(())
    }
}
