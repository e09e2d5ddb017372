//! Genetic algorithm drivers.
//!
//! Both drivers own a [`Population`](crate::population::Population) of
//! [`Individual`](crate::population::Individual)s and replace it every
//! generation. Fitness is requested in one batch per generation through the
//! population's evaluation backend.
//!
//! # Key Types
//!
//! - [`GeneticAlgorithm`]: tournament selection with optional elitism
//! - [`RussianRouletteGA`]: fitness-proportionate resampling, then pairwise
//!   crossover or mutation
//! - [`GaConfig`], [`RouletteConfig`]: driver parameters
//! - [`GaResult`]: final result with fitness history
//!
//! # Submodules
//!
//! - [`selection`]: distinct sampling and roulette weights, shared with the
//!   crow search driver
//!
//! # References
//!
//! - Goldberg (1989), *Genetic Algorithms in Search, Optimization, and Machine Learning*
//! - Xie & Yuille (2017), "Genetic CNN"

mod config;
mod roulette;
mod runner;
pub mod selection;

pub use config::{GaConfig, RouletteConfig};
pub use roulette::RussianRouletteGA;
pub use runner::{GaResult, GenerationReport, GeneticAlgorithm};
