//! Crow search algorithm.
//!
//! Drives a [`Flock`](crate::population::Flock): each iteration evaluates
//! pending moves in one batch, reports the crow with the best memory, then
//! sends every crow after the best of a small tournament.
//!
//! Crow state updates (new location, memory) are computed on the evaluating
//! side and written back from the reply, so the same flock runs unchanged
//! against local and remote backends.

mod config;
mod runner;

pub use config::CsaConfig;
pub use runner::{CrowSearchAlgorithm, CsaResult, IterationReport};
