//! Crow search configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`CrowSearchAlgorithm`](super::CrowSearchAlgorithm).
///
/// # Defaults
///
/// ```
/// use gentun::csa::CsaConfig;
///
/// let config = CsaConfig::default();
/// assert_eq!(config.tournament_size, 5);
/// assert_eq!(config.awareness_probability, 0.15);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsaConfig {
    /// Number of distinct crows drawn when choosing whom to follow.
    pub tournament_size: usize,

    /// Probability that a followed crow notices and leads its follower to a
    /// random location.
    pub awareness_probability: f64,

    /// Flight length: scales the step toward the target memory. Values below
    /// 1 search locally; larger values search globally.
    pub flight_length: f64,

    /// Random seed for reproducibility. `None` uses a random seed.
    pub seed: Option<u64>,
}

impl Default for CsaConfig {
    fn default() -> Self {
        Self {
            tournament_size: 5,
            awareness_probability: 0.15,
            flight_length: 2.0,
            seed: None,
        }
    }
}

impl CsaConfig {
    /// Sets the tournament size (at least 1).
    pub fn with_tournament_size(mut self, k: usize) -> Self {
        self.tournament_size = k.max(1);
        self
    }

    /// Sets the awareness probability (clamped to `[0, 1]`).
    pub fn with_awareness_probability(mut self, p: f64) -> Self {
        self.awareness_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the flight length (non-negative).
    pub fn with_flight_length(mut self, fl: f64) -> Self {
        self.flight_length = fl.max(0.0);
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
        if !(0.0..=1.0).contains(&self.awareness_probability) {
            return Err("awareness_probability must be in [0.0, 1.0]".into());
        }
        if !self.flight_length.is_finite() || self.flight_length < 0.0 {
            return Err("flight_length must be finite and non-negative".into());
        }
        Ok(())
    }
}
