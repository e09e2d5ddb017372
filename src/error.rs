//! Error types shared by the drivers, the populations and the RPC layer.

use crate::population::CandidateId;
use thiserror::Error;

/// Errors surfaced to the caller of a driver or population operation.
#[derive(Error, Debug)]
pub enum GentunError {
    /// Invalid setup detected before any evaluation work begins
    /// (e.g. population smaller than the tournament).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A candidate could not be evaluated and the failure policy aborts.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The message broker failed (connect, publish, subscribe).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Per-candidate evaluation failure.
///
/// Every variant carries the candidate id and generation so the failure can
/// be diagnosed without inspecting the broker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// The evaluator returned an error for this genome.
    #[error("candidate {id} (generation {generation}) failed evaluation: {reason}")]
    Failed {
        /// Candidate id.
        id: CandidateId,
        /// Generation or iteration number.
        generation: u64,
        /// Error chain reported by the evaluator.
        reason: String,
    },

    /// No reply arrived after every allowed attempt.
    #[error("candidate {id} (generation {generation}) got no reply after {attempts} attempt(s)")]
    TimedOut {
        /// Candidate id.
        id: CandidateId,
        /// Generation or iteration number.
        generation: u64,
        /// Number of times the request was published.
        attempts: u32,
    },

    /// The request or its reply could not be encoded/decoded.
    #[error("candidate {id} (generation {generation}) malformed exchange: {reason}")]
    Serialization {
        /// Candidate id.
        id: CandidateId,
        /// Generation or iteration number.
        generation: u64,
        /// Codec error message.
        reason: String,
    },

    /// The request could not be published or the reply link closed.
    #[error("candidate {id} (generation {generation}) transport failure: {reason}")]
    Transport {
        /// Candidate id.
        id: CandidateId,
        /// Generation or iteration number.
        generation: u64,
        /// Broker error message.
        reason: String,
    },
}

impl EvaluationError {
    /// Id of the candidate the failure belongs to.
    pub fn candidate(&self) -> CandidateId {
        match self {
            EvaluationError::Failed { id, .. }
            | EvaluationError::TimedOut { id, .. }
            | EvaluationError::Serialization { id, .. }
            | EvaluationError::Transport { id, .. } => *id,
        }
    }
}
