//! Evaluation backends.

use super::types::Evaluator;
use crate::error::EvaluationError;
use crate::rpc::message::{EvaluationReply, EvaluationRequest};
use crate::rpc::worker::evaluate_request;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates a batch of requests.
///
/// Returns exactly one outcome per request, in batch order. A call returns
/// only once every outcome is known, which makes it the generation barrier.
pub trait Assessor: Send + Sync {
    /// Evaluates `batch`.
    fn assess(&self, batch: Vec<EvaluationRequest>) -> Vec<Result<EvaluationReply, EvaluationError>>;
}

/// In-process backend that runs the evaluator directly.
///
/// Shares the request-handling code with [`WorkerClient`](crate::rpc::WorkerClient),
/// so a local run and a distributed run see the same replies.
pub struct LocalAssessor<E: Evaluator> {
    evaluator: Arc<E>,
    data: Arc<E::Data>,
    parallel: bool,
}

impl<E: Evaluator> LocalAssessor<E> {
    /// Creates a sequential backend.
    pub fn new(evaluator: E, data: E::Data) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            data: Arc::new(data),
            parallel: false,
        }
    }

    /// Evaluates batches on the rayon thread pool (requires the `parallel`
    /// feature; ignored otherwise).
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn assess_one(&self, request: &EvaluationRequest) -> Result<EvaluationReply, EvaluationError> {
        evaluate_request(&*self.evaluator, &self.data, request).into_outcome(request)
    }
}

impl<E: Evaluator> Assessor for LocalAssessor<E> {
    fn assess(&self, batch: Vec<EvaluationRequest>) -> Vec<Result<EvaluationReply, EvaluationError>> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                return batch.par_iter().map(|r| self.assess_one(r)).collect();
            }
        }
        batch.iter().map(|r| self.assess_one(r)).collect()
    }
}
