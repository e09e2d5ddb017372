//! Coordinator side: publish a batch, collect replies by correlation id.

use super::codec;
use super::config::DispatchConfig;
use super::message::{EvaluationReply, EvaluationRequest};
use super::transport::{Delivered, RequestLink};
use crate::error::{EvaluationError, GentunError};
use crate::population::Assessor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Publishes batches of requests and waits for every reply.
///
/// Each request gets a fresh correlation id per attempt. Replies may arrive
/// in any order and are matched back to their request by that id; replies
/// with unknown ids (earlier generations, requests already settled) are
/// discarded. Requests still unanswered after the reply timeout are
/// published again until `max_attempts` is reached. While a request is
/// unsettled, a late reply to any of its earlier attempts still counts; once
/// it settles, all of its ids are dropped.
///
/// Only one batch is in flight per dispatcher: the link is held for the
/// whole batch.
pub struct Dispatcher<L: RequestLink> {
    link: Mutex<L>,
    config: DispatchConfig,
}

struct Batch<'a> {
    requests: &'a [EvaluationRequest],
    outcomes: Vec<Option<Result<EvaluationReply, EvaluationError>>>,
    attempts: Vec<u32>,
    correlation: HashMap<String, usize>,
    open: usize,
}

impl Batch<'_> {
    /// Records the outcome of a request and forgets every correlation id
    /// issued for it; later replies to any of its attempts are unknown.
    fn settle(&mut self, index: usize, outcome: Result<EvaluationReply, EvaluationError>) {
        if self.outcomes[index].is_none() {
            self.outcomes[index] = Some(outcome);
            self.open -= 1;
        }
        self.correlation.retain(|_, pending| *pending != index);
    }

    fn unsettled(&self) -> Vec<usize> {
        (0..self.outcomes.len()).filter(|&i| self.outcomes[i].is_none()).collect()
    }

    fn transport_failure(&self, index: usize, reason: String) -> Result<EvaluationReply, EvaluationError> {
        let request = &self.requests[index];
        Err(EvaluationError::Transport {
            id: request.id,
            generation: request.generation,
            reason,
        })
    }
}

impl<L: RequestLink> Dispatcher<L> {
    /// Creates a dispatcher over `link`.
    pub fn new(link: L, config: DispatchConfig) -> Result<Self, GentunError> {
        config.validate().map_err(GentunError::Configuration)?;
        Ok(Self {
            link: Mutex::new(link),
            config,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Evaluates `requests`, returning one outcome per request in the same
    /// order.
    pub async fn dispatch(&self, requests: &[EvaluationRequest]) -> Vec<Result<EvaluationReply, EvaluationError>> {
        let mut link = self.link.lock().await;
        let mut batch = Batch {
            requests,
            outcomes: (0..requests.len()).map(|_| None).collect(),
            attempts: vec![0; requests.len()],
            correlation: HashMap::new(),
            open: requests.len(),
        };

        let mut bodies = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match codec::encode_request(request, self.config.wire_format) {
                Ok(body) => bodies.push(Some(body)),
                Err(e) => {
                    bodies.push(None);
                    batch.settle(
                        index,
                        Err(EvaluationError::Serialization {
                            id: request.id,
                            generation: request.generation,
                            reason: e.to_string(),
                        }),
                    );
                }
            }
        }

        for index in batch.unsettled() {
            self.publish(&*link, &mut batch, &bodies, index).await;
        }
        info!(
            count = requests.len(),
            reply_to = link.reply_to(),
            "published evaluation requests"
        );

        while batch.open > 0 {
            let deadline = self.config.reply_timeout.map(|t| Instant::now() + t);
            let closed = self.collect(&mut *link, &mut batch, deadline).await;
            if batch.open == 0 {
                break;
            }

            for index in batch.unsettled() {
                let request = &requests[index];
                if let Some(reason) = &closed {
                    let failure = batch.transport_failure(index, reason.clone());
                    batch.settle(index, failure);
                } else if batch.attempts[index] < self.config.max_attempts {
                    warn!(
                        candidate = request.id,
                        generation = request.generation,
                        attempt = batch.attempts[index],
                        "no reply before timeout, publishing again"
                    );
                    self.publish(&*link, &mut batch, &bodies, index).await;
                } else {
                    warn!(
                        candidate = request.id,
                        generation = request.generation,
                        attempts = batch.attempts[index],
                        "giving up on candidate"
                    );
                    let attempts = batch.attempts[index];
                    batch.settle(
                        index,
                        Err(EvaluationError::TimedOut {
                            id: request.id,
                            generation: request.generation,
                            attempts,
                        }),
                    );
                }
            }
        }

        batch
            .outcomes
            .into_iter()
            .zip(requests)
            .map(|(outcome, request)| {
                outcome.unwrap_or(Err(EvaluationError::TimedOut {
                    id: request.id,
                    generation: request.generation,
                    attempts: 0,
                }))
            })
            .collect()
    }

    async fn publish(&self, link: &L, batch: &mut Batch<'_>, bodies: &[Option<Vec<u8>>], index: usize) {
        let Some(body) = bodies[index].clone() else {
            return;
        };
        let correlation_id = Uuid::new_v4().to_string();
        batch.attempts[index] += 1;
        match link.publish(&correlation_id, body).await {
            Ok(()) => {
                debug!(candidate = batch.requests[index].id, %correlation_id, "published");
                batch.correlation.insert(correlation_id, index);
            }
            Err(e) => {
                let failure = batch.transport_failure(index, e.to_string());
                batch.settle(index, failure);
            }
        }
    }

    /// Receives replies until the batch is settled or the deadline passes.
    ///
    /// Returns the reason if the reply inbox stopped working.
    async fn collect(&self, link: &mut L, batch: &mut Batch<'_>, deadline: Option<Instant>) -> Option<String> {
        while batch.open > 0 {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, link.next_reply()).await {
                    Ok(next) => next,
                    Err(_) => return None,
                },
                None => link.next_reply().await,
            };
            match next {
                Ok(Some(delivered)) => self.accept(batch, delivered),
                Ok(None) => return Some("reply inbox closed".into()),
                Err(e) => return Some(e.to_string()),
            }
        }
        None
    }

    fn accept(&self, batch: &mut Batch<'_>, delivered: Delivered) {
        let Some(correlation_id) = delivered.correlation_id else {
            warn!("discarding reply without correlation id");
            return;
        };
        let Some(&index) = batch.correlation.get(&correlation_id) else {
            debug!(%correlation_id, "discarding reply with unknown or settled correlation id");
            return;
        };

        let request = &batch.requests[index];
        let outcome = match codec::decode_reply(&delivered.body) {
            Ok(reply) => match reply.id() {
                Some(id) if id != request.id => Err(EvaluationError::Serialization {
                    id: request.id,
                    generation: request.generation,
                    reason: format!("reply names candidate {id}"),
                }),
                _ => reply.into_outcome(request),
            },
            Err(e) => Err(EvaluationError::Serialization {
                id: request.id,
                generation: request.generation,
                reason: e.to_string(),
            }),
        };
        debug!(candidate = request.id, ok = outcome.is_ok(), "reply received");
        batch.settle(index, outcome);
    }
}

/// [`Assessor`] that evaluates on remote workers.
///
/// Owns (a handle to) the async runtime and blocks the calling thread for
/// each batch, so the synchronous drivers can use it directly. Must not be
/// called from inside that runtime.
pub struct DistributedAssessor<L: RequestLink> {
    runtime: Arc<Runtime>,
    dispatcher: Dispatcher<L>,
}

impl<L: RequestLink> DistributedAssessor<L> {
    /// Creates an assessor over `link`, driven by `runtime`.
    pub fn new(runtime: Arc<Runtime>, link: L, config: DispatchConfig) -> Result<Self, GentunError> {
        Ok(Self {
            runtime,
            dispatcher: Dispatcher::new(link, config)?,
        })
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<L> {
        &self.dispatcher
    }
}

#[cfg(feature = "nats")]
impl DistributedAssessor<super::nats::NatsRequestLink> {
    /// Starts a runtime and connects to the NATS broker.
    pub fn connect(broker: &super::config::BrokerConfig, config: DispatchConfig) -> Result<Self, GentunError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| GentunError::Transport(format!("failed to start runtime: {e}")))?;
        let link = runtime.block_on(super::nats::NatsRequestLink::connect(broker))?;
        Self::new(Arc::new(runtime), link, config)
    }
}

impl<L: RequestLink> Assessor for DistributedAssessor<L> {
    fn assess(&self, batch: Vec<EvaluationRequest>) -> Vec<Result<EvaluationReply, EvaluationError>> {
        self.runtime.block_on(self.dispatcher.dispatch(&batch))
    }
}
