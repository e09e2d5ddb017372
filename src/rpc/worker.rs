//! Worker side: consume requests, evaluate, reply, acknowledge.

use super::codec::{self, RequestDefaults, WireFormat};
use super::config::WorkerConfig;
use super::message::{EvaluationReply, EvaluationRequest, Mode, SwarmReply};
use super::transport::{Pulse, WorkLink};
use crate::error::GentunError;
use crate::genome::Genes;
use crate::population::{is_better, Evaluator, FitnessReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Computes the reply to one request.
///
/// Genetic requests are scored as-is. Swarm requests are scored at
/// `new_location` (or the current location when there is none); the
/// memory moves to the scored location when it improves on the
/// remembered fitness. Evaluator errors and non-finite fitness values
/// become [`EvaluationReply::Failed`].
pub fn evaluate_request<E: Evaluator>(evaluator: &E, data: &E::Data, request: &EvaluationRequest) -> EvaluationReply {
    let failed = |e: anyhow::Error| EvaluationReply::Failed {
        id: Some(request.id),
        reason: format!("{e:#}"),
    };
    let score = |genes: &Genes| -> anyhow::Result<FitnessReport> {
        let report = evaluator.evaluate(genes, &request.additional_parameters, data)?;
        anyhow::ensure!(report.fitness.is_finite(), "non-finite fitness {}", report.fitness);
        Ok(report)
    };

    match request.mode {
        Mode::Genetic => match score(&request.genes) {
            Ok(report) => EvaluationReply::Genetic {
                id: request.id,
                fitness: report.fitness,
            },
            Err(e) => failed(e),
        },
        Mode::Swarm => {
            let location = request.new_location.as_ref().unwrap_or(&request.genes);
            let started = Instant::now();
            let report = match score(location) {
                Ok(report) => report,
                Err(e) => return failed(e),
            };
            let training_time = started.elapsed().as_secs_f64();

            let (memory, best_fitness) = match (&request.memory, request.best_fitness) {
                (Some(memory), Some(best)) if !is_better(report.fitness, best, request.maximize) => {
                    (memory.clone(), best)
                }
                _ => (location.clone(), report.fitness),
            };
            EvaluationReply::Swarm(SwarmReply {
                id: request.id,
                last_location: request.genes.clone(),
                fitness: report.fitness,
                memory,
                best_fitness,
                location: location.clone(),
                training_time,
                loss: report.metrics.loss,
                mae: report.metrics.mae,
                mse: report.metrics.mse,
                msle: report.metrics.msle,
            })
        }
    }
}

/// What a worker did before its queue closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Requests answered with a fitness.
    pub served: u64,
    /// Requests answered with an evaluation failure.
    pub failed: u64,
    /// Requests that could not be decoded.
    pub malformed: u64,
    /// Requests whose reply could not be sent; left for redelivery.
    pub unanswered: u64,
}

/// Consumes evaluation requests from a [`WorkLink`] until it closes.
///
/// Requests are taken one at a time. The evaluator runs on the blocking
/// thread pool while a background task keeps sending heartbeats, so a long
/// evaluation does not make the worker look dead. A request is
/// acknowledged only after its reply has been sent.
pub struct WorkerClient<E: Evaluator, L: WorkLink> {
    id: String,
    evaluator: Arc<E>,
    data: Arc<E::Data>,
    link: L,
    config: WorkerConfig,
}

impl<E: Evaluator, L: WorkLink> WorkerClient<E, L> {
    /// Creates a worker. The training data is shared with every evaluation.
    pub fn new(evaluator: E, data: Arc<E::Data>, link: L, config: WorkerConfig) -> Result<Self, GentunError> {
        config.validate().map_err(GentunError::Configuration)?;
        let id = config
            .name
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
        Ok(Self {
            id,
            evaluator: Arc::new(evaluator),
            data,
            link,
            config,
        })
    }

    /// Worker name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Serves requests until the link closes.
    pub async fn work(mut self) -> Result<WorkerStats, GentunError> {
        let heartbeat = spawn_heartbeat(self.link.pulse(), self.id.clone(), self.config.heartbeat_interval);
        let outcome = self.consume().await;
        heartbeat.abort();
        outcome
    }

    async fn consume(&mut self) -> Result<WorkerStats, GentunError> {
        let defaults = RequestDefaults {
            mode: self.config.mode,
            maximize: self.config.maximize,
        };
        let mut stats = WorkerStats::default();
        info!(worker = %self.id, "waiting for requests");

        while let Some((envelope, ticket)) = self.link.next_request().await? {
            let (reply, format) = match codec::decode_request(&envelope.body, &defaults) {
                Ok((request, format)) => {
                    let reply = self.evaluate(request).await;
                    match reply {
                        EvaluationReply::Failed { .. } => stats.failed += 1,
                        _ => stats.served += 1,
                    }
                    (reply, format)
                }
                Err(e) => {
                    warn!(worker = %self.id, correlation_id = %envelope.correlation_id, error = %e, "malformed request");
                    stats.malformed += 1;
                    let reply = EvaluationReply::Failed {
                        id: None,
                        reason: e.to_string(),
                    };
                    (reply, WireFormat::Tagged)
                }
            };

            match codec::encode_reply(&reply, format) {
                Ok(body) => {
                    if let Err(e) = self
                        .link
                        .reply(&envelope.reply_to, &envelope.correlation_id, body)
                        .await
                    {
                        warn!(worker = %self.id, correlation_id = %envelope.correlation_id, error = %e, "could not send reply, returning request to queue");
                        stats.unanswered += 1;
                        if let Err(e) = self.link.reject(ticket).await {
                            // Still unacknowledged; the broker redelivers it after the ack wait.
                            warn!(worker = %self.id, error = %e, "could not return request to queue");
                        }
                        continue;
                    }
                }
                Err(e) => warn!(worker = %self.id, error = %e, "could not encode reply"),
            }
            self.link.ack(ticket).await?;
        }

        info!(
            worker = %self.id,
            served = stats.served,
            failed = stats.failed,
            malformed = stats.malformed,
            unanswered = stats.unanswered,
            "request queue closed"
        );
        Ok(stats)
    }

    async fn evaluate(&self, request: EvaluationRequest) -> EvaluationReply {
        let id = request.id;
        info!(worker = %self.id, candidate = id, generation = request.generation, mode = ?request.mode, "evaluating");
        let started = Instant::now();

        let evaluator = Arc::clone(&self.evaluator);
        let data = Arc::clone(&self.data);
        let reply = tokio::task::spawn_blocking(move || evaluate_request(&*evaluator, &data, &request))
            .await
            .unwrap_or_else(|e| EvaluationReply::Failed {
                id: Some(id),
                reason: format!("evaluator panicked: {e}"),
            });

        match &reply {
            EvaluationReply::Failed { reason, .. } => {
                warn!(worker = %self.id, candidate = id, reason = %reason, "evaluation failed")
            }
            _ => debug!(worker = %self.id, candidate = id, elapsed = ?started.elapsed(), "evaluation finished"),
        }
        reply
    }
}

fn spawn_heartbeat(pulse: Arc<dyn Pulse>, worker: String, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = pulse.beat(&worker).await {
                warn!(worker = %worker, error = %e, "heartbeat failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Parameters;
    use crate::testing::NanAtZero;
    use crate::rpc::{MemoryBroker, RequestLink};
    use crate::testing::{value_genes, ReadValue};

    /// Reads the value gene after sleeping, to keep a worker busy.
    struct Slow(Duration);

    impl Evaluator for Slow {
        type Data = ();

        fn evaluate(&self, genes: &Genes, params: &Parameters, data: &()) -> anyhow::Result<FitnessReport> {
            std::thread::sleep(self.0);
            ReadValue.evaluate(genes, params, data)
        }
    }

    fn swarm_request(location: f64, memory: f64, best: Option<f64>, dest: Option<f64>) -> EvaluationRequest {
        EvaluationRequest::swarm(0, value_genes(location)).with_swarm_state(
            best,
            None,
            best,
            Some(value_genes(memory)),
            dest.map(value_genes),
        )
    }

    #[test]
    fn test_genetic_request_scores_genes() {
        let reply = evaluate_request(&ReadValue, &(), &EvaluationRequest::genetic(3, value_genes(0.4)));
        assert_eq!(reply, EvaluationReply::Genetic { id: 3, fitness: 0.4 });
    }

    #[test]
    fn test_swarm_improvement_moves_memory() {
        let reply = evaluate_request(&ReadValue, &(), &swarm_request(0.2, 0.2, Some(0.2), Some(0.7)));
        let EvaluationReply::Swarm(state) = reply else {
            panic!("expected swarm reply");
        };
        assert_eq!(state.location, value_genes(0.7));
        assert_eq!(state.last_location, value_genes(0.2));
        assert_eq!(state.memory, value_genes(0.7));
        assert_eq!(state.best_fitness, 0.7);
    }

    #[test]
    fn test_swarm_worse_move_keeps_memory() {
        let reply = evaluate_request(&ReadValue, &(), &swarm_request(0.5, 0.5, Some(0.5), Some(0.1)));
        let EvaluationReply::Swarm(state) = reply else {
            panic!("expected swarm reply");
        };
        assert_eq!(state.fitness, 0.1);
        assert_eq!(state.memory, value_genes(0.5));
        assert_eq!(state.best_fitness, 0.5);
        assert_eq!(state.location, value_genes(0.1));
    }

    #[test]
    fn test_swarm_minimizing_direction() {
        let mut request = swarm_request(0.5, 0.5, Some(0.5), Some(0.1));
        request.maximize = false;
        let EvaluationReply::Swarm(state) = evaluate_request(&ReadValue, &(), &request) else {
            panic!("expected swarm reply");
        };
        assert_eq!(state.memory, value_genes(0.1));
    }

    #[test]
    fn test_first_swarm_evaluation_sets_memory() {
        let reply = evaluate_request(&ReadValue, &(), &swarm_request(0.3, 0.3, None, None));
        let EvaluationReply::Swarm(state) = reply else {
            panic!("expected swarm reply");
        };
        assert_eq!(state.best_fitness, 0.3);
        assert_eq!(state.location, value_genes(0.3));
    }

    #[test]
    fn test_evaluator_error_becomes_failed_reply() {
        let reply = evaluate_request(&ReadValue, &(), &EvaluationRequest::genetic(2, value_genes(-1.0)));
        match reply {
            EvaluationReply::Failed { id, reason } => {
                assert_eq!(id, Some(2));
                assert!(reason.contains("negative value"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_fitness_becomes_failed_reply() {
        let reply = evaluate_request(&NanAtZero, &(), &EvaluationRequest::genetic(5, value_genes(0.0)));
        match reply {
            EvaluationReply::Failed { id, reason } => {
                assert_eq!(id, Some(5));
                assert!(reason.contains("non-finite"), "unexpected reason {reason}");
            }
            other => panic!("unexpected {other:?}"),
        }

        let swarm = EvaluationRequest::swarm(6, value_genes(0.4)).with_swarm_state(None, None, None, None, Some(value_genes(0.0)));
        assert!(matches!(
            evaluate_request(&NanAtZero, &(), &swarm),
            EvaluationReply::Failed { id: Some(6), .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_replies_then_acks() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let worker = WorkerClient::new(
            ReadValue,
            Arc::new(()),
            broker.work_link("w1"),
            WorkerConfig::default().with_name("w1"),
        )
        .unwrap();
        let handle = tokio::spawn(worker.work());

        let body = codec::encode_request(&EvaluationRequest::genetic(1, value_genes(0.6)), WireFormat::Tagged).unwrap();
        link.publish("c-1", body).await.unwrap();
        link.publish("c-2", b"{not json".to_vec()).await.unwrap();

        let first = link.next_reply().await.unwrap().unwrap();
        assert_eq!(first.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(
            codec::decode_reply(&first.body).unwrap(),
            EvaluationReply::Genetic { id: 1, fitness: 0.6 }
        );
        let second = link.next_reply().await.unwrap().unwrap();
        assert!(matches!(
            codec::decode_reply(&second.body).unwrap(),
            EvaluationReply::Failed { id: None, .. }
        ));

        broker.close();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(
            stats,
            WorkerStats {
                served: 1,
                malformed: 1,
                ..WorkerStats::default()
            }
        );
        assert_eq!(broker.unacked("w1"), 0);
    }

    /// Memory work link whose first `failures` replies fail to send.
    struct LossyReplies {
        inner: crate::rpc::MemoryWorkLink,
        failures: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl WorkLink for LossyReplies {
        type Ticket = crate::rpc::MemoryTicket;

        async fn next_request(&mut self) -> Result<Option<(crate::rpc::Envelope, Self::Ticket)>, GentunError> {
            self.inner.next_request().await
        }

        async fn reply(&self, reply_to: &str, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError> {
            use std::sync::atomic::Ordering;
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(GentunError::Transport("connection reset".into()));
            }
            self.inner.reply(reply_to, correlation_id, body).await
        }

        async fn ack(&self, ticket: Self::Ticket) -> Result<(), GentunError> {
            self.inner.ack(ticket).await
        }

        async fn reject(&self, ticket: Self::Ticket) -> Result<(), GentunError> {
            self.inner.reject(ticket).await
        }

        fn pulse(&self) -> Arc<dyn Pulse> {
            self.inner.pulse()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_reply_keeps_worker_alive_and_requeues() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let lossy = LossyReplies {
            inner: broker.work_link("w1"),
            failures: 1.into(),
        };
        let worker = WorkerClient::new(ReadValue, Arc::new(()), lossy, WorkerConfig::default().with_name("w1")).unwrap();
        let handle = tokio::spawn(worker.work());

        let body = codec::encode_request(&EvaluationRequest::genetic(2, value_genes(0.8)), WireFormat::Tagged).unwrap();
        link.publish("c-1", body).await.unwrap();

        let reply = link.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(
            codec::decode_reply(&reply.body).unwrap(),
            EvaluationReply::Genetic { id: 2, fitness: 0.8 }
        );

        broker.close();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.unanswered, 1);
        assert_eq!(stats.served, 2);
        assert_eq!(broker.unacked("w1"), 0);
        assert_eq!(broker.published(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_positional_request_gets_positional_reply() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let worker = WorkerClient::new(ReadValue, Arc::new(()), broker.work_link("w1"), WorkerConfig::default()).unwrap();
        let handle = tokio::spawn(worker.work());

        let body = codec::encode_request(&EvaluationRequest::genetic(4, value_genes(0.25)), WireFormat::Positional).unwrap();
        link.publish("c", body).await.unwrap();
        let reply = link.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.body, b"[4,0.25]");

        broker.close();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heartbeats_continue_during_long_evaluation() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let config = WorkerConfig::default()
            .with_name("busy")
            .with_heartbeat_interval(Duration::from_millis(20));
        let worker = WorkerClient::new(Slow(Duration::from_millis(200)), Arc::new(()), broker.work_link("busy"), config).unwrap();
        let handle = tokio::spawn(worker.work());

        let body = codec::encode_request(&EvaluationRequest::genetic(0, value_genes(0.5)), WireFormat::Tagged).unwrap();
        link.publish("c", body).await.unwrap();
        link.next_reply().await.unwrap().unwrap();
        assert!(
            broker.heartbeats("busy") >= 3,
            "expected heartbeats while busy, got {}",
            broker.heartbeats("busy")
        );

        broker.close();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_workers_share_queue_one_request_at_a_time() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let mut handles = Vec::new();
        for name in ["a", "b"] {
            let worker = WorkerClient::new(
                Slow(Duration::from_millis(30)),
                Arc::new(()),
                broker.work_link(name),
                WorkerConfig::default().with_name(name),
            )
            .unwrap();
            handles.push(tokio::spawn(worker.work()));
        }

        for i in 0..10 {
            let body = codec::encode_request(&EvaluationRequest::genetic(i, value_genes(0.1)), WireFormat::Tagged).unwrap();
            link.publish(&format!("c-{i}"), body).await.unwrap();
        }
        for _ in 0..10 {
            link.next_reply().await.unwrap().unwrap();
        }
        broker.close();

        let mut total = 0;
        for handle in handles {
            let stats = handle.await.unwrap().unwrap();
            assert!(stats.served > 0, "a worker was starved");
            total += stats.served;
        }
        assert_eq!(total, 10);
        assert_eq!(broker.peak_unacked("a"), 1);
        assert_eq!(broker.peak_unacked("b"), 1);
    }
}
