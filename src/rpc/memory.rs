//! In-process broker.
//!
//! Same delivery semantics as the NATS work queue: every request goes to
//! exactly one worker, a worker pulls one request at a time and acknowledges
//! it after replying, replies are routed to the publisher's private inbox.
//! Used by tests and single-machine runs.

use super::transport::{Delivered, Envelope, Pulse, RequestLink, WorkLink};
use crate::error::GentunError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

struct Shared {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    queue: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    inboxes: Mutex<HashMap<String, mpsc::UnboundedSender<Delivered>>>,
    heartbeats: Mutex<HashMap<String, u64>>,
    unacked: Mutex<HashMap<String, usize>>,
    peak_unacked: Mutex<HashMap<String, usize>>,
    published: AtomicU64,
}

/// Broker living in the current process.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(sender)),
                queue: tokio::sync::Mutex::new(receiver),
                inboxes: Mutex::new(HashMap::new()),
                heartbeats: Mutex::new(HashMap::new()),
                unacked: Mutex::new(HashMap::new()),
                peak_unacked: Mutex::new(HashMap::new()),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Opens a coordinator link with its own reply inbox.
    pub fn request_link(&self) -> MemoryRequestLink {
        let inbox = format!("reply.{}", Uuid::new_v4());
        let (sender, replies) = mpsc::unbounded_channel();
        self.shared.inboxes.lock().insert(inbox.clone(), sender);
        MemoryRequestLink {
            shared: Arc::clone(&self.shared),
            inbox,
            replies,
        }
    }

    /// Opens a worker link that holds at most one request at a time.
    pub fn work_link(&self, worker: impl Into<String>) -> MemoryWorkLink {
        self.work_link_with_prefetch(worker, 1)
    }

    /// Opens a worker link with an explicit prefetch window.
    pub fn work_link_with_prefetch(&self, worker: impl Into<String>, prefetch: usize) -> MemoryWorkLink {
        MemoryWorkLink {
            shared: Arc::clone(&self.shared),
            worker: worker.into(),
            prefetch: prefetch.max(1),
        }
    }

    /// Stops accepting requests. Workers drain what is queued and then see
    /// the queue as closed.
    pub fn close(&self) {
        self.shared.sender.lock().take();
    }

    /// Heartbeats received from `worker`.
    pub fn heartbeats(&self, worker: &str) -> u64 {
        self.shared.heartbeats.lock().get(worker).copied().unwrap_or(0)
    }

    /// Requests delivered to `worker` and not yet acknowledged.
    pub fn unacked(&self, worker: &str) -> usize {
        self.shared.unacked.lock().get(worker).copied().unwrap_or(0)
    }

    /// Largest number of requests `worker` ever held unacknowledged.
    pub fn peak_unacked(&self, worker: &str) -> usize {
        self.shared.peak_unacked.lock().get(worker).copied().unwrap_or(0)
    }

    /// Requests published so far.
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }
}

/// Coordinator side of a [`MemoryBroker`].
pub struct MemoryRequestLink {
    shared: Arc<Shared>,
    inbox: String,
    replies: mpsc::UnboundedReceiver<Delivered>,
}

impl Drop for MemoryRequestLink {
    fn drop(&mut self) {
        self.shared.inboxes.lock().remove(&self.inbox);
    }
}

#[async_trait]
impl RequestLink for MemoryRequestLink {
    fn reply_to(&self) -> &str {
        &self.inbox
    }

    async fn publish(&self, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError> {
        let sender = self
            .shared
            .sender
            .lock()
            .clone()
            .ok_or_else(|| GentunError::Transport("broker is closed".into()))?;
        sender
            .send(Envelope {
                correlation_id: correlation_id.to_string(),
                reply_to: self.inbox.clone(),
                body,
            })
            .map_err(|_| GentunError::Transport("broker queue is gone".into()))?;
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<Option<Delivered>, GentunError> {
        Ok(self.replies.recv().await)
    }
}

/// Acknowledgement handle of a [`MemoryWorkLink`] delivery.
#[derive(Debug)]
pub struct MemoryTicket {
    envelope: Envelope,
}

/// Worker side of a [`MemoryBroker`].
pub struct MemoryWorkLink {
    shared: Arc<Shared>,
    worker: String,
    prefetch: usize,
}

impl MemoryWorkLink {
    fn release(&self) {
        let mut unacked = self.shared.unacked.lock();
        if let Some(held) = unacked.get_mut(&self.worker) {
            *held = held.saturating_sub(1);
        }
    }
}

#[async_trait]
impl WorkLink for MemoryWorkLink {
    type Ticket = MemoryTicket;

    async fn next_request(&mut self) -> Result<Option<(Envelope, MemoryTicket)>, GentunError> {
        let held = self.shared.unacked.lock().get(&self.worker).copied().unwrap_or(0);
        if held >= self.prefetch {
            return Err(GentunError::Transport(format!(
                "worker {} already holds {held} unacknowledged request(s)",
                self.worker
            )));
        }

        let envelope = {
            let mut queue = self.shared.queue.lock().await;
            queue.recv().await
        };
        let Some(envelope) = envelope else {
            return Ok(None);
        };

        let held = {
            let mut unacked = self.shared.unacked.lock();
            let held = unacked.entry(self.worker.clone()).or_insert(0);
            *held += 1;
            *held
        };
        let mut peak = self.shared.peak_unacked.lock();
        let peak = peak.entry(self.worker.clone()).or_insert(0);
        *peak = (*peak).max(held);

        let ticket = MemoryTicket {
            envelope: envelope.clone(),
        };
        Ok(Some((envelope, ticket)))
    }

    async fn reply(&self, reply_to: &str, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError> {
        let inbox = self.shared.inboxes.lock().get(reply_to).cloned();
        let delivered = Delivered {
            correlation_id: Some(correlation_id.to_string()),
            body,
        };
        match inbox {
            Some(inbox) if inbox.send(delivered).is_ok() => {}
            _ => warn!(worker = %self.worker, reply_to, "reply inbox is gone, dropping reply"),
        }
        Ok(())
    }

    async fn ack(&self, ticket: MemoryTicket) -> Result<(), GentunError> {
        self.release();
        debug!(worker = %self.worker, correlation_id = %ticket.envelope.correlation_id, "acknowledged");
        Ok(())
    }

    async fn reject(&self, ticket: MemoryTicket) -> Result<(), GentunError> {
        self.release();
        let correlation_id = ticket.envelope.correlation_id.clone();
        let sender = self.shared.sender.lock().clone();
        match sender {
            Some(sender) if sender.send(ticket.envelope).is_ok() => {
                debug!(worker = %self.worker, %correlation_id, "request returned to queue")
            }
            _ => warn!(worker = %self.worker, %correlation_id, "broker is closed, dropping rejected request"),
        }
        Ok(())
    }

    fn pulse(&self) -> Arc<dyn Pulse> {
        Arc::new(MemoryPulse {
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MemoryPulse {
    shared: Arc<Shared>,
}

#[async_trait]
impl Pulse for MemoryPulse {
    async fn beat(&self, worker: &str) -> Result<(), GentunError> {
        *self.shared.heartbeats.lock().entry(worker.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reaches_one_worker_and_reply_returns() {
        let broker = MemoryBroker::new();
        let mut link = broker.request_link();
        let mut worker = broker.work_link("w1");

        link.publish("c-1", b"ping".to_vec()).await.unwrap();
        let (envelope, ticket) = worker.next_request().await.unwrap().unwrap();
        assert_eq!(envelope.body, b"ping");
        assert_eq!(envelope.reply_to, link.reply_to());
        assert_eq!(broker.unacked("w1"), 1);

        worker
            .reply(&envelope.reply_to, &envelope.correlation_id, b"pong".to_vec())
            .await
            .unwrap();
        worker.ack(ticket).await.unwrap();
        assert_eq!(broker.unacked("w1"), 0);

        let delivered = link.next_reply().await.unwrap().unwrap();
        assert_eq!(delivered.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(delivered.body, b"pong");
    }

    #[tokio::test]
    async fn test_prefetch_window_is_enforced() {
        let broker = MemoryBroker::new();
        let link = broker.request_link();
        let mut worker = broker.work_link("w1");
        link.publish("a", vec![1]).await.unwrap();
        link.publish("b", vec![2]).await.unwrap();

        let (_, ticket) = worker.next_request().await.unwrap().unwrap();
        assert!(worker.next_request().await.is_err());
        worker.ack(ticket).await.unwrap();
        assert!(worker.next_request().await.unwrap().is_some());
        assert_eq!(broker.peak_unacked("w1"), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let broker = MemoryBroker::new();
        let link = broker.request_link();
        let mut worker = broker.work_link("w1");
        link.publish("a", vec![1]).await.unwrap();
        broker.close();
        assert!(link.publish("b", vec![2]).await.is_err());

        let (_, ticket) = worker.next_request().await.unwrap().unwrap();
        worker.ack(ticket).await.unwrap();
        assert!(worker.next_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_request_is_delivered_again() {
        let broker = MemoryBroker::new();
        let link = broker.request_link();
        let mut first = broker.work_link("w1");
        let mut second = broker.work_link("w2");
        link.publish("c-1", b"job".to_vec()).await.unwrap();

        let (_, ticket) = first.next_request().await.unwrap().unwrap();
        first.reject(ticket).await.unwrap();
        assert_eq!(broker.unacked("w1"), 0);

        let (envelope, ticket) = second.next_request().await.unwrap().unwrap();
        assert_eq!(envelope.correlation_id, "c-1");
        assert_eq!(envelope.body, b"job");
        second.ack(ticket).await.unwrap();
        assert_eq!(broker.published(), 1);
    }

    #[tokio::test]
    async fn test_reply_to_unknown_inbox_is_dropped() {
        let broker = MemoryBroker::new();
        let worker = broker.work_link("w1");
        assert!(worker.reply("reply.missing", "c", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn test_pulse_counts_heartbeats() {
        let broker = MemoryBroker::new();
        let pulse = broker.work_link("w1").pulse();
        pulse.beat("w1").await.unwrap();
        pulse.beat("w1").await.unwrap();
        assert_eq!(broker.heartbeats("w1"), 2);
        assert_eq!(broker.heartbeats("w2"), 0);
    }
}
