//! Broker abstraction.
//!
//! The coordinator talks to the broker through a [`RequestLink`]; workers
//! through a [`WorkLink`]. Both in-memory and NATS brokers implement them.

use crate::error::GentunError;
use async_trait::async_trait;
use std::sync::Arc;

/// A request as delivered to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Correlation id chosen by the coordinator.
    pub correlation_id: String,
    /// Address the reply must be sent to.
    pub reply_to: String,
    /// Encoded request.
    pub body: Vec<u8>,
}

/// A reply as delivered to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Correlation id copied from the request, if the worker kept it.
    pub correlation_id: Option<String>,
    /// Encoded reply.
    pub body: Vec<u8>,
}

/// Coordinator side: publish requests, receive replies on a private inbox.
#[async_trait]
pub trait RequestLink: Send + Sync {
    /// Address of this link's reply inbox.
    fn reply_to(&self) -> &str;

    /// Publishes one request to the shared work queue.
    async fn publish(&self, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError>;

    /// Waits for the next reply. `Ok(None)` means the inbox was closed.
    async fn next_reply(&mut self) -> Result<Option<Delivered>, GentunError>;
}

/// Worker side: take requests one at a time, reply, acknowledge.
///
/// A request is redelivered to another worker if it is never acknowledged,
/// so [`ack`](WorkLink::ack) must only be called after the reply was sent.
#[async_trait]
pub trait WorkLink: Send + Sync {
    /// Handle used to acknowledge a delivered request.
    type Ticket: Send;

    /// Waits for the next request. `Ok(None)` means the queue was closed.
    async fn next_request(&mut self) -> Result<Option<(Envelope, Self::Ticket)>, GentunError>;

    /// Sends a reply to `reply_to`.
    async fn reply(&self, reply_to: &str, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError>;

    /// Acknowledges a delivered request.
    async fn ack(&self, ticket: Self::Ticket) -> Result<(), GentunError>;

    /// Hands a delivered request back to the queue unanswered, so any
    /// worker may take it again.
    async fn reject(&self, ticket: Self::Ticket) -> Result<(), GentunError>;

    /// Liveness signal shared with the heartbeat task.
    fn pulse(&self) -> Arc<dyn Pulse>;
}

/// Liveness signal sent while a worker is busy evaluating.
#[async_trait]
pub trait Pulse: Send + Sync {
    /// Sends one heartbeat for `worker`.
    async fn beat(&self, worker: &str) -> Result<(), GentunError>;
}
