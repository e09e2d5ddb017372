//! NATS broker.
//!
//! Requests go to a JetStream stream with work-queue retention, so each one
//! is kept until exactly one worker acknowledges it. Workers share a durable
//! pull consumer with explicit acks: a request that is not acknowledged
//! within `ack_wait` (worker crashed, connection lost) is delivered again to
//! some other worker. Each worker pulls a single message and acknowledges it
//! after replying, which keeps its prefetch window at one.
//!
//! Replies and heartbeats use core NATS subjects; every coordinator link
//! subscribes to its own inbox.

use super::config::BrokerConfig;
use super::transport::{Delivered, Envelope, Pulse, RequestLink, WorkLink};
use crate::error::GentunError;
use async_nats::jetstream::{self, consumer, stream};
use async_nats::{Client, ConnectOptions, HeaderMap, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CORRELATION_ID: &str = "Correlation-Id";
const REPLY_TO: &str = "Reply-To";
const FETCH_EXPIRY: Duration = Duration::from_secs(30);

async fn connect(config: &BrokerConfig) -> Result<Client, GentunError> {
    let options = match (&config.user, &config.password) {
        (Some(user), Some(password)) => ConnectOptions::with_user_and_password(user.clone(), password.clone()),
        _ => ConnectOptions::new(),
    };
    let client = options.connect(config.url.as_str()).await.map_err(|e| {
        GentunError::Transport(format!("failed to connect to NATS at {}: {e}", config.url))
    })?;
    info!(url = %config.url, "connected to NATS");
    Ok(client)
}

async fn work_queue(jetstream: &jetstream::Context, config: &BrokerConfig) -> Result<stream::Stream, GentunError> {
    jetstream
        .get_or_create_stream(stream::Config {
            name: config.stream.clone(),
            subjects: vec![config.queue.clone()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .map_err(|e| GentunError::Transport(format!("failed to open stream {}: {e}", config.stream)))
}

fn header(headers: Option<&HeaderMap>, name: &str) -> Option<String> {
    headers?.get(name).map(|value| value.as_str().to_owned())
}

/// Coordinator side of the NATS broker.
pub struct NatsRequestLink {
    jetstream: jetstream::Context,
    queue: String,
    inbox: String,
    replies: Subscriber,
}

impl NatsRequestLink {
    /// Connects, ensures the work-queue stream exists and subscribes to a
    /// fresh reply inbox.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, GentunError> {
        let client = connect(config).await?;
        let jetstream = jetstream::new(client.clone());
        work_queue(&jetstream, config).await?;

        let inbox = client.new_inbox();
        let replies = client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| GentunError::Transport(format!("failed to subscribe to {inbox}: {e}")))?;
        debug!(%inbox, "listening for replies");

        Ok(Self {
            jetstream,
            queue: config.queue.clone(),
            inbox,
            replies,
        })
    }
}

#[async_trait]
impl RequestLink for NatsRequestLink {
    fn reply_to(&self) -> &str {
        &self.inbox
    }

    async fn publish(&self, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError> {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID, correlation_id);
        headers.insert(REPLY_TO, self.inbox.as_str());
        let ack = self
            .jetstream
            .publish_with_headers(self.queue.clone(), headers, body.into())
            .await
            .map_err(|e| GentunError::Transport(format!("failed to publish to {}: {e}", self.queue)))?;
        ack.await
            .map_err(|e| GentunError::Transport(format!("broker did not store request: {e}")))?;
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<Option<Delivered>, GentunError> {
        Ok(self.replies.next().await.map(|message| Delivered {
            correlation_id: header(message.headers.as_ref(), CORRELATION_ID),
            body: message.payload.to_vec(),
        }))
    }
}

/// Worker side of the NATS broker.
pub struct NatsWorkLink {
    client: Client,
    consumer: consumer::Consumer<consumer::pull::Config>,
    broker: Arc<BrokerConfig>,
}

impl NatsWorkLink {
    /// Connects and binds to the shared durable consumer.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, GentunError> {
        let client = connect(config).await?;
        let jetstream = jetstream::new(client.clone());
        let stream = work_queue(&jetstream, config).await?;
        let consumer = stream
            .get_or_create_consumer(
                &config.consumer,
                consumer::pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ack_wait: config.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| GentunError::Transport(format!("failed to open consumer {}: {e}", config.consumer)))?;

        Ok(Self {
            client,
            consumer,
            broker: Arc::new(config.clone()),
        })
    }
}

#[async_trait]
impl WorkLink for NatsWorkLink {
    type Ticket = jetstream::Message;

    async fn next_request(&mut self) -> Result<Option<(Envelope, jetstream::Message)>, GentunError> {
        loop {
            let mut batch = self
                .consumer
                .batch()
                .max_messages(1)
                .expires(FETCH_EXPIRY)
                .messages()
                .await
                .map_err(|e| GentunError::Transport(format!("failed to pull request: {e}")))?;

            while let Some(message) = batch.next().await {
                let message =
                    message.map_err(|e| GentunError::Transport(format!("failed to receive request: {e}")))?;
                let headers = message.headers.as_ref();
                let (Some(correlation_id), Some(reply_to)) =
                    (header(headers, CORRELATION_ID), header(headers, REPLY_TO))
                else {
                    warn!(subject = %message.subject, "request without reply headers, discarding");
                    message
                        .ack()
                        .await
                        .map_err(|e| GentunError::Transport(format!("failed to ack request: {e}")))?;
                    continue;
                };
                let envelope = Envelope {
                    correlation_id,
                    reply_to,
                    body: message.payload.to_vec(),
                };
                return Ok(Some((envelope, message)));
            }
        }
    }

    async fn reply(&self, reply_to: &str, correlation_id: &str, body: Vec<u8>) -> Result<(), GentunError> {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID, correlation_id);
        self.client
            .publish_with_headers(reply_to.to_string(), headers, body.into())
            .await
            .map_err(|e| GentunError::Transport(format!("failed to reply to {reply_to}: {e}")))?;
        self.client
            .flush()
            .await
            .map_err(|e| GentunError::Transport(format!("failed to flush reply: {e}")))
    }

    async fn ack(&self, ticket: jetstream::Message) -> Result<(), GentunError> {
        ticket
            .ack()
            .await
            .map_err(|e| GentunError::Transport(format!("failed to ack request: {e}")))
    }

    async fn reject(&self, ticket: jetstream::Message) -> Result<(), GentunError> {
        ticket
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| GentunError::Transport(format!("failed to return request to queue: {e}")))
    }

    fn pulse(&self) -> Arc<dyn Pulse> {
        Arc::new(NatsPulse {
            client: self.client.clone(),
            broker: Arc::clone(&self.broker),
        })
    }
}

struct NatsPulse {
    client: Client,
    broker: Arc<BrokerConfig>,
}

#[async_trait]
impl Pulse for NatsPulse {
    async fn beat(&self, worker: &str) -> Result<(), GentunError> {
        let subject = self.broker.heartbeat_subject(worker);
        self.client
            .publish(subject.clone(), Vec::new().into())
            .await
            .map_err(|e| GentunError::Transport(format!("failed to publish heartbeat to {subject}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID, "abc");
        assert_eq!(header(Some(&headers), CORRELATION_ID).as_deref(), Some("abc"));
        assert_eq!(header(Some(&headers), REPLY_TO), None);
        assert_eq!(header(None, CORRELATION_ID), None);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        let config = BrokerConfig::default().with_url("nats://127.0.0.1:1");
        let err = NatsRequestLink::connect(&config).await.err().unwrap();
        assert!(matches!(err, GentunError::Transport(_)));
    }
}
