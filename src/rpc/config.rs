//! Broker, dispatcher and worker settings.

use super::codec::WireFormat;
use super::message::Mode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the message broker.
///
/// # Example
///
/// ```
/// use gentun::rpc::BrokerConfig;
///
/// let config = BrokerConfig::default()
///     .with_url("nats://broker:4222")
///     .with_credentials("guest", "guest");
/// assert_eq!(config.queue, "rpc_queue");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker URL.
    pub url: String,
    /// User name, if the broker requires authentication.
    pub user: Option<String>,
    /// Password, if the broker requires authentication.
    pub password: Option<String>,
    /// Subject requests are published to.
    pub queue: String,
    /// Durable work-queue stream holding pending requests.
    pub stream: String,
    /// Durable consumer shared by all workers.
    pub consumer: String,
    /// How long a delivered request may stay unacknowledged before the
    /// broker hands it to another worker.
    pub ack_wait: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".into(),
            user: None,
            password: None,
            queue: "rpc_queue".into(),
            stream: "GENTUN".into(),
            consumer: "gentun-workers".into(),
            ack_wait: Duration::from_secs(3600),
        }
    }
}

impl BrokerConfig {
    /// Reads `GENTUN_BROKER_URL`, `GENTUN_BROKER_USER`,
    /// `GENTUN_BROKER_PASSWORD` and `GENTUN_QUEUE`, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("GENTUN_BROKER_URL").unwrap_or(defaults.url),
            user: std::env::var("GENTUN_BROKER_USER").ok(),
            password: std::env::var("GENTUN_BROKER_PASSWORD").ok(),
            queue: std::env::var("GENTUN_QUEUE").unwrap_or(defaults.queue),
            ..defaults
        }
    }

    /// Sets the broker URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets user name and password.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the request subject.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the acknowledgement deadline.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    /// Subject heartbeats of `worker` are published to.
    pub fn heartbeat_subject(&self, worker: &str) -> String {
        format!("{}.heartbeat.{worker}", self.queue)
    }
}

/// Coordinator-side request/reply settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How long to wait for outstanding replies before re-publishing them.
    /// `None` waits forever.
    pub reply_timeout: Option<Duration>,
    /// Times a request is published before it is reported as timed out.
    pub max_attempts: u32,
    /// Encoding used for requests.
    pub wire_format: WireFormat,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Some(Duration::from_secs(3600)),
            max_attempts: 3,
            wire_format: WireFormat::Tagged,
        }
    }
}

impl DispatchConfig {
    /// Sets the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the number of attempts (at least 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the request encoding.
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.reply_timeout.is_some_and(|t| t.is_zero()) {
            return Err("reply_timeout must be positive".into());
        }
        Ok(())
    }
}

/// Worker-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker name used in logs and heartbeats; random when `None`.
    pub name: Option<String>,
    /// Interval between liveness signals.
    pub heartbeat_interval: Duration,
    /// Mode assumed for positional requests, which carry no mode field.
    pub mode: Mode,
    /// Direction assumed for positional requests.
    pub maximize: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: None,
            heartbeat_interval: Duration::from_secs(10),
            mode: Mode::Genetic,
            maximize: true,
        }
    }
}

impl WorkerConfig {
    /// Sets the worker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the mode assumed for positional requests.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the direction assumed for positional requests.
    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat_interval must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.reply_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(dispatch.max_attempts, 3);
        assert!(dispatch.validate().is_ok());

        let worker = WorkerConfig::default();
        assert_eq!(worker.name, None);
        assert_eq!(worker.heartbeat_interval, Duration::from_secs(10));
        assert!(worker.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let dispatch = DispatchConfig::default().with_reply_timeout(Some(Duration::ZERO));
        assert!(dispatch.validate().is_err());
        assert_eq!(DispatchConfig::default().with_max_attempts(0).max_attempts, 1);

        let worker = WorkerConfig::default().with_heartbeat_interval(Duration::ZERO);
        assert!(worker.validate().is_err());
    }

    #[test]
    fn test_heartbeat_subject() {
        let config = BrokerConfig::default().with_queue("jobs");
        assert_eq!(config.heartbeat_subject("w1"), "jobs.heartbeat.w1");
    }
}
