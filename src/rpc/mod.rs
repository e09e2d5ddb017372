//! Remote fitness evaluation.
//!
//! The coordinator publishes one [`EvaluationRequest`] per pending candidate
//! to a shared work queue and waits on a private reply inbox; any number of
//! [`WorkerClient`]s pull requests, evaluate them and reply. Replies are
//! matched to requests by correlation id, so arrival order does not matter.
//!
//! # Brokers
//!
//! - [`MemoryBroker`]: in-process, for tests and single-machine runs
//! - `NatsRequestLink` / `NatsWorkLink` (feature `nats`): a JetStream
//!   work-queue stream with a shared durable pull consumer
//!
//! # Example
//!
//! ```no_run
//! use gentun::rpc::{BrokerConfig, DispatchConfig, DistributedAssessor};
//!
//! let assessor = DistributedAssessor::connect(&BrokerConfig::from_env(), DispatchConfig::default())?;
//! # Ok::<(), gentun::GentunError>(())
//! ```

pub mod codec;
mod config;
mod dispatcher;
mod memory;
pub mod message;
#[cfg(feature = "nats")]
mod nats;
mod transport;
pub(crate) mod worker;

pub use codec::WireFormat;
pub use config::{BrokerConfig, DispatchConfig, WorkerConfig};
pub use dispatcher::{Dispatcher, DistributedAssessor};
pub use memory::{MemoryBroker, MemoryRequestLink, MemoryTicket, MemoryWorkLink};
pub use message::{EvaluationReply, EvaluationRequest, Mode, SwarmReply};
#[cfg(feature = "nats")]
pub use nats::{NatsRequestLink, NatsWorkLink};
pub use transport::{Delivered, Envelope, Pulse, RequestLink, WorkLink};
pub use worker::{evaluate_request, WorkerClient, WorkerStats};
