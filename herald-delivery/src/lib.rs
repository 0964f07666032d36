//! Reliable publishing on top of a message broker.
//!
//! - [`sender`]: sync, async, one-way, orderly, delayed and transactional sends
//! - [`retry`]: bounded resends with fixed, exponential or linear backoff
//! - [`dead_letter`]: parking undeliverable messages and recovering them
//! - [`publisher`]: the three composed into a send-retry-park pipeline
//! - [`event`]: domain-event envelopes published over any sender
//! - [`trace`] and [`monitor`]: per-message history and per-topic counters,
//!   fed by [`observe::ObservedSender`]
//!
//! The broker itself sits behind [`broker::BrokerClient`].

pub mod broker;
pub mod codec;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod message;
pub mod monitor;
pub mod observe;
pub mod publisher;
pub mod result;
pub mod retry;
pub mod sender;
pub mod trace;

pub use broker::{BrokerClient, BrokerError, MemoryBroker, TestBroker};
pub use codec::{CodecError, JsonCodec, MessageCodec, SerializationConfig};
pub use config::ProducerConfig;
pub use dead_letter::{DeadLetterConfig, DeadLetterProcessor};
pub use error::{RejectedError, SendError, TransientError};
pub use event::{DomainEvent, EventConfig, EventError, EventPublisher, FailureStrategy};
pub use message::Message;
pub use monitor::{Monitor, MonitorConfig, MonitorReport};
pub use observe::ObservedSender;
pub use publisher::{PublishOutcome, ReliablePublisher};
pub use result::{SendResult, SendStatus};
pub use retry::{RetryHandle, RetryOutcome, RetryPolicy, RetryService, RetryStrategy};
pub use sender::{MessageSender, PendingSend, Producer, SendMode};
pub use trace::{MessageTrace, TraceConfig, TraceEvent, TraceKind, TraceService};
