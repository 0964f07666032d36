//! The broker transport seam.
//!
//! Connection management and wire framing live behind [`BrokerClient`];
//! the producer only hands over fully addressed requests and interprets
//! receipts. Two in-process implementations ship with the crate:
//! [`MemoryBroker`] for embedding and [`TestBroker`] for scripted failures.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::result::SendStatus;

pub mod memory;

pub use memory::{MemoryBroker, StoredRecord};
pub use test::TestBroker;

/// How the broker should place a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Broker picks the queue.
    Normal,
    /// No acknowledgement is awaited by the producer.
    OneWay,
    /// Pinned to a queue index, used for per-key ordering.
    Queue(u32),
    /// Visible only after the broker-side delay tier elapses.
    Delayed(u32),
    /// Half message gated on an external transactional decision.
    Transactional(serde_json::Value),
}

impl Routing {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::OneWay => "one_way",
            Self::Queue(_) => "queue",
            Self::Delayed(_) => "delayed",
            Self::Transactional(_) => "transactional",
        }
    }
}

/// A fully addressed publish handed to the transport.
#[derive(Debug, Clone)]
pub struct BrokerRequest {
    pub producer_group: String,
    pub topic: String,
    pub tag: Option<String>,
    pub key: Option<String>,
    /// `topic` or `topic:tag`
    pub destination: String,
    pub payload: Arc<[u8]>,
    pub headers: BTreeMap<String, String>,
    pub routing: Routing,
}

/// Acknowledgement for a stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerReceipt {
    pub message_id: String,
    pub queue_id: Option<u32>,
    pub queue_offset: Option<u64>,
    pub status: SendStatus,
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker busy: {0}")]
    Busy(String),

    #[error("Broker did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Topic {0} does not exist")]
    TopicNotFound(String),

    #[error("Queue {queue_id} does not exist on topic {topic}")]
    InvalidQueue { topic: String, queue_id: u32 },

    #[error("Message of {size} bytes exceeds broker limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Broker refused message: {0}")]
    Refused(String),
}

#[async_trait]
pub trait BrokerClient: Send + Sync + Debug {
    /// Store a message and return the broker's acknowledgement.
    async fn send(&self, request: BrokerRequest) -> Result<BrokerReceipt, BrokerError>;

    /// Number of queues `topic` is partitioned into.
    async fn queue_count(&self, topic: &str) -> Result<u32, BrokerError>;
}

#[async_trait]
impl<B: BrokerClient + ?Sized> BrokerClient for Arc<B> {
    async fn send(&self, request: BrokerRequest) -> Result<BrokerReceipt, BrokerError> {
        (**self).send(request).await
    }

    async fn queue_count(&self, topic: &str) -> Result<u32, BrokerError> {
        (**self).queue_count(topic).await
    }
}
