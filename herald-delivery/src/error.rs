//! Typed error handling for send operations.
//!
//! Failures are split by whether another attempt can help:
//! - Transient failures (broker busy, connection lost, timeout) - retry
//! - Serialization failures (payload cannot be encoded) - never retry
//! - Rejections (unknown topic, oversized message) - never retry
//! - Internal errors (task aborted, sender panicked) - retry

use std::time::Duration;

use thiserror::Error;

use crate::{broker::BrokerError, codec::CodecError};

/// Top-level send error type.
#[derive(Debug, Error)]
pub enum SendError {
    /// Temporary failure that can be retried with backoff.
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientError),

    /// The payload could not be encoded.
    #[error("Serialization failure: {0}")]
    Serialization(#[from] CodecError),

    /// The broker permanently refused the message.
    #[error("Rejected: {0}")]
    Rejected(#[from] RejectedError),

    /// The send never completed (aborted task, panicking sender).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures that may succeed on a later attempt.
#[derive(Debug, Error)]
pub enum TransientError {
    /// Could not reach the broker.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker is overloaded or flow-controlling the producer.
    #[error("Broker busy: {0}")]
    BrokerBusy(String),

    /// The broker did not acknowledge within the send timeout.
    #[error("Send timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Failures that will not change on retry.
#[derive(Debug, Error)]
pub enum RejectedError {
    /// The destination topic does not exist.
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The encoded payload exceeds the producer or broker limit.
    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// The broker refused the message for another reason (ACL, policy).
    #[error("Refused by broker: {0}")]
    Refused(String),
}

impl SendError {
    /// Returns `true` if another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Internal(_))
    }

    /// Returns `true` if the payload itself could not be encoded.
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// Returns `true` if the broker permanently refused the message.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Classify transport errors into the send taxonomy.
impl From<BrokerError> for SendError {
    fn from(error: BrokerError) -> Self {
        match error {
            BrokerError::Unavailable(msg) => Self::Transient(TransientError::ConnectionFailed(msg)),
            BrokerError::Busy(msg) => Self::Transient(TransientError::BrokerBusy(msg)),
            BrokerError::Timeout(after) => Self::Transient(TransientError::Timeout(after)),
            BrokerError::TopicNotFound(topic) => {
                Self::Rejected(RejectedError::TopicNotFound(topic))
            }
            BrokerError::MessageTooLarge { size, limit } => {
                Self::Rejected(RejectedError::MessageTooLarge { size, limit })
            }
            BrokerError::Refused(msg) => Self::Rejected(RejectedError::Refused(msg)),
            BrokerError::InvalidQueue { topic, queue_id } => Self::Rejected(
                RejectedError::Refused(format!("queue {queue_id} does not exist on {topic}")),
            ),
        }
    }
}
