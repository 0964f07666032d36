//! Outcome of a single send attempt.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{broker::BrokerReceipt, error::SendError, message::Message};

/// Broker-reported store status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendStatus {
    SendOk,
    FlushDiskTimeout,
    FlushSlaveTimeout,
    SlaveNotAvailable,
    SendFailed,
}

impl SendStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SendOk => "SEND_OK",
            Self::FlushDiskTimeout => "FLUSH_DISK_TIMEOUT",
            Self::FlushSlaveTimeout => "FLUSH_SLAVE_TIMEOUT",
            Self::SlaveNotAvailable => "SLAVE_NOT_AVAILABLE",
            Self::SendFailed => "SEND_FAILED",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one publish attempt.
///
/// `is_success()` holds exactly when the status is [`SendStatus::SendOk`]
/// and no error was captured; the constructors are the only way to build one.
#[derive(Debug, Clone)]
pub struct SendResult {
    success: bool,
    message_id: Option<String>,
    message_key: Option<String>,
    topic: String,
    tag: Option<String>,
    queue_id: Option<u32>,
    queue_offset: Option<u64>,
    status: SendStatus,
    sent_at: DateTime<Utc>,
    error_message: Option<String>,
    error: Option<Arc<SendError>>,
}

impl SendResult {
    /// A successful publish acknowledged with [`SendStatus::SendOk`].
    pub fn success(
        message: &Message,
        message_id: impl Into<String>,
        queue_id: Option<u32>,
        queue_offset: Option<u64>,
    ) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            message_key: message.key().map(str::to_string),
            topic: message.topic().to_string(),
            tag: message.tag().map(str::to_string),
            queue_id,
            queue_offset,
            status: SendStatus::SendOk,
            sent_at: Utc::now(),
            error_message: None,
            error: None,
        }
    }

    /// Build a result from a broker acknowledgement. Only [`SendStatus::SendOk`]
    /// counts as success; other store statuses are reported as failures.
    pub fn from_receipt(message: &Message, receipt: BrokerReceipt) -> Self {
        if receipt.status == SendStatus::SendOk {
            return Self::success(
                message,
                receipt.message_id,
                receipt.queue_id,
                receipt.queue_offset,
            );
        }

        Self {
            success: false,
            message_id: Some(receipt.message_id),
            message_key: message.key().map(str::to_string),
            topic: message.topic().to_string(),
            tag: message.tag().map(str::to_string),
            queue_id: receipt.queue_id,
            queue_offset: receipt.queue_offset,
            status: receipt.status,
            sent_at: Utc::now(),
            error_message: Some(format!("Broker stored message with status {}", receipt.status)),
            error: None,
        }
    }

    /// A publish that failed before or during broker I/O.
    pub fn failure(message: &Message, error: SendError) -> Self {
        Self::failure_for(message.topic(), message.tag(), message.key(), error)
    }

    /// A failure for a publish that never produced a [`Message`], e.g. when
    /// the payload could not be encoded.
    pub fn failure_for(
        topic: &str,
        tag: Option<&str>,
        key: Option<&str>,
        error: SendError,
    ) -> Self {
        Self {
            success: false,
            message_id: None,
            message_key: key.map(str::to_string),
            topic: topic.to_string(),
            tag: tag.map(str::to_string),
            queue_id: None,
            queue_offset: None,
            status: SendStatus::SendFailed,
            sent_at: Utc::now(),
            error_message: Some(error.to_string()),
            error: Some(Arc::new(error)),
        }
    }

    /// Override the reported key, e.g. with the hash key of an orderly send.
    #[must_use]
    pub(crate) fn with_message_key(mut self, key: Option<&str>) -> Self {
        if self.message_key.is_none() {
            self.message_key = key.map(str::to_string);
        }
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Whether resending could change the outcome.
    ///
    /// Successes are never retryable. Non-OK store statuses are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if self.success {
            return false;
        }
        self.error.as_deref().is_none_or(SendError::is_retryable)
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    #[must_use]
    pub fn message_key(&self) -> Option<&str> {
        self.message_key.as_deref()
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub const fn queue_id(&self) -> Option<u32> {
        self.queue_id
    }

    #[must_use]
    pub const fn queue_offset(&self) -> Option<u64> {
        self.queue_offset
    }

    #[must_use]
    pub const fn status(&self) -> SendStatus {
        self.status
    }

    #[must_use]
    pub const fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SendError> {
        self.error.as_deref()
    }

    /// Shared handle to the captured error, for outcomes that outlive the result.
    #[must_use]
    pub fn shared_error(&self) -> Option<Arc<SendError>> {
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{RejectedError, TransientError};

    fn message() -> Message {
        Message::new("orders.created", b"{\"id\":1}".to_vec())
            .with_tag("eu")
            .with_key("order-1")
    }

    #[test]
    fn test_success_invariant() {
        let result = SendResult::success(&message(), "01ABC", Some(2), Some(17));

        assert!(result.is_success());
        assert_eq!(result.status(), SendStatus::SendOk);
        assert!(result.error().is_none());
        assert!(result.error_message().is_none());
        assert_eq!(result.message_id(), Some("01ABC"));
        assert_eq!(result.message_key(), Some("order-1"));
        assert_eq!(result.topic(), "orders.created");
        assert_eq!(result.tag(), Some("eu"));
        assert_eq!(result.queue_id(), Some(2));
        assert_eq!(result.queue_offset(), Some(17));
        assert!(!result.is_retryable());
    }

    #[test]
    fn test_non_ok_receipt_is_not_success() {
        let receipt = BrokerReceipt {
            message_id: "01DEF".to_string(),
            queue_id: Some(0),
            queue_offset: Some(3),
            status: SendStatus::FlushDiskTimeout,
        };
        let result = SendResult::from_receipt(&message(), receipt);

        assert!(!result.is_success());
        assert_eq!(result.status(), SendStatus::FlushDiskTimeout);
        assert!(result.error().is_none());
        assert_eq!(
            result.error_message(),
            Some("Broker stored message with status FLUSH_DISK_TIMEOUT")
        );
        assert!(result.is_retryable());
    }

    #[test]
    fn test_failure_captures_error() {
        let result = SendResult::failure(
            &message(),
            SendError::Transient(TransientError::ConnectionFailed("reset".to_string())),
        );

        assert!(!result.is_success());
        assert_eq!(result.status(), SendStatus::SendFailed);
        assert!(result.message_id().is_none());
        assert_eq!(
            result.error_message(),
            Some("Transient failure: Connection failed: reset")
        );
        assert!(result.is_retryable());
    }

    #[test]
    fn test_rejection_is_not_retryable() {
        let result = SendResult::failure(
            &message(),
            SendError::Rejected(RejectedError::TopicNotFound("orders.created".to_string())),
        );
        assert!(!result.is_retryable());
    }

    #[test]
    fn test_orderly_key_fallback() {
        let message = Message::new("orders", b"{}".to_vec());
        let result =
            SendResult::success(&message, "01", None, None).with_message_key(Some("customer-9"));
        assert_eq!(result.message_key(), Some("customer-9"));

        let keyed = SendResult::success(&message.with_key("order-1"), "02", None, None)
            .with_message_key(Some("customer-9"));
        assert_eq!(keyed.message_key(), Some("order-1"));
    }
}
