//! Parking of undeliverable messages and manual recovery.
//!
//! A message that exhausted its retries, or failed permanently, is
//! republished to `original_topic + suffix` with its payload and headers
//! untouched and a few headers describing why it was parked.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use herald_common::outgoing;
use serde::{Deserialize, Serialize};

use crate::{message::Message, result::SendResult, sender::MessageSender};

// Parking metadata lives under a `HERALD_` prefix; every other header is
// passed through untouched.
pub const DEAD_LETTER_REASON_HEADER: &str = "HERALD_DEAD_LETTER_REASON";
pub const ORIGINAL_TOPIC_HEADER: &str = "HERALD_ORIGINAL_TOPIC";
pub const ORIGINAL_TAG_HEADER: &str = "HERALD_ORIGINAL_TAG";
pub const DEAD_LETTERED_AT_HEADER: &str = "HERALD_DEAD_LETTERED_AT";

/// Reason attached when the retry budget ran out.
pub const REASON_MAX_RETRIES_EXCEEDED: &str = "max-retries-exceeded";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    /// When disabled, undeliverable messages are logged and dropped.
    ///
    /// Default: true
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Appended to a topic name to derive its dead-letter topic.
    ///
    /// Default: `_DLQ`
    #[serde(default = "defaults::topic_suffix")]
    pub topic_suffix: String,

    /// Tag set on parked messages.
    ///
    /// Default: `dead-letter`
    #[serde(default = "defaults::tag")]
    pub tag: String,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            topic_suffix: defaults::topic_suffix(),
            tag: defaults::tag(),
        }
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub fn topic_suffix() -> String {
        "_DLQ".to_string()
    }

    pub fn tag() -> String {
        "dead-letter".to_string()
    }
}

/// `original_topic` with `suffix` appended.
#[must_use]
pub fn dead_letter_topic(original_topic: &str, suffix: &str) -> String {
    format!("{original_topic}{suffix}")
}

/// `dead_letter_topic` with `suffix` stripped, or unchanged if it does not
/// end with `suffix`.
#[must_use]
pub fn original_topic<'a>(dead_letter_topic: &'a str, suffix: &str) -> &'a str {
    dead_letter_topic
        .strip_suffix(suffix)
        .unwrap_or(dead_letter_topic)
}

#[derive(Debug, Clone)]
pub struct DeadLetterProcessor {
    sender: Arc<dyn MessageSender>,
    config: DeadLetterConfig,
}

impl DeadLetterProcessor {
    pub fn new(sender: Arc<dyn MessageSender>, config: DeadLetterConfig) -> Self {
        Self { sender, config }
    }

    #[must_use]
    pub const fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    #[must_use]
    pub fn dead_letter_topic(&self, original_topic: &str) -> String {
        dead_letter_topic(original_topic, &self.config.topic_suffix)
    }

    #[must_use]
    pub fn original_topic<'a>(&self, dead_letter_topic: &'a str) -> &'a str {
        original_topic(dead_letter_topic, &self.config.topic_suffix)
    }

    /// Park `message` on the dead-letter topic of `original_topic`.
    ///
    /// The send is attempted once. A failure is logged at error level and
    /// not reported to the caller.
    #[tracing::instrument(level = "debug", skip(self, message))]
    pub async fn process_dead_letter(&self, original_topic: &str, message: Message, reason: &str) {
        if !self.config.enabled {
            tracing::warn!(
                topic = %original_topic,
                reason,
                "Dead-lettering disabled, dropping undeliverable message"
            );
            return;
        }

        let target = self.dead_letter_topic(original_topic);
        let parked = self.park(message, &target, original_topic, reason);
        let result = self.sender.send_sync(parked).await;

        if result.is_success() {
            outgoing!(
                level = INFO,
                topic = %original_topic,
                dead_letter_topic = %target,
                reason,
                message_id = result.message_id().unwrap_or_default(),
                "Message moved to dead-letter topic"
            );

            if herald_metrics::is_enabled() {
                herald_metrics::metrics()
                    .dead_letter
                    .record_parked(original_topic, reason);
            }
        } else {
            tracing::error!(
                topic = %original_topic,
                dead_letter_topic = %target,
                reason,
                error = result.error_message().unwrap_or_default(),
                "Failed to move message to dead-letter topic"
            );

            if herald_metrics::is_enabled() {
                herald_metrics::metrics()
                    .dead_letter
                    .record_park_failure(original_topic);
            }
        }
    }

    /// Republish a parked message to the topic it was dead-lettered from.
    ///
    /// The dead-letter headers are removed and the original tag restored.
    #[tracing::instrument(level = "debug", skip(self, message))]
    pub async fn retry_dead_letter(&self, dead_letter_topic: &str, message: Message) -> SendResult {
        let target = self.original_topic(dead_letter_topic).to_string();
        let restored = self.restore(message, &target);
        let result = self.sender.send_sync(restored).await;

        if result.is_success() {
            outgoing!(
                level = INFO,
                dead_letter_topic = %dead_letter_topic,
                topic = %target,
                "Dead-lettered message republished"
            );
        } else {
            tracing::error!(
                dead_letter_topic = %dead_letter_topic,
                topic = %target,
                error = result.error_message().unwrap_or_default(),
                "Failed to republish dead-lettered message"
            );
        }

        if herald_metrics::is_enabled() {
            herald_metrics::metrics()
                .dead_letter
                .record_recovered(result.is_success());
        }

        result
    }

    fn park(&self, mut message: Message, target: &str, original_topic: &str, reason: &str) -> Message {
        match message.tag().map(str::to_string) {
            Some(tag) => message = message.with_header(ORIGINAL_TAG_HEADER, tag),
            None => {
                message.remove_header(ORIGINAL_TAG_HEADER);
            }
        }

        message.set_topic(target);
        message.set_tag(Some(self.config.tag.clone()));

        message
            .with_header(DEAD_LETTER_REASON_HEADER, reason)
            .with_header(ORIGINAL_TOPIC_HEADER, original_topic)
            .with_header(
                DEAD_LETTERED_AT_HEADER,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )
    }

    fn restore(&self, mut message: Message, target: &str) -> Message {
        let original_tag = message.remove_header(ORIGINAL_TAG_HEADER);
        message.remove_header(DEAD_LETTER_REASON_HEADER);
        message.remove_header(ORIGINAL_TOPIC_HEADER);
        message.remove_header(DEAD_LETTERED_AT_HEADER);

        let tag = match original_tag {
            Some(tag) => Some(tag),
            None if message.tag() == Some(self.config.tag.as_str()) => None,
            None => message.tag().map(str::to_string),
        };

        message.set_topic(target);
        message.set_tag(tag);
        message
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_dead_letter_topic_round_trip() {
        let parked = dead_letter_topic("orders.created", ".DLQ");
        assert_eq!(parked, "orders.created.DLQ");
        assert_eq!(original_topic(&parked, ".DLQ"), "orders.created");
    }

    #[test]
    fn test_default_suffix() {
        let config = DeadLetterConfig::default();
        assert_eq!(
            dead_letter_topic("payments", &config.topic_suffix),
            "payments_DLQ"
        );
    }

    #[test]
    fn test_original_topic_without_suffix_is_unchanged() {
        assert_eq!(original_topic("orders.created", ".DLQ"), "orders.created");
        assert_eq!(original_topic("", ".DLQ"), "");
    }

    #[test]
    fn test_only_trailing_suffix_is_stripped() {
        assert_eq!(original_topic("a.DLQ.b.DLQ", ".DLQ"), "a.DLQ.b");
        assert_eq!(original_topic("a.DLQ.b", ".DLQ"), "a.DLQ.b");
    }
}
