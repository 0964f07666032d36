//! Domain events.
//!
//! A [`DomainEvent`] wraps application data in an envelope carrying its id,
//! type and aggregate. [`EventPublisher`] sends the envelope as JSON with the
//! event id as message key, to a topic derived from the event type and
//! prefixed with the configured topic prefix.

use std::{borrow::Cow, sync::Arc};

use chrono::{DateTime, Utc};
use herald_common::outgoing;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::{
    codec::{CodecError, JsonCodec, MessageCodec},
    message::Message,
    result::SendResult,
    retry::RetryService,
    sender::MessageSender,
};

pub const DEFAULT_EVENT_VERSION: &str = "1.0";

/// What [`EventPublisher`] does when an event could not be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailureStrategy {
    /// Log at error level and carry on.
    #[default]
    LogAndIgnore,
    /// Log and return [`EventError`] to the caller.
    ReturnError,
    /// Log and hand the message to the retry service, keyed by event id.
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Prepended to every event topic that does not already start with it.
    ///
    /// Default: `herald_event_`
    #[serde(default = "defaults::topic_prefix")]
    pub topic_prefix: String,

    #[serde(default)]
    pub failure_strategy: FailureStrategy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            topic_prefix: defaults::topic_prefix(),
            failure_strategy: FailureStrategy::default(),
        }
    }
}

mod defaults {
    pub fn topic_prefix() -> String {
        "herald_event_".to_string()
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to publish event {event_type} [{event_id}]: {reason}")]
    Publish {
        event_type: String,
        event_id: String,
        reason: String,
    },

    #[error("Failed to encode event {event_type} [{event_id}]: {source}")]
    Encode {
        event_type: String,
        event_id: String,
        source: CodecError,
    },
}

/// Envelope around `data`, serialized as the message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub event_id: String,
    pub event_type: String,
    pub version: String,
    pub occurred_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub data: T,
}

impl<T> DomainEvent<T> {
    /// A new event with a fresh id, occurring now.
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Ulid::new().to_string(),
            event_type: event_type.into(),
            version: DEFAULT_EVENT_VERSION.to_string(),
            occurred_on: Utc::now(),
            aggregate_id: None,
            aggregate_type: None,
            source: None,
            topic: None,
            tag: None,
            data,
        }
    }

    #[must_use]
    pub fn with_aggregate(
        mut self,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
    ) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The explicit topic, or the event type in snake case.
    #[must_use]
    pub fn topic(&self) -> Cow<'_, str> {
        match self.topic.as_deref() {
            Some(topic) if !topic.is_empty() => Cow::Borrowed(topic),
            _ => Cow::Owned(snake_case(&self.event_type)),
        }
    }

    /// The explicit tag, or the aggregate type.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => Some(tag),
            _ => self.aggregate_type.as_deref(),
        }
    }
}

/// `OrderCreated` to `order_created`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut converted = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                converted.push('_');
            }
            converted.extend(ch.to_lowercase());
        } else {
            converted.push(ch);
        }
    }
    converted
}

/// Publishes [`DomainEvent`]s through a [`MessageSender`].
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: Arc<dyn MessageSender>,
    codec: JsonCodec,
    config: EventConfig,
    retries: Option<RetryService>,
}

impl EventPublisher {
    pub fn new(sender: Arc<dyn MessageSender>, config: EventConfig) -> Self {
        Self {
            sender,
            codec: JsonCodec::new(),
            config,
            retries: None,
        }
    }

    #[must_use]
    pub const fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Retry service used by [`FailureStrategy::Retry`].
    #[must_use]
    pub fn with_retries(mut self, retries: RetryService) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EventConfig {
        &self.config
    }

    /// `topic` with the configured prefix, unless it already carries it.
    #[must_use]
    pub fn full_topic(&self, topic: &str) -> String {
        let prefix = &self.config.topic_prefix;
        if prefix.is_empty() || topic.starts_with(prefix.as_str()) {
            topic.to_string()
        } else {
            format!("{prefix}{topic}")
        }
    }

    /// The message [`EventPublisher`] would send for `event` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if the envelope cannot be serialized.
    pub fn to_message<T: Serialize>(
        &self,
        topic: &str,
        event: &DomainEvent<T>,
    ) -> Result<Message, EventError> {
        let payload = self
            .codec
            .encode(event)
            .map_err(|source| EventError::Encode {
                event_type: event.event_type.clone(),
                event_id: event.event_id.clone(),
                source,
            })?;

        let message = Message::new(self.full_topic(topic), payload).with_key(&event.event_id);
        Ok(match event.tag() {
            Some(tag) => message.with_tag(tag),
            None => message,
        })
    }

    /// Publish `event` to its own topic and wait for the broker.
    ///
    /// # Errors
    ///
    /// Under [`FailureStrategy::ReturnError`], returns an error if the event
    /// could not be encoded or published.
    pub async fn publish<T: Serialize + Sync>(&self, event: &DomainEvent<T>) -> Result<(), EventError> {
        self.publish_to(&event.topic(), event).await
    }

    /// Publish `event` to `topic` instead of its own.
    ///
    /// # Errors
    ///
    /// See [`EventPublisher::publish`].
    pub async fn publish_to<T: Serialize + Sync>(
        &self,
        topic: &str,
        event: &DomainEvent<T>,
    ) -> Result<(), EventError> {
        let message = match self.to_message(topic, event) {
            Ok(message) => message,
            Err(error) => return self.encoding_failed(error),
        };

        let result = self.sender.send_sync(message.clone()).await;
        self.settle(event, message, &result, "sync")
    }

    /// Publish `event` on a background task.
    ///
    /// Broker failures surface after this returns, so only encoding failures
    /// can be returned; the failure strategy still logs or retries the rest.
    ///
    /// # Errors
    ///
    /// Under [`FailureStrategy::ReturnError`], returns an error if the event
    /// could not be encoded.
    pub fn publish_async<T: Serialize>(&self, event: &DomainEvent<T>) -> Result<(), EventError> {
        let message = match self.to_message(&event.topic(), event) {
            Ok(message) => message,
            Err(error) => return self.encoding_failed(error),
        };

        let pending = self.sender.send_async(message.clone());
        let publisher = self.clone();
        let event_type = event.event_type.clone();
        let event_id = event.event_id.clone();

        tokio::spawn(async move {
            let reason = match pending.await {
                Ok(result) if result.is_success() => {
                    outgoing!(
                        level = DEBUG,
                        event_type = %event_type,
                        topic = %message.topic(),
                        "Published async event"
                    );
                    return;
                }
                Ok(result) => failure_reason(&result),
                Err(error) => error.to_string(),
            };

            // Nobody is left to receive an error here
            let _ = publisher.failed(&event_type, &event_id, message, reason, "async");
        });

        Ok(())
    }

    /// Publish `event` with broker-side delayed visibility.
    ///
    /// # Errors
    ///
    /// See [`EventPublisher::publish`].
    pub async fn publish_delay<T: Serialize + Sync>(
        &self,
        event: &DomainEvent<T>,
        delay_level: u32,
    ) -> Result<(), EventError> {
        let message = match self.to_message(&event.topic(), event) {
            Ok(message) => message,
            Err(error) => return self.encoding_failed(error),
        };

        let result = self.sender.send_delay(message.clone(), delay_level).await;
        self.settle(event, message, &result, "delay")
    }

    /// Publish `event` to the queue selected by `hash_key`.
    ///
    /// # Errors
    ///
    /// See [`EventPublisher::publish`].
    pub async fn publish_orderly<T: Serialize + Sync>(
        &self,
        event: &DomainEvent<T>,
        hash_key: &str,
    ) -> Result<(), EventError> {
        let message = match self.to_message(&event.topic(), event) {
            Ok(message) => message,
            Err(error) => return self.encoding_failed(error),
        };

        let result = self.sender.send_orderly(message.clone(), hash_key).await;
        self.settle(event, message, &result, "orderly")
    }

    fn settle<T>(
        &self,
        event: &DomainEvent<T>,
        message: Message,
        result: &SendResult,
        mode: &str,
    ) -> Result<(), EventError> {
        if result.is_success() {
            outgoing!(
                level = DEBUG,
                event_type = %event.event_type,
                topic = %message.topic(),
                mode,
                "Published event"
            );
            return Ok(());
        }

        self.failed(
            &event.event_type,
            &event.event_id,
            message,
            failure_reason(result),
            mode,
        )
    }

    fn failed(
        &self,
        event_type: &str,
        event_id: &str,
        message: Message,
        reason: String,
        mode: &str,
    ) -> Result<(), EventError> {
        tracing::error!(
            event_type,
            event_id,
            topic = %message.topic(),
            mode,
            reason = %reason,
            "Failed to publish event"
        );

        match self.config.failure_strategy {
            FailureStrategy::LogAndIgnore => Ok(()),
            FailureStrategy::ReturnError => Err(EventError::Publish {
                event_type: event_type.to_string(),
                event_id: event_id.to_string(),
                reason,
            }),
            FailureStrategy::Retry => {
                match &self.retries {
                    // Resends use normal routing; the handle is not awaited
                    Some(retries) => drop(retries.retry_message(event_id, message)),
                    None => tracing::warn!(
                        event_id,
                        "No retry service configured, event will not be resent"
                    ),
                }
                Ok(())
            }
        }
    }

    fn encoding_failed(&self, error: EventError) -> Result<(), EventError> {
        tracing::error!(error = %error, "Failed to publish event");

        match self.config.failure_strategy {
            FailureStrategy::ReturnError => Err(error),
            FailureStrategy::LogAndIgnore | FailureStrategy::Retry => Ok(()),
        }
    }
}

fn failure_reason(result: &SendResult) -> String {
    result
        .error_message()
        .map_or_else(|| result.status().to_string(), str::to_string)
}
