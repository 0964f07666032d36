//! Publishing to the broker.
//!
//! [`MessageSender`] is the send contract used by the retry and dead-letter
//! layers; [`Producer`] implements it on top of a [`BrokerClient`].

use std::{
    hash::BuildHasher,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use herald_common::{internal, outgoing};
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;

use crate::{
    broker::{BrokerClient, BrokerReceipt, BrokerRequest, Routing},
    codec::{CodecError, JsonCodec, MessageCodec},
    config::ProducerConfig,
    error::{RejectedError, SendError, TransientError},
    message::Message,
    result::SendResult,
};

/// Fixed seeds so the queue chosen for a hash key is the same in every process.
const ORDERLY_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// The delivery mode of a publish, used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Sync,
    Async,
    OneWay,
    Orderly,
    Delay,
    Transactional,
}

impl SendMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::OneWay => "one_way",
            Self::Orderly => "orderly",
            Self::Delay => "delay",
            Self::Transactional => "transactional",
        }
    }
}

/// Publish contract.
///
/// Only [`MessageSender::send_async`] can surface an error; every other mode
/// reports broker failures through [`SendResult`], and one-way sends only
/// log them.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Publish and wait for the broker acknowledgement.
    async fn send_sync(&self, message: Message) -> SendResult;

    /// Publish on a background task.
    ///
    /// The returned [`PendingSend`] resolves to `Ok` once the broker answered
    /// and to `Err` if the send failed.
    fn send_async(&self, message: Message) -> PendingSend;

    /// Publish without waiting for or reporting the outcome.
    fn send_one_way(&self, message: Message);

    /// Publish to the queue selected by `hash_key`, so messages sharing a
    /// hash key keep their relative order.
    async fn send_orderly(&self, message: Message, hash_key: &str) -> SendResult;

    /// Publish with broker-side delayed visibility. `delay_level` is the
    /// broker's delay tier.
    async fn send_delay(&self, message: Message, delay_level: u32) -> SendResult;

    /// Publish as a half message whose visibility depends on an external
    /// transactional decision described by `arg`.
    async fn send_in_transaction(&self, message: Message, arg: serde_json::Value) -> SendResult;
}

impl std::fmt::Debug for dyn MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MessageSender")
    }
}

#[async_trait]
impl<S: MessageSender + ?Sized> MessageSender for Arc<S> {
    async fn send_sync(&self, message: Message) -> SendResult {
        (**self).send_sync(message).await
    }

    fn send_async(&self, message: Message) -> PendingSend {
        (**self).send_async(message)
    }

    fn send_one_way(&self, message: Message) {
        (**self).send_one_way(message);
    }

    async fn send_orderly(&self, message: Message, hash_key: &str) -> SendResult {
        (**self).send_orderly(message, hash_key).await
    }

    async fn send_delay(&self, message: Message, delay_level: u32) -> SendResult {
        (**self).send_delay(message, delay_level).await
    }

    async fn send_in_transaction(&self, message: Message, arg: serde_json::Value) -> SendResult {
        (**self).send_in_transaction(message, arg).await
    }
}

/// A send running on a background task.
#[derive(Debug)]
pub struct PendingSend {
    handle: JoinHandle<Result<SendResult, SendError>>,
}

impl PendingSend {
    pub(crate) fn spawn<F>(send: F) -> Self
    where
        F: Future<Output = Result<SendResult, SendError>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(send),
        }
    }

    /// Stop waiting for the broker. The future then resolves to
    /// [`SendError::Internal`].
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for PendingSend {
    type Output = Result<SendResult, SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| Err(SendError::Internal(format!("Send task failed: {e}"))))
        })
    }
}

/// Broker access shared by the producer and its background tasks.
#[derive(Debug, Clone)]
struct Dispatcher {
    broker: Arc<dyn BrokerClient>,
    group: Arc<str>,
    send_timeout: Duration,
    max_message_size: usize,
}

impl Dispatcher {
    async fn dispatch(
        &self,
        message: &Message,
        routing: Routing,
    ) -> Result<BrokerReceipt, SendError> {
        let size = message.payload().len();
        if size > self.max_message_size {
            return Err(RejectedError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            }
            .into());
        }

        let request = BrokerRequest {
            producer_group: self.group.to_string(),
            topic: message.topic().to_string(),
            tag: message.tag().map(str::to_string),
            key: message.key().map(str::to_string),
            destination: message.destination(),
            payload: message.shared_payload(),
            headers: message.headers().clone(),
            routing,
        };

        outgoing!(
            level = DEBUG,
            destination = %request.destination,
            routing = request.routing.as_str(),
            size,
            "Publishing message"
        );

        tokio::time::timeout(self.send_timeout, self.broker.send(request))
            .await
            .map_err(|_| TransientError::Timeout(self.send_timeout))?
            .map_err(SendError::from)
    }

    async fn send(&self, message: &Message, routing: Routing, mode: SendMode) -> SendResult {
        let started = Instant::now();
        let result = match self.dispatch(message, routing).await {
            Ok(receipt) => SendResult::from_receipt(message, receipt),
            Err(error) => SendResult::failure(message, error),
        };
        observe(&result, mode, started);
        result
    }

    async fn queue_count(&self, topic: &str) -> Result<u32, SendError> {
        tokio::time::timeout(self.send_timeout, self.broker.queue_count(topic))
            .await
            .map_err(|_| TransientError::Timeout(self.send_timeout))?
            .map_err(SendError::from)
    }
}

fn observe(result: &SendResult, mode: SendMode, started: Instant) {
    if result.is_success() {
        outgoing!(
            level = DEBUG,
            topic = %result.topic(),
            mode = mode.as_str(),
            message_id = result.message_id().unwrap_or_default(),
            "Message published"
        );
    } else {
        outgoing!(
            level = WARN,
            topic = %result.topic(),
            mode = mode.as_str(),
            status = %result.status(),
            error = result.error_message().unwrap_or_default(),
            "Message publish failed"
        );
    }

    record(mode, result.is_success(), started);
}

fn observe_error(message: &Message, error: &SendError, mode: SendMode, started: Instant) {
    outgoing!(
        level = WARN,
        topic = %message.topic(),
        mode = mode.as_str(),
        error = %error,
        "Message publish failed"
    );

    record(mode, false, started);
}

fn record(mode: SendMode, success: bool, started: Instant) {
    if herald_metrics::is_enabled() {
        herald_metrics::metrics().producer.record_send(
            mode.as_str(),
            success,
            started.elapsed().as_secs_f64(),
        );
    }
}

/// [`MessageSender`] over a [`BrokerClient`] with a payload codec
///
/// Every broker round trip is bounded by the configured send timeout, and
/// payloads larger than the configured maximum are rejected without any
/// broker I/O.
///
/// Background modes ([`MessageSender::send_async`] and
/// [`MessageSender::send_one_way`]) spawn onto the current tokio runtime and
/// panic when called outside of one.
pub struct Producer<C = JsonCodec> {
    dispatcher: Dispatcher,
    codec: C,
    hash_state: ahash::RandomState,
}

impl<C> std::fmt::Debug for Producer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("group", &self.dispatcher.group)
            .field("send_timeout", &self.dispatcher.send_timeout)
            .field("max_message_size", &self.dispatcher.max_message_size)
            .finish_non_exhaustive()
    }
}

impl Producer<JsonCodec> {
    /// A producer encoding typed payloads as compact JSON.
    pub fn new(broker: Arc<dyn BrokerClient>, config: &ProducerConfig) -> Self {
        Self::with_codec(broker, config, JsonCodec::new())
    }
}

impl<C> Producer<C> {
    pub fn with_codec(broker: Arc<dyn BrokerClient>, config: &ProducerConfig, codec: C) -> Self {
        Self {
            dispatcher: Dispatcher {
                broker,
                group: Arc::from(config.group.as_str()),
                send_timeout: config.send_timeout(),
                max_message_size: config.max_message_size,
            },
            codec,
            hash_state: ahash::RandomState::with_seeds(
                ORDERLY_SEEDS[0],
                ORDERLY_SEEDS[1],
                ORDERLY_SEEDS[2],
                ORDERLY_SEEDS[3],
            ),
        }
    }

    /// The queue index `hash_key` maps to on a topic with `queue_count` queues.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn select_queue(&self, hash_key: &str, queue_count: u32) -> u32 {
        (self.hash_state.hash_one(hash_key) % u64::from(queue_count.max(1))) as u32
    }
}

impl<C: MessageCodec> Producer<C> {
    /// Encode `value` into a message for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Serialization`] if the codec rejects the value.
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<Message, SendError> {
        let payload = self.codec.encode(value)?;
        Ok(Message::new(topic, payload))
    }

    /// Decode the payload of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is not a valid `T`.
    pub fn decode<T: DeserializeOwned>(&self, message: &Message) -> Result<T, CodecError> {
        self.codec.decode(message.payload())
    }

    /// Encode `value` and publish it synchronously.
    ///
    /// Encoding failures are reported as a failed [`SendResult`] without
    /// any broker I/O.
    pub async fn send_value<T: Serialize + Sync + ?Sized>(
        &self,
        topic: &str,
        tag: Option<&str>,
        key: Option<&str>,
        value: &T,
    ) -> SendResult {
        let message = match self.encode(topic, value) {
            Ok(message) => message,
            Err(error) => {
                internal!(
                    level = WARN,
                    topic = %topic,
                    error = %error,
                    "Failed to encode payload"
                );
                return SendResult::failure_for(topic, tag, key, error);
            }
        };

        let message = match tag {
            Some(tag) => message.with_tag(tag),
            None => message,
        };
        let message = match key {
            Some(key) => message.with_key(key),
            None => message,
        };

        self.dispatcher.send(&message, Routing::Normal, SendMode::Sync).await
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> MessageSender for Producer<C> {
    #[tracing::instrument(level = "trace", skip_all, fields(topic = %message.topic()))]
    async fn send_sync(&self, message: Message) -> SendResult {
        self.dispatcher
            .send(&message, Routing::Normal, SendMode::Sync)
            .await
    }

    fn send_async(&self, message: Message) -> PendingSend {
        let dispatcher = self.dispatcher.clone();
        PendingSend::spawn(async move {
            let started = Instant::now();
            match dispatcher.dispatch(&message, Routing::Normal).await {
                Ok(receipt) => {
                    let result = SendResult::from_receipt(&message, receipt);
                    observe(&result, SendMode::Async, started);
                    Ok(result)
                }
                Err(error) => {
                    observe_error(&message, &error, SendMode::Async, started);
                    Err(error)
                }
            }
        })
    }

    fn send_one_way(&self, message: Message) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(error) = dispatcher.dispatch(&message, Routing::OneWay).await {
                outgoing!(
                    level = WARN,
                    topic = %message.topic(),
                    error = %error,
                    "One-way publish failed"
                );

                if herald_metrics::is_enabled() {
                    herald_metrics::metrics()
                        .producer
                        .record_one_way_failure(message.topic());
                }
            }
        });
    }

    #[tracing::instrument(level = "trace", skip_all, fields(topic = %message.topic()))]
    async fn send_orderly(&self, message: Message, hash_key: &str) -> SendResult {
        let started = Instant::now();
        let queue_count = match self.dispatcher.queue_count(message.topic()).await {
            Ok(count) => count,
            Err(error) => {
                let result =
                    SendResult::failure(&message, error).with_message_key(Some(hash_key));
                observe(&result, SendMode::Orderly, started);
                return result;
            }
        };

        let queue_id = self.select_queue(hash_key, queue_count);
        internal!(
            topic = %message.topic(),
            hash_key,
            queue_id,
            queue_count,
            "Selected queue for orderly send"
        );

        self.dispatcher
            .send(&message, Routing::Queue(queue_id), SendMode::Orderly)
            .await
            .with_message_key(Some(hash_key))
    }

    #[tracing::instrument(level = "trace", skip_all, fields(topic = %message.topic()))]
    async fn send_delay(&self, message: Message, delay_level: u32) -> SendResult {
        self.dispatcher
            .send(&message, Routing::Delayed(delay_level), SendMode::Delay)
            .await
    }

    #[tracing::instrument(level = "trace", skip_all, fields(topic = %message.topic()))]
    async fn send_in_transaction(&self, message: Message, arg: serde_json::Value) -> SendResult {
        self.dispatcher
            .send(&message, Routing::Transactional(arg), SendMode::Transactional)
            .await
    }
}
