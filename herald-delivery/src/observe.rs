//! A [`MessageSender`] decorator feeding the [`TraceService`] and the
//! [`Monitor`] from every send passing through it.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;

use crate::{
    error::SendError,
    message::Message,
    monitor::Monitor,
    result::SendResult,
    sender::{MessageSender, PendingSend, SendMode},
    trace::TraceService,
};

/// Where a send was headed, captured before the message moves into the
/// inner sender.
#[derive(Debug)]
struct Origin {
    topic: String,
    tag: Option<String>,
    key: Option<String>,
}

impl Origin {
    fn of(message: &Message) -> Self {
        Self {
            topic: message.topic().to_string(),
            tag: message.tag().map(str::to_string),
            key: message.key().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Observer {
    traces: Option<Arc<TraceService>>,
    monitor: Option<Arc<Monitor>>,
}

impl Observer {
    fn completed(&self, origin: &Origin, mode: SendMode, result: &SendResult, started: Instant) {
        if result.is_success() {
            self.count(origin, true);

            let id = origin.key.as_deref().or_else(|| result.message_id());
            if let (Some(traces), Some(id)) = (&self.traces, id) {
                traces.trace_send(
                    id,
                    &origin.topic,
                    origin.tag.as_deref(),
                    mode.as_str(),
                    started.elapsed(),
                );
            }
        } else {
            self.failed(
                origin,
                mode,
                result.error_message().unwrap_or(result.status().as_str()),
            );
        }
    }

    fn failed(&self, origin: &Origin, mode: SendMode, error: &str) {
        self.count(origin, false);

        if let (Some(traces), Some(id)) = (&self.traces, origin.key.as_deref()) {
            traces.trace_exception(id, &origin.topic, mode.as_str(), error);
        }
    }

    fn count(&self, origin: &Origin, success: bool) {
        if let Some(monitor) = &self.monitor {
            monitor.record_sent(&origin.topic);
            if !success {
                monitor.record_error(&origin.topic);
            }
        }
    }
}

/// Wraps another [`MessageSender`] and records each outcome.
///
/// Every attempt is counted on the [`Monitor`]. Traces are keyed by the
/// message key, falling back to the broker-assigned id for successful sends;
/// failed sends of keyless messages are only counted. One-way sends report
/// no outcome and are counted as attempts only.
#[derive(Debug, Clone)]
pub struct ObservedSender {
    inner: Arc<dyn MessageSender>,
    observer: Observer,
}

impl ObservedSender {
    pub fn new(inner: Arc<dyn MessageSender>) -> Self {
        Self {
            inner,
            observer: Observer::default(),
        }
    }

    #[must_use]
    pub fn with_traces(mut self, traces: Arc<TraceService>) -> Self {
        self.observer.traces = Some(traces);
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<Monitor>) -> Self {
        self.observer.monitor = Some(monitor);
        self
    }
}

#[async_trait]
impl MessageSender for ObservedSender {
    async fn send_sync(&self, message: Message) -> SendResult {
        let origin = Origin::of(&message);
        let started = Instant::now();
        let result = self.inner.send_sync(message).await;
        self.observer
            .completed(&origin, SendMode::Sync, &result, started);
        result
    }

    fn send_async(&self, message: Message) -> PendingSend {
        let origin = Origin::of(&message);
        let started = Instant::now();
        let pending = self.inner.send_async(message);
        let observer = self.observer.clone();

        PendingSend::spawn(async move {
            let outcome: Result<SendResult, SendError> = pending.await;
            match &outcome {
                Ok(result) => observer.completed(&origin, SendMode::Async, result, started),
                Err(error) => observer.failed(&origin, SendMode::Async, &error.to_string()),
            }
            outcome
        })
    }

    fn send_one_way(&self, message: Message) {
        self.observer.count(&Origin::of(&message), true);
        self.inner.send_one_way(message);
    }

    async fn send_orderly(&self, message: Message, hash_key: &str) -> SendResult {
        let origin = Origin::of(&message);
        let started = Instant::now();
        let result = self.inner.send_orderly(message, hash_key).await;
        self.observer
            .completed(&origin, SendMode::Orderly, &result, started);
        result
    }

    async fn send_delay(&self, message: Message, delay_level: u32) -> SendResult {
        let origin = Origin::of(&message);
        let started = Instant::now();
        let result = self.inner.send_delay(message, delay_level).await;
        self.observer
            .completed(&origin, SendMode::Delay, &result, started);
        result
    }

    async fn send_in_transaction(&self, message: Message, arg: serde_json::Value) -> SendResult {
        let origin = Origin::of(&message);
        let started = Instant::now();
        let result = self.inner.send_in_transaction(message, arg).await;
        self.observer
            .completed(&origin, SendMode::Transactional, &result, started);
        result
    }
}
