//! Per-message send history.
//!
//! Traces are keyed by message id and kept in memory until the cleanup pass
//! finds them older than the retention window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herald_common::{Signal, internal};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::Instant,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// When disabled, nothing is recorded.
    ///
    /// Default: true
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Age after which a trace is evicted (in seconds).
    ///
    /// Default: 259200 (3 days)
    #[serde(default = "defaults::retention_secs")]
    pub retention_secs: u64,

    /// Period of the background cleanup pass (in seconds).
    ///
    /// Default: 3600
    #[serde(default = "defaults::cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            retention_secs: defaults::retention_secs(),
            cleanup_interval_secs: defaults::cleanup_interval_secs(),
        }
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub const fn retention_secs() -> u64 {
        3 * 24 * 60 * 60
    }

    pub const fn cleanup_interval_secs() -> u64 {
        60 * 60
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceKind {
    Send,
    Exception,
}

/// One recorded step in a message's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub at: DateTime<Utc>,
    /// The send mode or operation that produced the event.
    pub operation: String,
    pub error: Option<String>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageTrace {
    pub message_id: String,
    pub topic: String,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
}

#[derive(Debug)]
struct Entry {
    trace: MessageTrace,
    created: Instant,
}

#[derive(Debug)]
pub struct TraceService {
    config: TraceConfig,
    traces: DashMap<String, Entry>,
}

impl TraceService {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            traces: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Record a send of `message_id`, creating its trace on first use.
    pub fn trace_send(
        &self,
        message_id: &str,
        topic: &str,
        tag: Option<&str>,
        operation: &str,
        duration: Duration,
    ) {
        self.push(
            message_id,
            topic,
            tag,
            TraceEvent {
                kind: TraceKind::Send,
                at: Utc::now(),
                operation: operation.to_string(),
                error: None,
                duration: Some(duration),
            },
        );
    }

    /// Record a failed `operation` on `message_id`.
    pub fn trace_exception(&self, message_id: &str, topic: &str, operation: &str, error: &str) {
        self.push(
            message_id,
            topic,
            None,
            TraceEvent {
                kind: TraceKind::Exception,
                at: Utc::now(),
                operation: operation.to_string(),
                error: Some(error.to_string()),
                duration: None,
            },
        );
    }

    fn push(&self, message_id: &str, topic: &str, tag: Option<&str>, event: TraceEvent) {
        if !self.config.enabled {
            return;
        }

        internal!(
            message_id,
            topic,
            kind = ?event.kind,
            operation = %event.operation,
            "Recording trace event"
        );

        self.traces
            .entry(message_id.to_string())
            .or_insert_with(|| Entry {
                trace: MessageTrace {
                    message_id: message_id.to_string(),
                    topic: topic.to_string(),
                    tag: tag.map(str::to_string),
                    created_at: Utc::now(),
                    events: Vec::new(),
                },
                created: Instant::now(),
            })
            .trace
            .events
            .push(event);
    }

    /// The history of `message_id`, if any was recorded.
    #[must_use]
    pub fn trace(&self, message_id: &str) -> Option<MessageTrace> {
        self.traces.get(message_id).map(|entry| entry.trace.clone())
    }

    /// Evict traces older than the retention window and return how many
    /// were removed.
    pub fn cleanup_expired_traces(&self) -> usize {
        let retention = Duration::from_secs(self.config.retention_secs);
        let now = Instant::now();
        let before = self.traces.len();

        self.traces
            .retain(|_, entry| now.saturating_duration_since(entry.created) <= retention);

        let evicted = before.saturating_sub(self.traces.len());
        if evicted > 0 {
            internal!(level = INFO, evicted, "Evicted expired message traces");
        }

        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Run [`TraceService::cleanup_expired_traces`] every cleanup interval
    /// until shutdown is signalled.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let mut timer =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs.max(1)));

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.cleanup_expired_traces();
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            internal!(level = INFO, "Trace cleanup shutting down");
                            break;
                        }
                        Ok(Signal::Finalised) | Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }
}
