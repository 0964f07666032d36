use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    time::Instant,
};

use super::RetryOutcome;
use crate::message::Message;

/// Retry bookkeeping for one message id.
///
/// `retry_count` is only written while `attempt` is held. Once retired,
/// attempts still queued on the context resolve to the recorded outcome.
#[derive(Debug)]
pub(crate) struct RetryContext {
    message_id: String,
    message: Message,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    retry_count: AtomicU32,
    attempt: Mutex<()>,
    cancel: watch::Sender<bool>,
    retired: parking_lot::Mutex<Option<RetryOutcome>>,
}

impl RetryContext {
    pub(crate) fn new(message_id: String, message: Message) -> Self {
        Self {
            message_id,
            message,
            created_at: Instant::now(),
            created_wall: Utc::now(),
            retry_count: AtomicU32::new(0),
            attempt: Mutex::new(()),
            cancel: watch::Sender::new(false),
            retired: parking_lot::Mutex::new(None),
        }
    }

    pub(crate) fn message_id(&self) -> &str {
        &self.message_id
    }

    pub(crate) const fn message(&self) -> &Message {
        &self.message
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    /// Record a failed attempt. Requires the attempt guard.
    pub(crate) fn record_failure(&self, _attempt: &MutexGuard<'_, ()>) -> u32 {
        self.retry_count.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Serializes check, delay, send and update for this message id.
    pub(crate) async fn begin_attempt(&self) -> MutexGuard<'_, ()> {
        self.attempt.lock().await
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once [`RetryContext::cancel`] has been called.
    pub(crate) async fn cancelled(&self) {
        let mut receiver = self.cancel.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Record the final outcome. The first recorded outcome wins.
    pub(crate) fn retire(&self, outcome: &RetryOutcome) {
        self.retired.lock().get_or_insert_with(|| outcome.clone());
    }

    pub(crate) fn retired(&self) -> Option<RetryOutcome> {
        self.retired.lock().clone()
    }

    pub(crate) fn snapshot(&self) -> RetryContextSnapshot {
        RetryContextSnapshot {
            message_id: self.message_id.clone(),
            topic: self.message.topic().to_string(),
            retry_count: self.retry_count(),
            created_at: self.created_wall,
            age: self.age(Instant::now()),
        }
    }
}

/// Point-in-time view of a live retry context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContextSnapshot {
    pub message_id: String,
    pub topic: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub age: Duration,
}
