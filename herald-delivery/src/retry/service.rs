use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use dashmap::DashMap;
use futures_util::FutureExt;
use herald_common::{Signal, internal};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::Instant,
};

use super::{
    RetryPolicy,
    context::{RetryContext, RetryContextSnapshot},
};
use crate::{error::SendError, message::Message, sender::MessageSender};

/// How a single `retry_message` call ended.
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    /// The resend succeeded and the context was removed.
    Delivered { attempts: u32 },
    /// The resend failed; the context stays for the next call.
    Failed { retry_count: u32 },
    /// The attempt budget was used up and the context was removed.
    Exhausted { retry_count: u32 },
    /// The resend failed permanently and the context was removed.
    NotRetryable { error: Arc<SendError> },
    /// The context was cancelled before the resend went out.
    Cancelled,
    /// Retries are switched off.
    Disabled,
    /// The retry task was torn down before finishing.
    Aborted,
}

impl RetryOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether the message should now be parked on its dead-letter topic.
    #[must_use]
    pub const fn should_dead_letter(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::NotRetryable { .. })
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Failed { .. } => "failed",
            Self::Exhausted { .. } => "exhausted",
            Self::NotRetryable { .. } => "not_retryable",
            Self::Cancelled => "cancelled",
            Self::Disabled => "disabled",
            Self::Aborted => "aborted",
        }
    }
}

/// A scheduled resend.
///
/// Awaiting the handle yields `true` only if the resend was delivered; use
/// [`RetryHandle::outcome`] for the reason behind a `false`. Dropping the
/// handle does not stop the resend.
#[derive(Debug)]
pub struct RetryHandle {
    state: HandleState,
}

#[derive(Debug)]
enum HandleState {
    Ready(Option<RetryOutcome>),
    Spawned(JoinHandle<RetryOutcome>),
}

impl RetryHandle {
    const fn ready(outcome: RetryOutcome) -> Self {
        Self {
            state: HandleState::Ready(Some(outcome)),
        }
    }

    pub async fn outcome(mut self) -> RetryOutcome {
        std::future::poll_fn(|cx| self.poll_outcome(cx)).await
    }

    fn poll_outcome(&mut self, cx: &mut Context<'_>) -> Poll<RetryOutcome> {
        match &mut self.state {
            HandleState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(RetryOutcome::Aborted))
            }
            HandleState::Spawned(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or(RetryOutcome::Aborted)),
        }
    }
}

impl Future for RetryHandle {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.poll_outcome(cx).map(|outcome| outcome.is_delivered())
    }
}

struct Inner {
    sender: Arc<dyn MessageSender>,
    policy: RetryPolicy,
    contexts: DashMap<String, Arc<RetryContext>>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryService")
            .field("policy", &self.policy)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}

/// Bounded, backed-off resending of failed messages
///
/// Contexts are keyed by message id; at most one exists per id, and attempts
/// for the same id run one at a time. Cloning the service shares the same
/// context map.
#[derive(Debug, Clone)]
pub struct RetryService {
    inner: Arc<Inner>,
}

impl RetryService {
    pub fn new(sender: Arc<dyn MessageSender>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                sender,
                policy,
                contexts: DashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Schedule a resend of `message` under `message_id`
    ///
    /// The first call for an id creates its context with the given message;
    /// later calls reuse the stored message until the context is removed.
    /// Returns immediately; the backoff delay and the send run on a spawned
    /// task. Must be called from within a tokio runtime.
    #[tracing::instrument(level = "debug", skip_all, fields(topic = %message.topic()))]
    pub fn retry_message(&self, message_id: impl Into<String>, message: Message) -> RetryHandle {
        if !self.inner.policy.enabled {
            internal!(level = DEBUG, "Retries disabled, not scheduling resend");
            return RetryHandle::ready(RetryOutcome::Disabled);
        }

        let message_id = message_id.into();
        let context = Arc::clone(
            self.inner
                .contexts
                .entry(message_id.clone())
                .or_insert_with(|| Arc::new(RetryContext::new(message_id, message)))
                .value(),
        );
        self.report_active();

        let service = self.clone();
        RetryHandle {
            state: HandleState::Spawned(tokio::spawn(async move {
                let outcome = service.attempt(&context).await;

                if herald_metrics::is_enabled() {
                    herald_metrics::metrics().retry.record_outcome(outcome.as_str());
                }
                outcome
            })),
        }
    }

    async fn attempt(&self, context: &Arc<RetryContext>) -> RetryOutcome {
        let guard = context.begin_attempt().await;

        if let Some(outcome) = context.retired() {
            return outcome;
        }

        let retry_count = context.retry_count();
        if self.inner.policy.is_exhausted(retry_count) {
            internal!(
                level = WARN,
                message_id = %context.message_id(),
                retry_count,
                "Retry attempts exhausted"
            );
            return self.retire(context, RetryOutcome::Exhausted { retry_count });
        }

        let delay = self.inner.policy.retry_delay(retry_count);
        internal!(
            level = DEBUG,
            message_id = %context.message_id(),
            retry_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling resend"
        );

        if herald_metrics::is_enabled() {
            herald_metrics::metrics()
                .retry
                .record_scheduled(delay.as_secs_f64());
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = context.cancelled() => {
                internal!(
                    level = DEBUG,
                    message_id = %context.message_id(),
                    "Resend cancelled"
                );
                return RetryOutcome::Cancelled;
            }
        }

        let sent = AssertUnwindSafe(self.inner.sender.send_sync(context.message().clone()))
            .catch_unwind()
            .await;

        match sent {
            Ok(result) if result.is_success() => {
                internal!(
                    level = INFO,
                    message_id = %context.message_id(),
                    attempts = retry_count + 1,
                    "Resend delivered"
                );
                self.retire(
                    context,
                    RetryOutcome::Delivered {
                        attempts: retry_count + 1,
                    },
                )
            }
            Ok(result) => match result.shared_error() {
                Some(error) if !error.is_retryable() => {
                    internal!(
                        level = WARN,
                        message_id = %context.message_id(),
                        error = %error,
                        "Resend failed permanently"
                    );
                    self.retire(context, RetryOutcome::NotRetryable { error })
                }
                _ => {
                    let retry_count = context.record_failure(&guard);
                    internal!(
                        level = WARN,
                        message_id = %context.message_id(),
                        retry_count,
                        error = result.error_message().unwrap_or_default(),
                        "Resend failed"
                    );
                    RetryOutcome::Failed { retry_count }
                }
            },
            Err(_) => {
                let retry_count = context.record_failure(&guard);
                internal!(
                    level = ERROR,
                    message_id = %context.message_id(),
                    retry_count,
                    "Sender panicked during resend"
                );
                RetryOutcome::Failed { retry_count }
            }
        }
    }

    /// Remove `context` from the map if it is still the live one.
    fn retire(&self, context: &Arc<RetryContext>, outcome: RetryOutcome) -> RetryOutcome {
        context.retire(&outcome);
        self.inner
            .contexts
            .remove_if(context.message_id(), |_, live| Arc::ptr_eq(live, context));
        self.report_active();
        outcome
    }

    /// Drop the context for `message_id` and wake a resend waiting on its
    /// backoff delay, which then resolves to [`RetryOutcome::Cancelled`].
    ///
    /// Returns `false` if no context existed.
    pub fn cancel(&self, message_id: &str) -> bool {
        let Some((_, context)) = self.inner.contexts.remove(message_id) else {
            return false;
        };

        context.retire(&RetryOutcome::Cancelled);
        context.cancel();
        self.report_active();

        internal!(level = DEBUG, message_id, "Retry context cancelled");
        true
    }

    /// Evict every context older than the retention window, whatever its
    /// retry count. Resends already in flight are left to finish.
    ///
    /// Returns the number of evicted contexts.
    pub fn cleanup_expired_retries(&self) -> usize {
        let retention = self.inner.policy.retention();
        let now = Instant::now();
        let mut evicted = 0;

        self.inner.contexts.retain(|_, context| {
            let expired = context.age(now) > retention;
            if expired {
                evicted += 1;
            }
            !expired
        });

        if evicted > 0 {
            internal!(
                level = INFO,
                evicted,
                retention_secs = retention.as_secs(),
                "Evicted expired retry contexts"
            );

            if herald_metrics::is_enabled() {
                herald_metrics::metrics().retry.record_evicted(evicted as u64);
            }
        }
        self.report_active();

        evicted
    }

    /// Snapshot of the live context for `message_id`.
    #[must_use]
    pub fn context(&self, message_id: &str) -> Option<RetryContextSnapshot> {
        self.inner
            .contexts
            .get(message_id)
            .map(|context| context.snapshot())
    }

    /// Number of live retry contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.contexts.is_empty()
    }

    fn report_active(&self) {
        if herald_metrics::is_enabled() {
            herald_metrics::metrics()
                .retry
                .set_active_contexts(self.len() as u64);
        }
    }

    /// Run [`RetryService::cleanup_expired_retries`] every cleanup interval
    /// until shutdown is signalled.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let cleanup_interval = self.inner.policy.cleanup_interval();
        internal!(
            level = INFO,
            interval_secs = cleanup_interval.as_secs(),
            "Retry cleanup starting"
        );

        let mut timer = tokio::time::interval(cleanup_interval);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let evicted = self.cleanup_expired_retries();
                    internal!(evicted, live = self.len(), "Retry cleanup pass finished");
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            internal!(level = INFO, "Retry cleanup shutting down");
                            break;
                        }
                        Ok(Signal::Finalised) | Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }
}
