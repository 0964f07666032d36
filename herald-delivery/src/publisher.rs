//! Send, retry, then dead-letter.

use std::sync::Arc;

use herald_common::internal;
use ulid::Ulid;

use crate::{
    dead_letter::{DeadLetterProcessor, REASON_MAX_RETRIES_EXCEEDED},
    error::SendError,
    message::Message,
    result::SendResult,
    retry::{RetryOutcome, RetryService},
    sender::MessageSender,
};

/// Final state of a [`ReliablePublisher::publish`].
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// Delivered by the first send.
    Sent(SendResult),
    /// Delivered by a resend after `attempts` tries.
    Retried { attempts: u32 },
    /// Parked on the dead-letter topic with `reason`.
    DeadLettered { reason: String },
    /// Stopped without delivery or parking, e.g. after a cancel.
    Abandoned(RetryOutcome),
}

impl PublishOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Sent(_) | Self::Retried { .. })
    }
}

/// Opt-in composition of [`MessageSender`], [`RetryService`] and
/// [`DeadLetterProcessor`].
///
/// A failed send is handed to the retry service until it is delivered or
/// `max_attempts` resends have failed; exhausted and permanently failing
/// messages are parked on their dead-letter topic. The budget is tracked per
/// publish, so evicting the retry context does not reset it.
#[derive(Debug, Clone)]
pub struct ReliablePublisher {
    sender: Arc<dyn MessageSender>,
    retries: RetryService,
    dead_letters: DeadLetterProcessor,
}

impl ReliablePublisher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        retries: RetryService,
        dead_letters: DeadLetterProcessor,
    ) -> Self {
        Self {
            sender,
            retries,
            dead_letters,
        }
    }

    #[must_use]
    pub const fn retries(&self) -> &RetryService {
        &self.retries
    }

    #[must_use]
    pub const fn dead_letters(&self) -> &DeadLetterProcessor {
        &self.dead_letters
    }

    /// Publish `message` under a freshly generated retry id.
    pub async fn publish(&self, message: Message) -> PublishOutcome {
        self.publish_with_id(Ulid::new().to_string(), message).await
    }

    /// Publish `message`, tracking resends under `message_id`.
    pub async fn publish_with_id(&self, message_id: String, message: Message) -> PublishOutcome {
        let result = self.sender.send_sync(message.clone()).await;
        if result.is_success() {
            return PublishOutcome::Sent(result);
        }

        if let Some(error) = result.error()
            && !error.is_retryable()
        {
            return self.park(message, &non_retryable_reason(error)).await;
        }

        // Survives eviction of the retry context
        let mut resends = 0_u32;
        loop {
            let outcome = self
                .retries
                .retry_message(message_id.clone(), message.clone())
                .outcome()
                .await;

            match outcome {
                RetryOutcome::Delivered { .. } => {
                    return PublishOutcome::Retried {
                        attempts: resends + 1,
                    };
                }
                RetryOutcome::Failed { retry_count } => {
                    resends += 1;
                    if self.retries.policy().is_exhausted(resends) {
                        internal!(
                            level = WARN,
                            message_id = %message_id,
                            resends,
                            "Resend budget used up"
                        );
                        self.retries.cancel(&message_id);
                        return self.park(message, REASON_MAX_RETRIES_EXCEEDED).await;
                    }

                    internal!(
                        level = DEBUG,
                        message_id = %message_id,
                        retry_count,
                        resends,
                        "Resend failed, trying again"
                    );
                }
                RetryOutcome::Exhausted { .. } => {
                    return self.park(message, REASON_MAX_RETRIES_EXCEEDED).await;
                }
                RetryOutcome::NotRetryable { error } => {
                    return self.park(message, &non_retryable_reason(&error)).await;
                }
                RetryOutcome::Disabled => {
                    return self.park(message, "retry-disabled").await;
                }
                outcome @ (RetryOutcome::Cancelled | RetryOutcome::Aborted) => {
                    return PublishOutcome::Abandoned(outcome);
                }
            }
        }
    }

    async fn park(&self, message: Message, reason: &str) -> PublishOutcome {
        let topic = message.topic().to_string();
        self.dead_letters
            .process_dead_letter(&topic, message, reason)
            .await;

        PublishOutcome::DeadLettered {
            reason: reason.to_string(),
        }
    }
}

fn non_retryable_reason(error: &SendError) -> String {
    format!("non-retryable: {error}")
}
