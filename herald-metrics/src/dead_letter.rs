//! Dead-letter metrics

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

use crate::MetricsError;

/// Dead-letter metrics collector
#[derive(Debug)]
pub struct DeadLetterMetrics {
    /// Messages parked on a dead-letter topic, by original topic
    parked_total: Counter<u64>,

    /// Dead-letter publishes that themselves failed
    park_failures_total: Counter<u64>,

    /// Messages moved back from a dead-letter topic
    recovered_total: Counter<u64>,

    parked: AtomicU64,
    recovered: AtomicU64,
}

impl DeadLetterMetrics {
    /// Create a new dead-letter metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let parked_total = meter
            .u64_counter("herald.dead_letter.parked.total")
            .with_description("Messages parked on a dead-letter topic")
            .build();

        let park_failures_total = meter
            .u64_counter("herald.dead_letter.park.failures.total")
            .with_description("Dead-letter publishes that failed")
            .build();

        let recovered_total = meter
            .u64_counter("herald.dead_letter.recovered.total")
            .with_description("Messages resent from a dead-letter topic")
            .build();

        Ok(Self {
            parked_total,
            park_failures_total,
            recovered_total,
            parked: AtomicU64::new(0),
            recovered: AtomicU64::new(0),
        })
    }

    /// Record a message parked on its dead-letter topic
    pub fn record_parked(&self, original_topic: &str, reason: &str) {
        self.parked_total.add(
            1,
            &[
                KeyValue::new("topic", original_topic.to_string()),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
        self.parked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dead-letter publish that failed
    pub fn record_park_failure(&self, original_topic: &str) {
        self.park_failures_total
            .add(1, &[KeyValue::new("topic", original_topic.to_string())]);
    }

    /// Record a message resent to its original topic
    pub fn record_recovered(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.recovered_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
        if success {
            self.recovered.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn parked(&self) -> u64 {
        self.parked.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn recovered(&self) -> u64 {
        self.recovered.load(Ordering::Relaxed)
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.dead_letter")
}
