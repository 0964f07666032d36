//! Producer metrics
//!
//! Tracks publishes to the broker:
//! - Send attempts by mode and outcome
//! - Send latency by mode
//! - One-way sends whose failure was swallowed

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Producer metrics collector
#[derive(Debug)]
pub struct ProducerMetrics {
    /// Total number of sends by mode and outcome
    sends_total: Counter<u64>,

    /// Distribution of send durations by mode
    duration_seconds: Histogram<f64>,

    /// Total number of one-way sends that failed silently
    one_way_failures: Counter<u64>,

    // Local mirrors so callers and tests can read totals back
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ProducerMetrics {
    /// Create a new producer metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let sends_total = meter
            .u64_counter("herald.producer.sends.total")
            .with_description("Total number of sends by mode and outcome")
            .build();

        let duration_seconds = meter
            .f64_histogram("herald.producer.send.duration.seconds")
            .with_description("Distribution of send durations by mode")
            .build();

        let one_way_failures = meter
            .u64_counter("herald.producer.one_way.failures.total")
            .with_description("Total number of one-way sends that failed")
            .build();

        Ok(Self {
            sends_total,
            duration_seconds,
            one_way_failures,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Record the outcome of a single send
    pub fn record_send(&self, mode: &'static str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        let attributes = [KeyValue::new("mode", mode), KeyValue::new("outcome", outcome)];

        self.sends_total.add(1, &attributes);
        self.duration_seconds
            .record(duration_secs, &[KeyValue::new("mode", mode)]);

        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a one-way send whose error was logged and dropped
    pub fn record_one_way_failure(&self, topic: &str) {
        self.one_way_failures
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of sends recorded as successful
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Number of sends recorded as failed (including one-way failures)
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.producer")
}
