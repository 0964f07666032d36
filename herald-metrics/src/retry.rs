//! Retry service metrics
//!
//! Tracks the lifecycle of retry contexts: resends scheduled, their outcome,
//! exhaustion, eviction by the cleanup pass, and the number of live contexts.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Retry metrics collector
#[derive(Debug)]
pub struct RetryMetrics {
    /// Total number of resends scheduled
    scheduled_total: Counter<u64>,

    /// Total number of resend outcomes by result
    outcomes_total: Counter<u64>,

    /// Distribution of the backoff delay applied before a resend
    delay_seconds: Histogram<f64>,

    /// Number of contexts evicted by the cleanup pass
    evicted_total: Counter<u64>,

    // Shared with the observable gauge callback
    active_contexts: Arc<AtomicU64>,
    exhausted: AtomicU64,
}

impl RetryMetrics {
    /// Create a new retry metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let scheduled_total = meter
            .u64_counter("herald.retry.scheduled.total")
            .with_description("Total number of resends scheduled")
            .build();

        let outcomes_total = meter
            .u64_counter("herald.retry.outcomes.total")
            .with_description("Total number of resend outcomes by result")
            .build();

        let delay_seconds = meter
            .f64_histogram("herald.retry.delay.seconds")
            .with_description("Backoff delay applied before a resend")
            .build();

        let evicted_total = meter
            .u64_counter("herald.retry.contexts.evicted.total")
            .with_description("Retry contexts evicted by the cleanup pass")
            .build();

        let active_contexts = Arc::new(AtomicU64::new(0));
        let active = active_contexts.clone();

        meter
            .u64_observable_gauge("herald.retry.contexts.active")
            .with_description("Current number of live retry contexts")
            .with_callback(move |observer| {
                observer.observe(active.load(Ordering::Relaxed), &[]);
            })
            .build();

        Ok(Self {
            scheduled_total,
            outcomes_total,
            delay_seconds,
            evicted_total,
            active_contexts,
            exhausted: AtomicU64::new(0),
        })
    }

    /// Record a resend scheduled after `delay_secs`
    pub fn record_scheduled(&self, delay_secs: f64) {
        self.scheduled_total.add(1, &[]);
        self.delay_seconds.record(delay_secs, &[]);
    }

    /// Record how a retry resolved (`delivered`, `failed`, `exhausted`, ...)
    pub fn record_outcome(&self, outcome: &'static str) {
        self.outcomes_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
        if outcome == "exhausted" {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record contexts evicted by a cleanup pass
    pub fn record_evicted(&self, count: u64) {
        if count > 0 {
            self.evicted_total.add(count, &[]);
        }
    }

    /// Publish the current number of live contexts
    pub fn set_active_contexts(&self, count: u64) {
        self.active_contexts.store(count, Ordering::Relaxed);
    }

    /// Current number of live contexts as last published
    #[must_use]
    pub fn active_contexts(&self) -> u64 {
        self.active_contexts.load(Ordering::Relaxed)
    }

    /// Number of messages that ran out of attempts
    #[must_use]
    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.retry")
}
