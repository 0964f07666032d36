//! In-process send counters.
//!
//! Unlike the OTLP instruments in `herald_metrics`, these counters can be
//! read back at any time through [`Monitor::report`].

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use herald_common::internal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// When disabled, sends are not counted.
    ///
    /// Default: true
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
        }
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }
}

/// Send attempts and failures, in total and per topic.
#[derive(Debug, Default)]
pub struct Monitor {
    total_sent: AtomicU64,
    total_errors: AtomicU64,
    sent: DashMap<String, AtomicU64>,
    errors: DashMap<String, AtomicU64>,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a send attempt on `topic`.
    pub fn record_sent(&self, topic: &str) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        increment(&self.sent, topic);
    }

    /// Count a failed send on `topic`.
    pub fn record_error(&self, topic: &str) {
        let total = self.total_errors.fetch_add(1, Ordering::Relaxed) + 1;
        increment(&self.errors, topic);

        internal!(level = DEBUG, topic, total_errors = total, "Recorded send error");
    }

    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn report(&self) -> MonitorReport {
        MonitorReport {
            total_sent: self.total_sent(),
            total_errors: self.total_errors(),
            sent_by_topic: snapshot(&self.sent),
            errors_by_topic: snapshot(&self.errors),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_sent.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
        self.sent.clear();
        self.errors.clear();

        internal!(level = INFO, "Send counters reset");
    }
}

fn increment(counters: &DashMap<String, AtomicU64>, topic: &str) {
    if let Some(counter) = counters.get(topic) {
        counter.fetch_add(1, Ordering::Relaxed);
        return;
    }

    counters
        .entry(topic.to_string())
        .or_default()
        .fetch_add(1, Ordering::Relaxed);
}

fn snapshot(counters: &DashMap<String, AtomicU64>) -> BTreeMap<String, u64> {
    counters
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
        .collect()
}

/// Point-in-time copy of the [`Monitor`] counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub total_sent: u64,
    pub total_errors: u64,
    pub sent_by_topic: BTreeMap<String, u64>,
    pub errors_by_topic: BTreeMap<String, u64>,
}

impl MonitorReport {
    /// Percentage of send attempts that did not fail, or 0.0 before the
    /// first attempt.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_sent == 0 {
            return 0.0;
        }

        let succeeded = self.total_sent.saturating_sub(self.total_errors);
        succeeded as f64 / self.total_sent as f64 * 100.0
    }
}
