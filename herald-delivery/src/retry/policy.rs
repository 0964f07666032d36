//! Backoff configuration for resend attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

/// How the wait before a resend grows with the number of failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// `interval` before every attempt
    FixedDelay,
    /// `interval * multiplier^retry_count`
    #[default]
    ExponentialBackoff,
    /// `interval * (retry_count + 1)`
    Custom,
}

/// Retry policy for failed sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// When disabled, `retry_message` resolves immediately without sending.
    ///
    /// Default: true
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Number of failed resends after which a message counts as exhausted.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay (in milliseconds).
    ///
    /// Default: 1000
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,

    /// Growth factor for [`RetryStrategy::ExponentialBackoff`].
    ///
    /// Default: 2.0
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,

    /// Ceiling for any computed delay (in milliseconds).
    ///
    /// Default: 300000 (5 minutes)
    #[serde(default = "defaults::max_interval_ms")]
    pub max_interval_ms: u64,

    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Randomizes delays within ±`jitter_factor`. Must lie in `0.0..=1.0`.
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default, deserialize_with = "deserialize_jitter_factor")]
    pub jitter_factor: f64,

    /// Age after which the cleanup pass evicts a retry context (in seconds).
    ///
    /// Default: `max_interval_ms`
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Period of the background cleanup pass (in seconds).
    ///
    /// Default: 60
    #[serde(default = "defaults::cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            max_attempts: defaults::max_attempts(),
            interval_ms: defaults::interval_ms(),
            multiplier: defaults::multiplier(),
            max_interval_ms: defaults::max_interval_ms(),
            strategy: RetryStrategy::default(),
            jitter_factor: 0.0,
            retention_secs: None,
            cleanup_interval_secs: defaults::cleanup_interval_secs(),
        }
    }
}

impl RetryPolicy {
    /// A policy waiting `interval` before every attempt.
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: duration_millis(interval),
            strategy: RetryStrategy::FixedDelay,
            ..Self::default()
        }
    }

    /// Whether a context with `retry_count` failed resends is used up.
    #[must_use]
    pub const fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }

    /// The wait before the resend following `retry_count` failures.
    ///
    /// Deterministic; see [`RetryPolicy::retry_delay`] for the jittered value.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn calculate_retry_delay(&self, retry_count: u32) -> Duration {
        let interval = self.interval_ms as f64;
        let millis = match self.strategy {
            RetryStrategy::FixedDelay => interval,
            RetryStrategy::ExponentialBackoff => {
                interval * self.multiplier.powi(i32::try_from(retry_count).unwrap_or(i32::MAX))
            }
            RetryStrategy::Custom => interval * (f64::from(retry_count) + 1.0),
        };

        let ceiling = self.max_interval_ms;
        if !millis.is_finite() || millis >= ceiling as f64 {
            return Duration::from_millis(ceiling);
        }

        Duration::from_millis(millis.max(0.0).round() as u64)
    }

    /// [`RetryPolicy::calculate_retry_delay`] with jitter applied.
    ///
    /// The jittered delay never exceeds `max_interval_ms`. A jitter factor
    /// outside `0.0..=1.0` is clamped, and a non-finite one disables jitter.
    #[must_use]
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let delay = self.calculate_retry_delay(retry_count);
        let factor = self.effective_jitter();
        if factor <= 0.0 {
            return delay;
        }

        let jitter_range = delay.as_secs_f64() * factor;
        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        let jittered = Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0));

        jittered.min(Duration::from_millis(self.max_interval_ms))
    }

    fn effective_jitter(&self) -> f64 {
        if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// How long a context may live before the cleanup pass evicts it.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention_secs.map_or_else(
            || Duration::from_millis(self.max_interval_ms),
            Duration::from_secs,
        )
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

fn deserialize_jitter_factor<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let factor = f64::deserialize(deserializer)?;
    if factor.is_finite() && (0.0..=1.0).contains(&factor) {
        Ok(factor)
    } else {
        Err(serde::de::Error::custom(format!(
            "jitter_factor must be within 0.0..=1.0, got {factor}"
        )))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn interval_ms() -> u64 {
        1000
    }

    pub const fn multiplier() -> f64 {
        2.0
    }

    pub const fn max_interval_ms() -> u64 {
        300_000 // 5 minutes
    }

    pub const fn cleanup_interval_secs() -> u64 {
        60
    }
}
