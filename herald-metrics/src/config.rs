//! Metrics configuration

use std::time::Duration;

use serde::Deserialize;

use crate::MetricsError;

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// When disabled, every recording call is skipped by the callers.
    ///
    /// Default: false
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// OTLP/HTTP collector endpoint the send, retry and dead-letter
    /// instruments are pushed to.
    ///
    /// Default: `http://localhost:4318/v1/metrics`
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Period between two pushes (in seconds).
    ///
    /// Default: 30
    #[serde(default = "defaults::export_interval_secs")]
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            endpoint: defaults::endpoint(),
            export_interval_secs: defaults::export_interval_secs(),
        }
    }
}

impl MetricsConfig {
    #[must_use]
    pub const fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs)
    }

    /// Check the endpoint and export interval before any exporter is built.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidEndpoint`] unless the endpoint is an
    /// `http` or `https` URL, and [`MetricsError::InvalidExportInterval`] for
    /// a zero interval.
    pub fn validate(&self) -> Result<(), MetricsError> {
        let endpoint = self.endpoint.trim();
        let host = endpoint
            .strip_prefix("http://")
            .or_else(|| endpoint.strip_prefix("https://"))
            .ok_or_else(|| MetricsError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "expected an http:// or https:// URL",
            })?;

        if host.is_empty() || host.starts_with('/') {
            return Err(MetricsError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "missing host",
            });
        }

        if self.export_interval_secs == 0 {
            return Err(MetricsError::InvalidExportInterval);
        }

        Ok(())
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        false
    }

    pub fn endpoint() -> String {
        "http://localhost:4318/v1/metrics".to_string()
    }

    pub const fn export_interval_secs() -> u64 {
        30
    }
}
