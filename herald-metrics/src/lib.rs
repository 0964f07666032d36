//! OpenTelemetry metrics for the herald delivery layer
//!
//! Metrics are pushed over OTLP/HTTP to an OpenTelemetry Collector.
//!
//! - **Producer**: sends by mode and outcome, send latency
//! - **Retry**: resends scheduled, outcomes, exhaustion, evictions, live contexts
//! - **Dead letter**: messages parked, park failures, recoveries
//!
//! Recording sites check [`is_enabled`] first, so nothing is recorded until
//! [`init_metrics`] has run with an enabled configuration.
//!
//! ```rust,no_run
//! use herald_metrics::{init_metrics, MetricsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_metrics(&MetricsConfig {
//!     enabled: true,
//!     endpoint: "http://localhost:4318/v1/metrics".to_string(),
//!     ..MetricsConfig::default()
//! })?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dead_letter;
mod error;
mod exporter;
mod producer;
mod retry;

pub use config::MetricsConfig;
pub use dead_letter::DeadLetterMetrics;
pub use error::MetricsError;
use once_cell::sync::OnceCell;
pub use producer::ProducerMetrics;
pub use retry::RetryMetrics;

static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub producer: ProducerMetrics,
    pub retry: RetryMetrics,
    pub dead_letter: DeadLetterMetrics,
}

impl Metrics {
    /// Create every instrument against the current global meter provider
    ///
    /// # Errors
    ///
    /// Returns an error if any instrument cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            producer: ProducerMetrics::new()?,
            retry: RetryMetrics::new()?,
            dead_letter: DeadLetterMetrics::new()?,
        })
    }
}

/// Initialize the metrics system
///
/// A no-op when metrics are disabled in `config`.
///
/// # Errors
///
/// Returns an error if `config` is invalid, the exporter cannot be built, or
/// metrics were already initialized.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    if METRICS_INSTANCE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }
    config.validate()?;

    tracing::info!(
        endpoint = %config.endpoint,
        interval_secs = config.export_interval_secs,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::meter_provider(config)?;
    opentelemetry::global::set_meter_provider(provider);

    METRICS_INSTANCE
        .set(Metrics::new()?)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// Get a reference to the global metrics instance
///
/// # Panics
///
/// Panics if metrics have not been initialized via `init_metrics()`.
#[must_use]
#[allow(clippy::expect_used)]
pub fn metrics() -> &'static Metrics {
    METRICS_INSTANCE
        .get()
        .expect("Metrics not initialized. Call init_metrics() first.")
}

/// Get the global metrics instance if it has been initialized
#[must_use]
pub fn try_metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

/// Check if metrics are enabled
#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
