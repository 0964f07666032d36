use thiserror::Error;

/// Why the metrics pipeline could not be started
#[derive(Debug, Error)]
pub enum MetricsError {
    /// `init_metrics` already ran in this process
    #[error("Metrics already initialized")]
    AlreadyInitialized,

    #[error("Invalid OTLP endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        endpoint: String,
        reason: &'static str,
    },

    #[error("Metrics export interval must be at least one second")]
    InvalidExportInterval,

    #[error("Failed to build OTLP exporter for {endpoint}: {reason}")]
    Exporter { endpoint: String, reason: String },
}
