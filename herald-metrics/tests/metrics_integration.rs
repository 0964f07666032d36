//! Counter accuracy checks for the metrics collectors
//!
//! These run against the no-op global meter provider, so only the local
//! mirrors are observable.

use herald_metrics::{DeadLetterMetrics, MetricsConfig, ProducerMetrics, RetryMetrics};

#[test]
fn test_producer_counts_successes_and_failures() {
    let metrics = ProducerMetrics::new().expect("Failed to create producer metrics");

    for _ in 0..5 {
        metrics.record_send("sync", true, 0.01);
    }
    metrics.record_send("orderly", false, 0.2);
    metrics.record_one_way_failure("orders.created");

    assert_eq!(metrics.succeeded(), 5);
    assert_eq!(metrics.failed(), 2, "one-way failures count as failures");
}

#[test]
fn test_retry_tracks_exhaustion_and_active_contexts() {
    let metrics = RetryMetrics::new().expect("Failed to create retry metrics");

    metrics.record_scheduled(0.1);
    metrics.record_outcome("failed");
    metrics.record_outcome("exhausted");
    metrics.record_outcome("exhausted");
    metrics.record_outcome("delivered");
    metrics.set_active_contexts(7);
    metrics.record_evicted(3);
    metrics.set_active_contexts(4);

    assert_eq!(metrics.exhausted(), 2);
    assert_eq!(metrics.active_contexts(), 4);
}

#[test]
fn test_dead_letter_counts_only_successful_recoveries() {
    let metrics = DeadLetterMetrics::new().expect("Failed to create dead-letter metrics");

    metrics.record_parked("orders.created", "max-retries-exceeded");
    metrics.record_parked("orders.paid", "non-retryable");
    metrics.record_park_failure("orders.created");
    metrics.record_recovered(true);
    metrics.record_recovered(false);

    assert_eq!(metrics.parked(), 2);
    assert_eq!(metrics.recovered(), 1);
}

#[test]
fn test_metrics_disabled_by_default() {
    let config: MetricsConfig = ron::from_str("()").expect("empty config should parse");
    assert!(!config.enabled);
    assert_eq!(config.endpoint, "http://localhost:4318/v1/metrics");

    herald_metrics::init_metrics(&config).expect("disabled init is a no-op");
    assert!(!herald_metrics::is_enabled());
    assert!(herald_metrics::try_metrics().is_none());
}

#[test]
fn test_invalid_endpoint_fails_before_export() {
    let config = MetricsConfig {
        enabled: true,
        endpoint: "collector:4318".to_string(),
        ..MetricsConfig::default()
    };

    let error = herald_metrics::init_metrics(&config).expect_err("endpoint should be rejected");
    assert!(matches!(error, herald_metrics::MetricsError::InvalidEndpoint { .. }));
    assert!(!herald_metrics::is_enabled());
}
