//! Configuration loading and controller wiring

use std::{io::Write, sync::Arc, time::Duration};

use herald::{
    ConfigError, Herald,
    config::{from_path, from_ron, locate},
    delivery::{
        BrokerError, DomainEvent, FailureStrategy, MemoryBroker, Message, PublishOutcome,
        RetryPolicy, RetryStrategy, TestBroker,
    },
};
use pretty_assertions::assert_eq;

const FULL_CONFIG: &str = r#"
(
    producer: (
        group: "orders_producer",
        send_timeout_ms: 1500,
        max_message_size: 1024,
    ),
    retry: (
        max_attempts: 5,
        interval_ms: 250,
        multiplier: 3.0,
        max_interval_ms: 10000,
        strategy: Custom,
        retention_secs: Some(120),
        cleanup_interval_secs: 30,
        jitter_factor: 0.1,
    ),
    dead_letter: (
        topic_suffix: ".DLQ",
        tag: "parked",
    ),
    serialization: (
        pretty: true,
    ),
    event: (
        topic_prefix: "shop_",
        failure_strategy: Retry,
    ),
    trace: (
        retention_secs: 3600,
        cleanup_interval_secs: 300,
    ),
    monitor: (
        enabled: false,
    ),
    metrics: (
        enabled: false,
        export_interval_secs: 10,
    ),
)
"#;

#[test]
fn test_full_config() {
    let herald = from_ron(FULL_CONFIG).expect("config should parse");

    assert_eq!(herald.producer.group, "orders_producer");
    assert_eq!(herald.producer.send_timeout(), Duration::from_millis(1500));
    assert_eq!(herald.producer.max_message_size, 1024);

    assert_eq!(herald.retry.max_attempts, 5);
    assert_eq!(herald.retry.interval_ms, 250);
    assert_eq!(herald.retry.strategy, RetryStrategy::Custom);
    assert_eq!(herald.retry.retention(), Duration::from_secs(120));
    assert_eq!(herald.retry.cleanup_interval(), Duration::from_secs(30));
    assert!(herald.retry.enabled);

    assert_eq!(herald.dead_letter.topic_suffix, ".DLQ");
    assert_eq!(herald.dead_letter.tag, "parked");
    assert!(herald.dead_letter.enabled);

    assert!(herald.serialization.pretty);

    assert_eq!(herald.event.topic_prefix, "shop_");
    assert_eq!(herald.event.failure_strategy, FailureStrategy::Retry);
    assert_eq!(herald.trace.retention_secs, 3600);
    assert_eq!(herald.trace.cleanup_interval_secs, 300);
    assert!(herald.trace.enabled);
    assert!(!herald.monitor.enabled);

    assert!(!herald.metrics.enabled);
    assert_eq!(herald.metrics.export_interval_secs, 10);
}

#[test]
fn test_empty_config_uses_defaults() {
    let herald = from_ron("()").expect("empty config should parse");

    assert_eq!(herald.producer.send_timeout(), Duration::from_secs(3));
    assert_eq!(herald.producer.max_message_size, 4 * 1024 * 1024);
    assert_eq!(herald.retry.max_attempts, 3);
    assert_eq!(herald.retry.interval_ms, 1000);
    assert_eq!(herald.retry.max_interval_ms, 300_000);
    assert_eq!(herald.retry.strategy, RetryStrategy::ExponentialBackoff);
    assert_eq!(herald.dead_letter.topic_suffix, "_DLQ");
    assert_eq!(herald.dead_letter.tag, "dead-letter");
    assert!(!herald.serialization.pretty);
    assert_eq!(herald.event.topic_prefix, "herald_event_");
    assert_eq!(herald.event.failure_strategy, FailureStrategy::LogAndIgnore);
    assert_eq!(herald.trace.retention_secs, 3 * 24 * 60 * 60);
    assert!(herald.monitor.enabled);
}

#[test]
fn test_invalid_config() {
    let err = from_ron("(retry: (strategy: Sometimes))").expect_err("unknown strategy");
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_from_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"(retry: (max_attempts: 9))").expect("write config");

    let herald = from_path(file.path()).expect("config should load");
    assert_eq!(herald.retry.max_attempts, 9);
}

#[test]
fn test_from_missing_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = from_path(&dir.path().join("absent.ron")).expect_err("file is missing");
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_env_path_takes_precedence() {
    let dir = tempfile::tempdir().expect("temp dir");
    let from_env = dir.path().join("env.ron");
    let fallback = dir.path().join("fallback.ron");
    std::fs::write(&from_env, "()").expect("write config");
    std::fs::write(&fallback, "()").expect("write config");

    let found = locate(
        Some(from_env.display().to_string()),
        std::slice::from_ref(&fallback),
    )
    .expect("env path exists");
    assert_eq!(found, from_env);
}

#[test]
fn test_env_path_must_exist() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.ron");

    let err = locate(Some(missing.display().to_string()), &[]).expect_err("env path is missing");
    assert!(matches!(err, ConfigError::MissingEnvPath(path) if path == missing));
}

#[test]
fn test_first_existing_default_wins() {
    let dir = tempfile::tempdir().expect("temp dir");
    let absent = dir.path().join("absent.ron");
    let second = dir.path().join("second.ron");
    let third = dir.path().join("third.ron");
    std::fs::write(&second, "()").expect("write config");
    std::fs::write(&third, "()").expect("write config");

    let found = locate(None, &[absent, second.clone(), third]).expect("a default exists");
    assert_eq!(found, second);
}

#[test]
fn test_nothing_found_lists_paths() {
    let dir = tempfile::tempdir().expect("temp dir");
    let absent = dir.path().join("absent.ron");

    let err = locate(None, std::slice::from_ref(&absent)).expect_err("nothing exists");
    let message = err.to_string();
    assert!(message.contains("HERALD_CONFIG"));
    assert!(message.contains(&absent.display().to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_build_wires_a_working_publisher() {
    let broker = MemoryBroker::new();
    let herald = from_ron(FULL_CONFIG).expect("config should parse");
    let delivery = herald.build(Arc::new(broker.clone()));

    let outcome = delivery
        .publisher
        .publish(Message::new("orders.created", b"{}".to_vec()))
        .await;

    assert!(matches!(outcome, PublishOutcome::Sent(_)));
    assert_eq!(broker.records("orders.created").len(), 1);
    assert_eq!(
        broker.records("orders.created")[0].request.producer_group,
        "orders_producer"
    );
    assert_eq!(
        delivery.dead_letters.dead_letter_topic("orders.created"),
        "orders.created.DLQ"
    );
}

#[tokio::test]
async fn test_build_observes_every_component() {
    let broker = MemoryBroker::new();
    let herald = from_ron("()").expect("empty config should parse");
    let delivery = herald.build(Arc::new(broker.clone()));

    let event = DomainEvent::new("OrderCreated", 7);
    delivery.events.publish(&event).await.expect("event publish failed");
    delivery
        .publisher
        .publish(Message::new("orders.created", b"{}".to_vec()).with_key("order-7"))
        .await;

    assert_eq!(broker.records("herald_event_order_created").len(), 1);
    assert!(delivery.traces.trace(&event.event_id).is_some());
    assert!(delivery.traces.trace("order-7").is_some());
    assert_eq!(delivery.monitor.total_sent(), 2);
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let running = Herald::default()
        .start(Arc::new(MemoryBroker::new()))
        .expect("controller failed to start");

    tokio::time::timeout(Duration::from_secs(10), running.run_until(async { Ok(()) }))
        .await
        .expect("controller did not stop")
        .expect("controller failed");
}

#[tokio::test(start_paused = true)]
async fn test_running_cleanup_serves_the_returned_stack() {
    let broker = TestBroker::new();
    broker.fail_always(BrokerError::Unavailable("down".to_string()));
    let herald = Herald {
        retry: RetryPolicy {
            retention_secs: Some(2),
            cleanup_interval_secs: 1,
            ..RetryPolicy::fixed(3, Duration::from_secs(60))
        },
        ..Herald::default()
    };

    let running = herald
        .start(Arc::new(broker))
        .expect("controller failed to start");
    let retries = running.delivery().retries.clone();

    let _pending = retries.retry_message("order-8", Message::new("orders.created", b"{}".to_vec()));
    assert!(retries.context("order-8").is_some());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(retries.is_empty(), "running cleanup did not evict the context");

    running.shutdown().await.expect("controller failed to stop");
}
