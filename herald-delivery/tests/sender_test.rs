//! Integration tests for the producer send modes

mod support;

use std::{collections::HashMap, time::Duration};

use herald_delivery::{
    BrokerError, MemoryBroker, Message, MessageSender, ProducerConfig, SendError, SendStatus,
    TestBroker, TransientError, broker::Routing, message::KEYS_HEADER,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use support::{order_message, producer, producer_with};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct OrderCreated {
    order_id: u64,
    customer: String,
}

#[tokio::test]
async fn test_send_sync_success() {
    let broker = TestBroker::new();
    let producer = producer(&broker);

    let result = producer.send_sync(order_message(1)).await;

    assert!(result.is_success());
    assert_eq!(result.status(), SendStatus::SendOk);
    assert_eq!(result.topic(), "orders.created");
    assert_eq!(result.tag(), Some("eu"));
    assert_eq!(result.message_key(), Some("order-1"));
    assert!(result.message_id().is_some());
    assert!(result.queue_id().is_some());

    let records = broker.broker().records("orders.created");
    assert_eq!(records.len(), 1);
    let request = &records[0].request;
    assert_eq!(request.destination, "orders.created:eu");
    assert_eq!(request.headers.get(KEYS_HEADER).map(String::as_str), Some("order-1"));
    assert_eq!(request.producer_group, "herald_producer_group");
    assert_eq!(&*request.payload, br#"{"order_id":1}"#);
}

#[tokio::test]
async fn test_send_sync_reports_transient_failure() {
    let broker = TestBroker::new();
    broker.fail_next(BrokerError::Unavailable("connection refused".to_string()));
    let producer = producer(&broker);

    let result = producer.send_sync(order_message(2)).await;

    assert!(!result.is_success());
    assert_eq!(result.status(), SendStatus::SendFailed);
    assert!(result.is_retryable());
    assert!(matches!(
        result.error(),
        Some(SendError::Transient(TransientError::ConnectionFailed(_)))
    ));
    assert!(broker.broker().is_empty());
}

#[tokio::test]
async fn test_send_sync_unknown_topic_is_rejected() {
    let broker = TestBroker::with_broker(MemoryBroker::new().with_topic("payments", 1).strict());
    let producer = producer(&broker);

    let result = producer.send_sync(order_message(3)).await;

    assert!(!result.is_success());
    assert!(!result.is_retryable());
    assert!(result.error().is_some_and(SendError::is_rejected));
}

#[tokio::test]
async fn test_oversized_payload_never_reaches_broker() {
    let broker = TestBroker::new();
    let producer = producer_with(
        &broker,
        &ProducerConfig {
            max_message_size: 8,
            ..ProducerConfig::default()
        },
    );

    let result = producer
        .send_sync(Message::new("orders.created", vec![0u8; 9]))
        .await;

    assert!(!result.is_success());
    assert_eq!(
        result.error_message(),
        Some("Rejected: Message too large: 9 bytes exceeds limit of 8 bytes")
    );
    assert_eq!(broker.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_sync_times_out() {
    let broker = TestBroker::new();
    broker.set_latency(Duration::from_secs(10));
    let producer = producer_with(
        &broker,
        &ProducerConfig {
            send_timeout_ms: 100,
            ..ProducerConfig::default()
        },
    );

    let result = producer.send_sync(order_message(4)).await;

    assert!(!result.is_success());
    assert!(result.is_retryable());
    assert!(matches!(
        result.error(),
        Some(SendError::Transient(TransientError::Timeout(after))) if *after == Duration::from_millis(100)
    ));
}

#[tokio::test]
async fn test_non_ok_store_status_is_not_success() {
    let broker = TestBroker::new();
    broker.respond_with_status(SendStatus::FlushSlaveTimeout);
    let producer = producer(&broker);

    let result = producer.send_sync(order_message(5)).await;

    assert!(!result.is_success());
    assert_eq!(result.status(), SendStatus::FlushSlaveTimeout);
    assert!(result.error().is_none());
    assert!(result.message_id().is_some());
}

#[tokio::test]
async fn test_send_async_success_path() {
    let broker = TestBroker::new();
    let producer = producer(&broker);

    let pending = producer.send_async(order_message(6));
    let result = pending.await.expect("async send failed");

    assert!(result.is_success());
    assert_eq!(broker.broker().records("orders.created").len(), 1);
}

#[tokio::test]
async fn test_send_async_error_path() {
    let broker = TestBroker::new();
    broker.fail_next(BrokerError::Busy("flow control".to_string()));
    let producer = producer(&broker);

    let error = producer
        .send_async(order_message(7))
        .await
        .expect_err("async send should fail");

    assert!(error.is_retryable());
    assert_eq!(error.to_string(), "Transient failure: Broker busy: flow control");
}

#[tokio::test]
async fn test_send_one_way_delivers_in_background() {
    let broker = TestBroker::new();
    let producer = producer(&broker);

    producer.send_one_way(order_message(8));
    broker
        .wait_for_attempts(1, Duration::from_secs(5))
        .await
        .expect("one-way send never reached the broker");
    tokio::task::yield_now().await;

    assert_eq!(broker.requests()[0].routing, Routing::OneWay);
}

#[tokio::test]
async fn test_send_one_way_swallows_failures() {
    let broker = TestBroker::new();
    broker.fail_always(BrokerError::Unavailable("down".to_string()));
    let producer = producer(&broker);

    producer.send_one_way(order_message(9));
    broker
        .wait_for_attempts(1, Duration::from_secs(5))
        .await
        .expect("one-way send never reached the broker");

    assert!(broker.broker().is_empty());
}

#[tokio::test]
async fn test_send_orderly_pins_hash_key_to_one_queue() {
    let broker = TestBroker::with_broker(MemoryBroker::new().with_topic("orders.created", 8));
    let producer = producer(&broker);
    let expected = producer.select_queue("customer-42", 8);

    for id in 0..10 {
        let message = Message::new("orders.created", format!("{id}").into_bytes());
        let result = producer.send_orderly(message, "customer-42").await;

        assert!(result.is_success());
        assert_eq!(result.queue_id(), Some(expected));
        assert_eq!(result.message_key(), Some("customer-42"));
    }

    let queued = broker.broker().queue_records("orders.created", expected);
    assert_eq!(queued.len(), 10);
    let offsets: Vec<_> = queued.iter().map(|record| record.queue_offset).collect();
    assert_eq!(offsets, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_queue_selection_is_stable() {
    let broker = TestBroker::new();
    let first = producer(&broker);
    let second = producer(&broker);

    for key in ["a", "customer-1", "customer-2", "ü"] {
        assert_eq!(first.select_queue(key, 16), second.select_queue(key, 16));
        assert!(first.select_queue(key, 16) < 16);
    }
    assert_eq!(first.select_queue("anything", 0), 0);
}

#[tokio::test]
async fn test_send_orderly_unknown_topic() {
    let broker = TestBroker::with_broker(MemoryBroker::new().strict());
    let producer = producer(&broker);

    let result = producer
        .send_orderly(order_message(10), "customer-1")
        .await;

    assert!(!result.is_success());
    assert!(!result.is_retryable());
    assert_eq!(broker.attempts(), 0);
}

#[tokio::test]
async fn test_send_delay_carries_level() {
    let broker = TestBroker::new();
    let producer = producer(&broker);

    let result = producer.send_delay(order_message(11), 3).await;

    assert!(result.is_success());
    assert_eq!(broker.requests()[0].routing, Routing::Delayed(3));
}

#[tokio::test]
async fn test_send_in_transaction_carries_argument() {
    let broker = TestBroker::new();
    let producer = producer(&broker);
    let arg = serde_json::json!({ "order_id": 12, "action": "reserve-stock" });

    let result = producer
        .send_in_transaction(order_message(12), arg.clone())
        .await;

    assert!(result.is_success());
    assert_eq!(broker.requests()[0].routing, Routing::Transactional(arg));
}

#[tokio::test]
async fn test_send_value_encodes_with_codec() {
    let broker = TestBroker::new();
    let producer = producer(&broker);
    let order = OrderCreated {
        order_id: 13,
        customer: "ada".to_string(),
    };

    let result = producer
        .send_value("orders.created", Some("eu"), Some("order-13"), &order)
        .await;
    assert!(result.is_success());
    assert_eq!(result.message_key(), Some("order-13"));

    let records = broker.broker().records("orders.created");
    let stored = support::message_from_record(&records[0]);
    let decoded: OrderCreated = producer.decode(&stored).expect("decode failed");
    assert_eq!(decoded, order);
}

#[tokio::test]
async fn test_send_value_serialization_failure() {
    let broker = TestBroker::new();
    let producer = producer(&broker);
    let mut unencodable = HashMap::new();
    unencodable.insert(vec![1u8, 2], "tuple keys are not JSON");

    let result = producer
        .send_value("orders.created", None, Some("order-14"), &unencodable)
        .await;

    assert!(!result.is_success());
    assert!(!result.is_retryable());
    assert!(result.error().is_some_and(SendError::is_serialization));
    assert_eq!(result.message_key(), Some("order-14"));
    assert_eq!(broker.attempts(), 0);
}
