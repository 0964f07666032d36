//! Integration tests for send tracing and counting

mod support;

use std::sync::Arc;

use herald_delivery::{
    BrokerError, Message, MessageSender, Monitor, ObservedSender, TestBroker, TraceConfig,
    TraceKind, TraceService,
};
use pretty_assertions::assert_eq;
use support::{order_message, producer};

struct Observed {
    sender: ObservedSender,
    traces: Arc<TraceService>,
    monitor: Arc<Monitor>,
}

fn observed(broker: &TestBroker) -> Observed {
    let traces = Arc::new(TraceService::new(TraceConfig::default()));
    let monitor = Arc::new(Monitor::new());
    let sender = ObservedSender::new(producer(broker))
        .with_traces(traces.clone())
        .with_monitor(monitor.clone());

    Observed {
        sender,
        traces,
        monitor,
    }
}

#[tokio::test]
async fn test_successful_send_is_traced_and_counted() {
    let broker = TestBroker::new();
    let observed = observed(&broker);

    let result = observed.sender.send_sync(order_message(1)).await;
    assert!(result.is_success());

    let trace = observed.traces.trace("order-1").expect("send not traced");
    assert_eq!(trace.topic, "orders.created");
    assert_eq!(trace.tag.as_deref(), Some("eu"));
    assert_eq!(trace.events.len(), 1);
    assert_eq!(trace.events[0].kind, TraceKind::Send);
    assert_eq!(trace.events[0].operation, "sync");

    let report = observed.monitor.report();
    assert_eq!(report.total_sent, 1);
    assert_eq!(report.total_errors, 0);
    assert_eq!(report.sent_by_topic.get("orders.created"), Some(&1));
}

#[tokio::test]
async fn test_failed_send_is_traced_as_exception() {
    let broker = TestBroker::new();
    broker.fail_next(BrokerError::Unavailable("down".to_string()));
    let observed = observed(&broker);

    let failed = observed.sender.send_sync(order_message(2)).await;
    let delivered = observed.sender.send_sync(order_message(2)).await;
    assert!(!failed.is_success());
    assert!(delivered.is_success());

    let trace = observed.traces.trace("order-2").expect("send not traced");
    let kinds: Vec<_> = trace.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![TraceKind::Exception, TraceKind::Send]);
    assert_eq!(trace.events[0].error.as_deref(), failed.error_message());

    let report = observed.monitor.report();
    assert_eq!(report.total_sent, 2);
    assert_eq!(report.total_errors, 1);
    assert!((report.success_rate() - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_keyless_success_is_traced_by_broker_id() {
    let broker = TestBroker::new();
    let observed = observed(&broker);

    let result = observed
        .sender
        .send_sync(Message::new("audit", b"{}".to_vec()))
        .await;

    let message_id = result.message_id().expect("broker assigned no id");
    assert!(observed.traces.trace(message_id).is_some());
}

#[tokio::test]
async fn test_async_failure_is_observed() {
    let broker = TestBroker::new();
    broker.fail_next(BrokerError::Unavailable("down".to_string()));
    let observed = observed(&broker);

    let outcome = observed.sender.send_async(order_message(3)).await;
    assert!(outcome.is_err());

    let trace = observed.traces.trace("order-3").expect("failure not traced");
    assert_eq!(trace.events[0].kind, TraceKind::Exception);
    assert_eq!(trace.events[0].operation, "async");
    assert_eq!(observed.monitor.total_errors(), 1);
}

#[tokio::test]
async fn test_orderly_send_records_its_mode() {
    let broker = TestBroker::new();
    let observed = observed(&broker);

    let result = observed
        .sender
        .send_orderly(order_message(4), "customer-9")
        .await;
    assert!(result.is_success());

    let trace = observed.traces.trace("order-4").expect("send not traced");
    assert_eq!(trace.events[0].operation, "orderly");
}
