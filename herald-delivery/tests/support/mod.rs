//! Shared fixtures for the delivery integration tests
#![allow(dead_code)] // Not every suite uses every fixture

use std::sync::Arc;

use async_trait::async_trait;
use herald_delivery::{
    Message, MessageSender, PendingSend, Producer, ProducerConfig, RetryPolicy, SendResult,
    TestBroker, broker::StoredRecord,
};

pub fn producer(broker: &TestBroker) -> Arc<Producer> {
    producer_with(broker, &ProducerConfig::default())
}

pub fn producer_with(broker: &TestBroker, config: &ProducerConfig) -> Arc<Producer> {
    Arc::new(Producer::new(Arc::new(broker.clone()), config))
}

pub fn order_message(id: u64) -> Message {
    Message::new(
        "orders.created",
        format!(r#"{{"order_id":{id}}}"#).into_bytes(),
    )
    .with_tag("eu")
    .with_key(format!("order-{id}"))
    .with_header("trace-id", format!("trace-{id}"))
}

pub fn fixed_policy(max_attempts: u32, interval_ms: u64) -> RetryPolicy {
    RetryPolicy::fixed(max_attempts, std::time::Duration::from_millis(interval_ms))
}

/// Rebuild the envelope the broker stored, as a consumer would see it
pub fn message_from_record(record: &StoredRecord) -> Message {
    let request = &record.request;
    let mut message = Message::new(request.topic.clone(), request.payload.to_vec());
    if let Some(tag) = &request.tag {
        message = message.with_tag(tag.clone());
    }
    if let Some(key) = &request.key {
        message = message.with_key(key.clone());
    }
    for (name, value) in &request.headers {
        message = message.with_header(name.clone(), value.clone());
    }
    message
}

/// A sender whose synchronous send always panics
#[derive(Debug, Default)]
pub struct PanickingSender;

#[async_trait]
impl MessageSender for PanickingSender {
    async fn send_sync(&self, _message: Message) -> SendResult {
        panic!("broker client bug")
    }

    fn send_async(&self, _message: Message) -> PendingSend {
        unimplemented!("not used by the retry service")
    }

    fn send_one_way(&self, _message: Message) {
        unimplemented!("not used by the retry service")
    }

    async fn send_orderly(&self, _message: Message, _hash_key: &str) -> SendResult {
        unimplemented!("not used by the retry service")
    }

    async fn send_delay(&self, _message: Message, _delay_level: u32) -> SendResult {
        unimplemented!("not used by the retry service")
    }

    async fn send_in_transaction(
        &self,
        _message: Message,
        _arg: serde_json::Value,
    ) -> SendResult {
        unimplemented!("not used by the retry service")
    }
}
