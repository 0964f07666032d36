use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ulid::Ulid;

use super::{BrokerClient, BrokerError, BrokerReceipt, BrokerRequest, Routing};
use crate::result::SendStatus;

const DEFAULT_QUEUE_COUNT: u32 = 4;

/// A message as stored by [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub message_id: String,
    pub request: BrokerRequest,
    pub queue_id: u32,
    pub queue_offset: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TopicLog {
    offsets: Vec<u64>,
    records: Vec<StoredRecord>,
    next_queue: u32,
}

impl TopicLog {
    fn new(queue_count: u32) -> Self {
        Self {
            offsets: vec![0; queue_count.max(1) as usize],
            records: Vec::new(),
            next_queue: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn queue_count(&self) -> u32 {
        self.offsets.len() as u32
    }
}

/// In-memory broker keeping every stored message per topic
///
/// Queue selection is round-robin unless the request pins a queue. Unknown
/// topics are created on first use with the default queue count, or
/// rejected once [`MemoryBroker::strict`] is set.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    topics: Arc<RwLock<HashMap<String, TopicLog>>>,
    auto_create: bool,
    default_queue_count: u32,
    max_message_size: Option<usize>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            topics: Arc::default(),
            auto_create: true,
            default_queue_count: DEFAULT_QUEUE_COUNT,
            max_message_size: None,
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `topic` up front with `queue_count` queues.
    #[must_use]
    pub fn with_topic(self, topic: impl Into<String>, queue_count: u32) -> Self {
        self.topics
            .write()
            .insert(topic.into(), TopicLog::new(queue_count));
        self
    }

    /// Reject sends to undeclared topics.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.auto_create = false;
        self
    }

    #[must_use]
    pub const fn with_default_queue_count(mut self, queue_count: u32) -> Self {
        self.default_queue_count = queue_count;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = Some(limit);
        self
    }

    /// Every record stored under `topic`, in arrival order.
    pub fn records(&self, topic: &str) -> Vec<StoredRecord> {
        self.topics
            .read()
            .get(topic)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Records stored in one queue of `topic`, in offset order.
    pub fn queue_records(&self, topic: &str, queue_id: u32) -> Vec<StoredRecord> {
        self.records(topic)
            .into_iter()
            .filter(|record| record.queue_id == queue_id)
            .collect()
    }

    /// Total number of stored records across all topics.
    pub fn len(&self) -> usize {
        self.topics.read().values().map(|log| log.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.topics.write().clear();
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn send(&self, request: BrokerRequest) -> Result<BrokerReceipt, BrokerError> {
        if let Some(limit) = self.max_message_size
            && request.payload.len() > limit
        {
            return Err(BrokerError::MessageTooLarge {
                size: request.payload.len(),
                limit,
            });
        }

        let mut topics = self.topics.write();
        if !topics.contains_key(&request.topic) {
            if !self.auto_create {
                return Err(BrokerError::TopicNotFound(request.topic));
            }
            topics.insert(
                request.topic.clone(),
                TopicLog::new(self.default_queue_count),
            );
        }

        let log = topics
            .get_mut(&request.topic)
            .ok_or_else(|| BrokerError::TopicNotFound(request.topic.clone()))?;

        let queue_id = match request.routing {
            Routing::Queue(queue_id) if queue_id >= log.queue_count() => {
                return Err(BrokerError::InvalidQueue {
                    topic: request.topic,
                    queue_id,
                });
            }
            Routing::Queue(queue_id) => queue_id,
            _ => {
                let queue_id = log.next_queue % log.queue_count();
                log.next_queue = log.next_queue.wrapping_add(1);
                queue_id
            }
        };

        let offset = &mut log.offsets[queue_id as usize];
        let queue_offset = *offset;
        *offset += 1;

        let message_id = Ulid::new().to_string();
        log.records.push(StoredRecord {
            message_id: message_id.clone(),
            request,
            queue_id,
            queue_offset,
            stored_at: Utc::now(),
        });

        Ok(BrokerReceipt {
            message_id,
            queue_id: Some(queue_id),
            queue_offset: Some(queue_offset),
            status: SendStatus::SendOk,
        })
    }

    async fn queue_count(&self, topic: &str) -> Result<u32, BrokerError> {
        match self.topics.read().get(topic) {
            Some(log) => Ok(log.queue_count()),
            None if self.auto_create => Ok(self.default_queue_count.max(1)),
            None => Err(BrokerError::TopicNotFound(topic.to_string())),
        }
    }
}
