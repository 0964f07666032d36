//! The publish envelope handed to every send mode.

use std::{collections::BTreeMap, fmt, sync::Arc};

/// Header carrying the business key of a message.
pub const KEYS_HEADER: &str = "KEYS";

/// A message addressed to a broker topic.
///
/// The payload is shared behind an [`Arc`], so cloning a message for a retry
/// or a dead-letter hand-off never copies the body.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    topic: String,
    tag: Option<String>,
    key: Option<String>,
    payload: Arc<[u8]>,
    headers: BTreeMap<String, String>,
}

impl Message {
    /// Create a message for `topic` with an already serialized payload.
    pub fn new(topic: impl Into<String>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            topic: topic.into(),
            tag: None,
            key: None,
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Set the sub-channel within the topic. Empty tags are ignored.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = non_empty(tag.into());
        self
    }

    /// Set the business key. A non-empty key is also carried in [`KEYS_HEADER`].
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = non_empty(key.into());
        match &self.key {
            Some(key) => {
                self.headers.insert(KEYS_HEADER.to_string(), key.clone());
            }
            None => {
                self.headers.remove(KEYS_HEADER);
            }
        }
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The broker destination: `topic`, or `topic:tag` when a tag is set.
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{tag}", self.topic),
            None => self.topic.clone(),
        }
    }

    pub(crate) fn shared_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    pub(crate) fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    pub(crate) fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag.and_then(non_empty);
    }

    pub(crate) fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .field("headers", &self.headers)
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
