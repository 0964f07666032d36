use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Producer settings shared by every send mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Producer group reported to the broker.
    ///
    /// Default: `herald_producer_group`
    #[serde(default = "defaults::group")]
    pub group: String,

    /// Upper bound on a single broker round trip (in milliseconds).
    ///
    /// Default: 3000
    #[serde(default = "defaults::send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Largest payload accepted before any broker I/O (in bytes).
    ///
    /// Default: 4 MiB
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            group: defaults::group(),
            send_timeout_ms: defaults::send_timeout_ms(),
            max_message_size: defaults::max_message_size(),
        }
    }
}

impl ProducerConfig {
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

mod defaults {
    pub fn group() -> String {
        "herald_producer_group".to_string()
    }

    pub const fn send_timeout_ms() -> u64 {
        3000
    }

    pub const fn max_message_size() -> usize {
        4 * 1024 * 1024
    }
}
