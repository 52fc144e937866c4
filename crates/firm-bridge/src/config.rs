use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delay between receipt and log polls.
    pub poll_interval: Duration,
    /// Upper bound on waiting for a receipt. Unbounded when `None`.
    pub receipt_timeout: Option<Duration>,
    /// Capacity of the root-update channel between watcher and dispatcher.
    pub event_channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            receipt_timeout: None,
            event_channel_capacity: 1024,
        }
    }
}
