//! Configuration for replication behavior.

use ddoc_engine::{DEFAULT_ANCHOR_RETRY_LIMIT, DEFAULT_EVENT_CAPACITY};

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// How often the batcher flushes the outbox (in milliseconds).
    pub batch_interval_ms: u64,
    /// Settle rounds a dependency-missing operation survives before
    /// being dropped.
    pub anchor_retry_limit: u32,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: 50,
            anchor_retry_limit: DEFAULT_ANCHOR_RETRY_LIMIT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn batch_interval(mut self, ms: u64) -> Self {
        self.config.batch_interval_ms = ms;
        self
    }

    pub fn anchor_retry_limit(mut self, rounds: u32) -> Self {
        self.config.anchor_retry_limit = rounds;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
