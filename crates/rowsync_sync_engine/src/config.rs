//! Sync loop configuration.

use std::time::Duration;

/// KV key under which the pull cursor is persisted.
pub const DEFAULT_CURSOR_KEY: &str = "sync.cursor.v1";

/// Configuration for a [`crate::SyncLoop`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// KV key the pull cursor is stored under.
    pub cursor_key: String,
    /// Delay between cycles.
    pub interval: Duration,
    /// Maximum pending operations per push request.
    pub push_batch_size: usize,
    /// Maximum rows per pull page.
    pub pull_limit: u32,
}

impl SyncConfig {
    /// Sets the cursor key.
    #[must_use]
    pub fn with_cursor_key(mut self, key: impl Into<String>) -> Self {
        self.cursor_key = key.into();
        self
    }

    /// Sets the cycle interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the push batch size.
    #[must_use]
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the pull page limit.
    #[must_use]
    pub fn with_pull_limit(mut self, limit: u32) -> Self {
        self.pull_limit = limit;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cursor_key: DEFAULT_CURSOR_KEY.to_string(),
            interval: Duration::from_secs(30),
            push_batch_size: 100,
            pull_limit: 500,
        }
    }
}
