//! In-process counter store.
//!
//! Reference implementation of [`CounterStore`] for single-node deployments
//! and tests. Each key's event log is an ordered set guarded by its own
//! mutex; holding that mutex across the purge/insert/count/expire steps is
//! what makes [`slide_window`](CounterStore::slide_window) atomic here. A
//! shared networked store would use a server-side script for the same
//! guarantee.

use std::collections::BTreeSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

use super::{CounterStore, WindowSlice};

/// One key's event log: entries are `(score_ms, uniquifier)` pairs so that
/// two events recorded in the same millisecond stay distinct set members.
struct WindowLog {
    events: BTreeSet<(u64, u64)>,
    expires_at_ms: u64,
}

impl WindowLog {
    fn new() -> Self {
        Self {
            events: BTreeSet::new(),
            expires_at_ms: 0,
        }
    }
}

/// A stored value with its expiry time.
struct ValueEntry {
    value: String,
    expires_at_ms: u64,
}

/// In-memory, TTL-capable store backed by [`DashMap`].
#[derive(Default)]
pub struct MemoryStore {
    logs: DashMap<String, Mutex<WindowLog>>,
    values: DashMap<String, ValueEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict logs and values whose TTL has passed.
    ///
    /// Expired entries are already invisible to reads; this reclaims their
    /// memory. Call periodically from a background task.
    pub fn sweep(&self, now_ms: u64) {
        self.logs
            .retain(|_, log| log.lock().expires_at_ms > now_ms);
        self.values.retain(|_, entry| entry.expires_at_ms > now_ms);

        debug!(
            logs = self.logs.len(),
            values = self.values.len(),
            "Store sweep complete"
        );
    }

    /// Number of live counter keys. Primarily useful for tests.
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    fn wall_clock_ms() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryStore {
    async fn slide_window(&self, key: &str, now_ms: u64, window_secs: u64) -> Result<WindowSlice> {
        let window_start = now_ms.saturating_sub(window_secs * 1000);

        let entry = self
            .logs
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(WindowLog::new()));
        let mut log = entry.lock();

        // The whole key expired while idle: start from an empty log.
        if log.expires_at_ms <= now_ms {
            log.events.clear();
        }

        // Purge events that have aged out of the window, record the new
        // event, count, and refresh the TTL, all under the key's lock.
        log.events = log.events.split_off(&(window_start, 0));
        log.events.insert((now_ms, rand::random::<u64>()));
        let count = log.events.len() as u64;
        let oldest_ms = log.events.iter().next().map(|(score, _)| *score);
        log.expires_at_ms = now_ms + window_secs * 1000;

        Ok(WindowSlice { count, oldest_ms })
    }

    async fn count_in_window(&self, key: &str, window_start_ms: u64) -> Result<u64> {
        let count = match self.logs.get(key) {
            Some(entry) => {
                let log = entry.lock();
                if log.expires_at_ms <= window_start_ms {
                    0
                } else {
                    log.events.range((window_start_ms, 0)..).count() as u64
                }
            }
            None => 0,
        };
        Ok(count)
    }

    async fn remove_counter(&self, key: &str) -> Result<bool> {
        Ok(self.logs.remove(key).is_some())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        let keys: Vec<String> = self
            .logs
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.logs.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let now_ms = Self::wall_clock_ms();

        if let Some(entry) = self.values.get(key) {
            if entry.expires_at_ms > now_ms {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Lazily drop an expired entry on read.
        self.values
            .remove_if(key, |_, entry| entry.expires_at_ms <= now_ms);
        Ok(None)
    }

    async fn put_value(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at_ms: Self::wall_clock_ms() + ttl_secs * 1000,
            },
        );
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<bool> {
        Ok(self.values.remove(key).is_some())
    }
}
