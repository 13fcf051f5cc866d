//! Counter store abstraction.
//!
//! All mutable state lives behind the [`CounterStore`] trait: per-key ordered
//! event logs for the sliding windows and a TTL-capable key/value map for
//! blocklist entries. The core holds no mutable state of its own, so any
//! number of limiter instances can run concurrently as long as they share
//! one store.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// Result of one atomic window slide: the post-insert event count and the
/// timestamp of the oldest event still inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSlice {
    /// Number of events in the window, including the one just recorded
    pub count: u64,
    /// Score of the oldest surviving event, in epoch milliseconds
    pub oldest_ms: Option<u64>,
}

/// Storage backend for window counters and blocklist entries.
///
/// This trait abstracts over backends the same way local and distributed
/// rate limiters are abstracted behind a common seam: the in-process
/// [`MemoryStore`] for single-node deployments and tests, or a shared
/// networked store for horizontally scaled ones.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Slide the window for `key` forward to `now_ms` and record one event.
    ///
    /// In a single atomic unit: purge all events older than
    /// `now_ms - window_secs * 1000`, insert a new event scored at `now_ms`,
    /// count the surviving events, and refresh the key's TTL to
    /// `window_secs`.
    ///
    /// Atomicity is a hard requirement, not an optimization: two concurrent
    /// sliders racing on the same key must each observe a count reflecting
    /// the other's completed insert, or the limit can be over-admitted. A
    /// networked implementation must use a server-side script or equivalent
    /// transactional primitive; plain read-then-write sequences are a
    /// correctness bug.
    async fn slide_window(&self, key: &str, now_ms: u64, window_secs: u64) -> Result<WindowSlice>;

    /// Count events with score >= `window_start_ms` without mutating the log.
    async fn count_in_window(&self, key: &str, window_start_ms: u64) -> Result<u64>;

    /// Delete one counter key. Returns `true` if a log was present.
    async fn remove_counter(&self, key: &str) -> Result<bool>;

    /// Delete every counter key starting with `prefix`.
    ///
    /// Returns the number of keys removed. Callers are responsible for
    /// passing a prefix that ends at a key-structure boundary (e.g.
    /// `user:42:` rather than `user:4`), since plain string prefixes would
    /// otherwise bleed into neighboring identities.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64>;

    /// Fetch a value by key, honoring its TTL.
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a TTL in seconds, replacing any existing entry.
    async fn put_value(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete a value. Returns `true` if an entry was present.
    async fn delete_value(&self, key: &str) -> Result<bool>;
}
