//! IP blocklist guard.
//!
//! Independent pre-check ahead of all rate counting: an administratively
//! blocked IP is rejected before any event is recorded, so its blocked
//! requests never pollute its own rate-limit window and it starts with a
//! clean window once unblocked.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::store::CounterStore;

/// A stored block record. Its TTL in the store is the block duration, so
/// expiry is the unblock event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    /// The blocked address
    pub ip: String,
    /// Why the block was created
    pub reason: String,
    /// When the block was created, epoch milliseconds
    pub blocked_at_ms: u64,
}

/// Result of a blocklist lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStatus {
    /// Whether the address is blocked
    pub blocked: bool,
    /// The recorded reason, when the block record was readable
    pub reason: Option<String>,
}

/// The store key holding the block record for an address.
pub(crate) fn block_key(ip: &IpAddr) -> String {
    format!("block:ip:{}", ip)
}

/// Looks up administrative IP blocks ahead of the limiter.
#[derive(Clone)]
pub struct BlocklistGuard {
    store: Arc<dyn CounterStore>,
}

impl BlocklistGuard {
    /// Create a guard over the given store.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Check whether an address is currently blocked.
    ///
    /// A malformed stored record is treated as blocked with no reason: a
    /// corrupted block entry must never silently un-block a previously
    /// blocked IP.
    pub async fn is_blocked(&self, ip: IpAddr) -> Result<BlockStatus> {
        match self.store.get_value(&block_key(&ip)).await? {
            None => Ok(BlockStatus {
                blocked: false,
                reason: None,
            }),
            Some(payload) => match serde_json::from_str::<BlockEntry>(&payload) {
                Ok(entry) => Ok(BlockStatus {
                    blocked: true,
                    reason: Some(entry.reason),
                }),
                Err(e) => {
                    warn!(ip = %ip, error = %e, "Malformed block entry, failing closed");
                    Ok(BlockStatus {
                        blocked: true,
                        reason: None,
                    })
                }
            },
        }
    }
}
