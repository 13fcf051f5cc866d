//! Administrative controls.
//!
//! Out-of-band operations for trusted internal callers: usage inspection,
//! counter resets, and IP block management. These are direct function calls;
//! exposing them over an internal RPC is the integrator's concern.

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::blocklist::{block_key, BlockEntry};
use crate::config::{LimiterConfig, Tier};
use crate::error::{PalisadeError, Result};
use crate::ratelimit::{epoch_millis, WindowCounter};
use crate::store::CounterStore;

/// A user's current standing against the authenticated-tier window.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStatus {
    /// The tier the report is measured against
    pub tier: Tier,
    /// The tier's request limit
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// Approximate epoch second at which the window fully clears
    pub reset_epoch_secs: u64,
}

/// Administrative surface over the shared store.
pub struct AdminControls {
    config: Arc<LimiterConfig>,
    store: Arc<dyn CounterStore>,
    windows: WindowCounter,
}

impl AdminControls {
    /// Create the admin surface over the given configuration and store.
    pub fn new(config: Arc<LimiterConfig>, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            windows: WindowCounter::new(Arc::clone(&store)),
            store,
        }
    }

    /// Report a user's current usage without recording an event.
    ///
    /// Pure observation against the authenticated-tier window; repeated
    /// calls never change what they report.
    pub async fn status(&self, user_id: &str) -> Result<UsageStatus> {
        let tier_limit = self.config.tier_limit(Tier::Authenticated);
        let decision = self
            .windows
            .peek(
                &format!("user:{}", user_id),
                tier_limit.max_requests,
                tier_limit.window_secs,
                epoch_millis(),
            )
            .await?;

        Ok(UsageStatus {
            tier: Tier::Authenticated,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_epoch_secs: decision.reset_epoch_secs,
        })
    }

    /// Delete all of a user's counters: the tier window and every
    /// endpoint-scoped window under it.
    ///
    /// Returns the number of counter keys removed.
    pub async fn reset(&self, user_id: &str) -> Result<u64> {
        info!(user_id = %user_id, "Resetting rate limit counters");

        // The scoped prefix ends at a key boundary so that ids sharing a
        // string prefix (user 4 vs. user 42) can never bleed together.
        let mut removed = self
            .store
            .remove_prefix(&format!("user:{}:", user_id))
            .await?;
        if self
            .store
            .remove_counter(&format!("user:{}", user_id))
            .await?
        {
            removed += 1;
        }
        Ok(removed)
    }

    /// Block an IP for `duration_secs`, recording the reason.
    ///
    /// The record's TTL is the block duration; its expiry is the unblock
    /// event.
    pub async fn block(&self, ip: IpAddr, duration_secs: u64, reason: &str) -> Result<()> {
        let entry = BlockEntry {
            ip: ip.to_string(),
            reason: reason.to_string(),
            blocked_at_ms: epoch_millis(),
        };
        let payload = serde_json::to_string(&entry)
            .map_err(|e| PalisadeError::StoreUnavailable(format!("encoding block entry: {}", e)))?;

        info!(ip = %ip, duration_secs, reason = %reason, "Blocking IP");
        self.store
            .put_value(&block_key(&ip), &payload, duration_secs)
            .await
    }

    /// Lift a block before its TTL expires.
    ///
    /// Returns `true` if a block record was present.
    pub async fn unblock(&self, ip: IpAddr) -> Result<bool> {
        info!(ip = %ip, "Unblocking IP");
        self.store.delete_value(&block_key(&ip)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlocklistGuard;
    use crate::ratelimit::{ClientRequest, LimiterOutcome, RateLimiter};
    use crate::store::MemoryStore;
    use tokio_test::assert_ok;

    fn setup() -> (Arc<MemoryStore>, RateLimiter, AdminControls) {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(LimiterConfig::default());
        let limiter = RateLimiter::new(
            Arc::clone(&config),
            Arc::clone(&store) as Arc<dyn CounterStore>,
        );
        let admin = AdminControls::new(config, Arc::clone(&store) as Arc<dyn CounterStore>);
        (store, limiter, admin)
    }

    fn user_request(user_id: &str) -> ClientRequest {
        ClientRequest {
            method: "GET".to_string(),
            path: "/api/portfolio".to_string(),
            ip: "1.2.3.4".parse().unwrap(),
            user_id: Some(user_id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_status_reflects_usage_without_perturbing_it() {
        let (_store, limiter, admin) = setup();

        for _ in 0..3 {
            assert_ok!(limiter.evaluate(&user_request("u42")).await);
        }

        let status = admin.status("u42").await.unwrap();
        assert_eq!(status.tier, Tier::Authenticated);
        assert_eq!(status.limit, 300);
        assert_eq!(status.remaining, 297);

        // Querying again reports the same numbers: pure observation.
        let status = admin.status("u42").await.unwrap();
        assert_eq!(status.remaining, 297);
    }

    #[tokio::test]
    async fn test_status_for_idle_user() {
        let (_store, _limiter, admin) = setup();

        let status = admin.status("quiet").await.unwrap();
        assert_eq!(status.remaining, status.limit);
    }

    #[tokio::test]
    async fn test_reset_gives_a_fresh_window() {
        let (_store, limiter, admin) = setup();

        for _ in 0..5 {
            assert_ok!(limiter.evaluate(&user_request("u42")).await);
        }

        let removed = admin.reset("u42").await.unwrap();
        assert_eq!(removed, 1);

        // The next request starts a fresh window, not a continuation.
        let outcome = limiter.evaluate(&user_request("u42")).await.unwrap();
        match outcome {
            LimiterOutcome::Admitted { headers } => {
                assert_eq!(headers.remaining, 299);
            }
            other => panic!("expected Admitted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_removes_endpoint_counters_for_that_user_only() {
        let (store, _limiter, admin) = setup();

        store.slide_window("user:4", 1_000, 60).await.unwrap();
        store
            .slide_window("user:42:endpoint:POST__api_auth_login", 1_000, 60)
            .await
            .unwrap();
        store.slide_window("user:42", 1_000, 60).await.unwrap();

        let removed = admin.reset("u42").await.unwrap();
        assert_eq!(removed, 0); // ids are "4" and "42", not "u42"

        let removed = admin.reset("42").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count_in_window("user:4", 0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_block_and_unblock_roundtrip() {
        let (store, _limiter, admin) = setup();
        let ip: IpAddr = "9.9.9.9".parse().unwrap();
        let guard = BlocklistGuard::new(Arc::clone(&store) as Arc<dyn CounterStore>);

        admin.block(ip, 3600, "credential stuffing").await.unwrap();
        let status = guard.is_blocked(ip).await.unwrap();
        assert!(status.blocked);
        assert_eq!(status.reason.as_deref(), Some("credential stuffing"));

        assert!(admin.unblock(ip).await.unwrap());
        let status = guard.is_blocked(ip).await.unwrap();
        assert!(!status.blocked);

        // Unblocking twice is harmless.
        assert!(!admin.unblock(ip).await.unwrap());
    }

    #[tokio::test]
    async fn test_block_expires_via_ttl() {
        let (store, _limiter, admin) = setup();
        let ip: IpAddr = "9.9.9.9".parse().unwrap();
        let guard = BlocklistGuard::new(Arc::clone(&store) as Arc<dyn CounterStore>);

        admin.block(ip, 0, "short-lived").await.unwrap();
        let status = guard.is_blocked(ip).await.unwrap();
        assert!(!status.blocked);
    }
}
