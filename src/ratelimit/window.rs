//! Sliding-window rate counter.
//!
//! Counts events in a continuously moving time interval ending "now", backed
//! by an ordered per-key event log in the store. Unlike fixed-bucket
//! counting, the window never resets wholesale: each event individually ages
//! out `window_secs` after it was recorded.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::store::CounterStore;

/// Result of evaluating one counting scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// The limit of this scope
    pub limit: u64,
    /// Requests left in the window, zero when denied
    pub remaining: u64,
    /// Approximate epoch second at which the window fully clears.
    ///
    /// This is advisory; when `retry_after_secs` is present, it alone is
    /// authoritative for the denial.
    pub reset_epoch_secs: u64,
    /// Present if and only if the request exceeded the limit
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// Whether this decision denies the request.
    pub fn is_denied(&self) -> bool {
        self.retry_after_secs.is_some()
    }
}

/// The sliding-window algorithm over a [`CounterStore`].
#[derive(Clone)]
pub struct WindowCounter {
    store: Arc<dyn CounterStore>,
}

impl WindowCounter {
    /// Create a counter over the given store.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Record an event for `key` at `now_ms` and decide against the limit.
    ///
    /// The event is recorded even when the decision is a denial, so the
    /// offending request itself counts toward the next window's decay. Under
    /// sustained abuse this keeps the window saturated until the caller
    /// actually backs off.
    ///
    /// On denial, `retry_after_secs` is the time until the oldest surviving
    /// event ages out of the window, floored at one second.
    pub async fn check(
        &self,
        key: &str,
        max_requests: u64,
        window_secs: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision> {
        let window_ms = window_secs * 1000;
        let slice = self.store.slide_window(key, now_ms, window_secs).await?;

        trace!(
            key = %key,
            count = slice.count,
            limit = max_requests,
            "Checked sliding window"
        );

        let reset_epoch_secs = (now_ms + window_ms).div_ceil(1000);

        if slice.count > max_requests {
            let oldest_ms = slice.oldest_ms.unwrap_or(now_ms);
            let retry_after_secs = (oldest_ms + window_ms)
                .saturating_sub(now_ms)
                .div_ceil(1000)
                .max(1);

            debug!(
                key = %key,
                count = slice.count,
                limit = max_requests,
                retry_after_secs,
                "Rate limit exceeded"
            );

            return Ok(RateLimitDecision {
                limit: max_requests,
                remaining: 0,
                reset_epoch_secs,
                retry_after_secs: Some(retry_after_secs),
            });
        }

        Ok(RateLimitDecision {
            limit: max_requests,
            remaining: max_requests - slice.count,
            reset_epoch_secs,
            retry_after_secs: None,
        })
    }

    /// Observe the current window for `key` without recording an event.
    ///
    /// Used by the administrative status query; must not perturb state.
    pub async fn peek(
        &self,
        key: &str,
        max_requests: u64,
        window_secs: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision> {
        let window_ms = window_secs * 1000;
        let window_start = now_ms.saturating_sub(window_ms);
        let count = self.store.count_in_window(key, window_start).await?;

        Ok(RateLimitDecision {
            limit: max_requests,
            remaining: max_requests.saturating_sub(count),
            reset_epoch_secs: (now_ms + window_ms).div_ceil(1000),
            retry_after_secs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn counter() -> WindowCounter {
        WindowCounter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_remaining_decreases_by_one() {
        let counter = counter();

        for i in 0..60u64 {
            let decision = counter
                .check("ip:1.2.3.4", 60, 60, 1_000_000 + i * 100)
                .await
                .unwrap();
            assert_eq!(decision.remaining, 59 - i, "request {}", i);
            assert_eq!(decision.retry_after_secs, None);
        }
    }

    #[tokio::test]
    async fn test_over_limit_is_denied() {
        let counter = counter();

        for _ in 0..3 {
            let decision = counter.check("k", 3, 60, 1_000_000).await.unwrap();
            assert!(!decision.is_denied());
        }

        let decision = counter.check("k", 3, 60, 1_000_500).await.unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_secs.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_burst_then_retry_after() {
        let counter = counter();
        let base = 1_000_000u64;

        // 60 requests within 10 seconds are all admitted.
        for i in 0..60u64 {
            let decision = counter
                .check("ip:1.2.3.4", 60, 60, base + i * 166)
                .await
                .unwrap();
            assert!(!decision.is_denied(), "request {}", i);
        }

        // The 61st at t=11s is denied; the oldest event (at t=0) ages out
        // of the 60-second window after another ~49 seconds.
        let decision = counter
            .check("ip:1.2.3.4", 60, 60, base + 11_000)
            .await
            .unwrap();
        assert!(decision.is_denied());
        let retry = decision.retry_after_secs.unwrap();
        assert!((49..=50).contains(&retry), "retry_after was {}", retry);
    }

    #[tokio::test]
    async fn test_window_decay_recovers() {
        let counter = counter();

        for _ in 0..2 {
            counter.check("k", 2, 60, 1_000_000).await.unwrap();
        }
        let decision = counter.check("k", 2, 60, 1_001_000).await.unwrap();
        assert!(decision.is_denied());

        // More than a full window later, the key has fully decayed: the next
        // request starts a fresh count with no permanent lockout.
        let decision = counter.check("k", 2, 60, 1_070_000).await.unwrap();
        assert!(!decision.is_denied());
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_denied_request_still_counts() {
        let counter = counter();

        counter.check("k", 1, 60, 1_000).await.unwrap();
        let decision = counter.check("k", 1, 60, 2_000).await.unwrap();
        assert!(decision.is_denied());

        // At t=61.5s the admitted event (t=1s) has aged out, but the denied
        // one (t=2s) is still inside the window and keeps the key saturated.
        let decision = counter.check("k", 1, 60, 61_500).await.unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_retry_after_floor_is_one_second() {
        let counter = counter();

        counter.check("k", 1, 60, 1_000).await.unwrap();
        // 1ms before the first event ages out: ceil rounds to 1, never 0.
        let decision = counter.check("k", 1, 60, 60_999).await.unwrap();
        assert_eq!(decision.retry_after_secs, Some(1));
    }

    #[tokio::test]
    async fn test_reset_time_reflects_window() {
        let counter = counter();

        let decision = counter.check("k", 10, 60, 1_000_000).await.unwrap();
        assert_eq!(decision.reset_epoch_secs, 1_060);
    }

    #[tokio::test]
    async fn test_peek_does_not_record() {
        let counter = counter();

        counter.check("k", 10, 60, 1_000_000).await.unwrap();

        let observed = counter.peek("k", 10, 60, 1_000_500).await.unwrap();
        assert_eq!(observed.remaining, 9);

        // Peeking again reports the same remaining: nothing was recorded.
        let observed = counter.peek("k", 10, 60, 1_001_000).await.unwrap();
        assert_eq!(observed.remaining, 9);
    }

    #[tokio::test]
    async fn test_peek_on_unknown_key() {
        let counter = counter();

        let observed = counter.peek("missing", 10, 60, 1_000_000).await.unwrap();
        assert_eq!(observed.remaining, 10);
        assert_eq!(observed.retry_after_secs, None);
    }
}
