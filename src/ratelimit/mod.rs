//! Rate limiting logic: the sliding-window counter, scope resolution, and
//! the per-request orchestrator.

mod limiter;
mod scope;
mod window;

pub use limiter::{LimiterOutcome, RateLimitHeaders, RateLimiter};
pub use scope::{ClientRequest, Identity, NoPremiumPlans, PlanLookup};
pub use window::{RateLimitDecision, WindowCounter};

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
