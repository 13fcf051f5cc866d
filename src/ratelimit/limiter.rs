//! Per-request limiter orchestration.
//!
//! Composes the blocklist guard, scope resolver, and window counter into a
//! single decision per request: exempt paths skip everything, blocked IPs
//! are rejected before any counting, then the tier window is checked and,
//! when a rule matches, the stricter endpoint window on top of it.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::blocklist::BlocklistGuard;
use crate::config::LimiterConfig;
use crate::error::{PalisadeError, Result};
use crate::store::CounterStore;

use super::scope::{self, ClientRequest, NoPremiumPlans, PlanLookup};
use super::window::{RateLimitDecision, WindowCounter};

/// The response header set for a non-exempt request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Limit`
    pub limit: u64,
    /// `X-RateLimit-Remaining`: the more restrictive of the tier and
    /// endpoint remaining counts
    pub remaining: u64,
    /// `X-RateLimit-Reset`: approximate window-clear time, epoch seconds
    pub reset_epoch_secs: u64,
    /// `Retry-After`, present only on rejection
    pub retry_after_secs: Option<u64>,
}

impl RateLimitHeaders {
    fn from_decision(decision: &RateLimitDecision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_epoch_secs: decision.reset_epoch_secs,
            retry_after_secs: decision.retry_after_secs,
        }
    }

    /// Render as header name/value pairs for the HTTP layer.
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_epoch_secs.to_string()),
        ];
        if let Some(retry) = self.retry_after_secs {
            pairs.push(("Retry-After", retry.to_string()));
        }
        pairs
    }
}

/// The decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterOutcome {
    /// Exempted path: no blocklist lookup, no counting, no headers
    Exempt,
    /// The caller's IP is administratively blocked; nothing was counted
    Blocked {
        /// The blocked address
        ip: IpAddr,
        /// Reason from the block record, when readable
        reason: Option<String>,
    },
    /// Admitted, with headers reflecting the most restrictive scope
    Admitted {
        /// Header set for the response
        headers: RateLimitHeaders,
    },
    /// Rejected by the tier or endpoint window
    Throttled {
        /// Header set for the response, including `Retry-After`
        headers: RateLimitHeaders,
        /// Authoritative retry hint in seconds
        retry_after_secs: u64,
    },
}

impl LimiterOutcome {
    /// Whether the request should proceed to the application.
    pub fn is_admitted(&self) -> bool {
        matches!(self, LimiterOutcome::Exempt | LimiterOutcome::Admitted { .. })
    }

    /// Convert a rejection into its error, for `?`-style callers.
    ///
    /// Admitted outcomes yield the header set to attach to the response
    /// (`None` for exempt paths).
    pub fn into_result(self) -> Result<Option<RateLimitHeaders>> {
        match self {
            LimiterOutcome::Exempt => Ok(None),
            LimiterOutcome::Admitted { headers } => Ok(Some(headers)),
            LimiterOutcome::Throttled {
                retry_after_secs, ..
            } => Err(PalisadeError::RateLimitExceeded { retry_after_secs }),
            LimiterOutcome::Blocked { ip, reason } => Err(PalisadeError::IpBlocked {
                ip: ip.to_string(),
                reason,
            }),
        }
    }
}

/// The per-request rate limiter.
///
/// Holds only immutable configuration and handles to the shared store, so
/// any number of instances can run concurrently across tasks or replicas as
/// long as they share one store.
pub struct RateLimiter {
    config: Arc<LimiterConfig>,
    windows: WindowCounter,
    blocklist: BlocklistGuard,
    plans: Arc<dyn PlanLookup>,
}

impl RateLimiter {
    /// Create a limiter without a subscription system: no caller is premium.
    pub fn new(config: Arc<LimiterConfig>, store: Arc<dyn CounterStore>) -> Self {
        Self::with_plans(config, store, Arc::new(NoPremiumPlans))
    }

    /// Create a limiter with an injected premium-plan lookup.
    pub fn with_plans(
        config: Arc<LimiterConfig>,
        store: Arc<dyn CounterStore>,
        plans: Arc<dyn PlanLookup>,
    ) -> Self {
        Self {
            config,
            windows: WindowCounter::new(Arc::clone(&store)),
            blocklist: BlocklistGuard::new(store),
            plans,
        }
    }

    /// Evaluate one request.
    ///
    /// Store faults propagate as [`PalisadeError::StoreUnavailable`]: a
    /// visible per-request failure is preferred over silently unlimited
    /// throughput or silently blocked traffic. Exempt paths never reach the
    /// store and therefore stay up when it is down.
    pub async fn evaluate(&self, request: &ClientRequest) -> Result<LimiterOutcome> {
        self.evaluate_at(request, super::epoch_millis()).await
    }

    async fn evaluate_at(&self, request: &ClientRequest, now_ms: u64) -> Result<LimiterOutcome> {
        let path = scope::strip_query(&request.path);

        if self.config.is_exempt(path) {
            trace!(path = %path, "Exempt path, skipping rate limiting");
            return Ok(LimiterOutcome::Exempt);
        }

        let block = self.blocklist.is_blocked(request.ip).await?;
        if block.blocked {
            debug!(ip = %request.ip, reason = ?block.reason, "Rejecting blocked IP");
            return Ok(LimiterOutcome::Blocked {
                ip: request.ip,
                reason: block.reason,
            });
        }

        let identity = scope::resolve_identity(request, self.plans.as_ref()).await;
        let tier_limit = self.config.tier_limit(identity.tier);

        let tier_decision = self
            .windows
            .check(
                &identity.key,
                tier_limit.max_requests,
                tier_limit.window_secs,
                now_ms,
            )
            .await?;

        let mut headers = RateLimitHeaders::from_decision(&tier_decision);

        // Fail fast on a tier denial: the endpoint window is not consulted
        // (and records nothing) for an already-denied request.
        if let Some(retry_after_secs) = tier_decision.retry_after_secs {
            debug!(
                key = %identity.key,
                tier = %identity.tier,
                retry_after_secs,
                "Tier rate limit exceeded"
            );
            return Ok(LimiterOutcome::Throttled {
                headers,
                retry_after_secs,
            });
        }

        let Some(rule) = scope::resolve_endpoint_rule(&self.config.endpoint_rules, &request.method, path)
        else {
            return Ok(LimiterOutcome::Admitted { headers });
        };

        let endpoint_key = scope::endpoint_key(&identity.key, &rule.pattern);
        let endpoint_decision = self
            .windows
            .check(&endpoint_key, rule.max_requests, rule.window_secs, now_ms)
            .await?;

        // Present the more restrictive remaining count to the caller,
        // never the less restrictive one.
        if endpoint_decision.remaining < headers.remaining {
            headers.remaining = endpoint_decision.remaining;
        }

        if let Some(retry_after_secs) = endpoint_decision.retry_after_secs {
            debug!(
                key = %endpoint_key,
                pattern = %rule.pattern,
                retry_after_secs,
                "Endpoint rate limit exceeded"
            );
            headers.retry_after_secs = Some(retry_after_secs);
            return Ok(LimiterOutcome::Throttled {
                headers,
                retry_after_secs,
            });
        }

        Ok(LimiterOutcome::Admitted { headers })
    }
}
