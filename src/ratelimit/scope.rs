//! Scope resolution: which key and which limits apply to a request.
//!
//! Two requests sharing a key share a counting window, so the key is the
//! sole correctness boundary between clients. Keys are constructed so that
//! distinct identities can never collide: `user:<id>` for authenticated
//! callers, `ip:<addr>` for anonymous ones, with an `:endpoint:<pattern>`
//! suffix for endpoint-scoped counters.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::config::{EndpointRule, Tier};

/// Per-request input supplied by the collaborating HTTP layer.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// HTTP method, e.g. `GET`
    pub method: String,
    /// Request path; a query string, if present, is ignored
    pub path: String,
    /// Client IP address
    pub ip: IpAddr,
    /// Authenticated user id, if the authentication subsystem supplied one
    pub user_id: Option<String>,
}

/// Capability lookup supplied by the external subscription collaborator.
#[async_trait]
pub trait PlanLookup: Send + Sync {
    /// Whether the given user is on a premium plan.
    async fn is_premium(&self, user_id: &str) -> bool;
}

/// A [`PlanLookup`] for deployments without a subscription system: nobody
/// is premium.
pub struct NoPremiumPlans;

#[async_trait]
impl PlanLookup for NoPremiumPlans {
    async fn is_premium(&self, _user_id: &str) -> bool {
        false
    }
}

/// The counting identity of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Tier-level rate limit key
    pub key: String,
    /// The tier whose limits apply
    pub tier: Tier,
}

/// Derive the rate-limit identity for a request.
pub async fn resolve_identity(request: &ClientRequest, plans: &dyn PlanLookup) -> Identity {
    match &request.user_id {
        Some(user_id) => {
            let tier = if plans.is_premium(user_id).await {
                Tier::Premium
            } else {
                Tier::Authenticated
            };
            Identity {
                key: format!("user:{}", user_id),
                tier,
            }
        }
        None => Identity {
            key: format!("ip:{}", request.ip),
            tier: Tier::Anonymous,
        },
    }
}

/// Strip the query string from a path.
pub fn strip_query(path: &str) -> &str {
    match path.split_once('?') {
        Some((path, _)) => path,
        None => path,
    }
}

/// Find the endpoint rule applying to a method and path, if any.
///
/// Exact pattern matches are checked first across all rules; wildcard
/// patterns are then tried in declaration order, and the first structural
/// match wins. When two wildcard patterns could both match, declaration
/// order is the tie-break.
pub fn resolve_endpoint_rule<'a>(
    rules: &'a [EndpointRule],
    method: &str,
    path: &str,
) -> Option<&'a EndpointRule> {
    let target = format!("{}:{}", method, strip_query(path));

    if let Some(rule) = rules.iter().find(|rule| rule.pattern == target) {
        return Some(rule);
    }

    rules
        .iter()
        .filter(|rule| rule.pattern.contains('*'))
        .find(|rule| pattern_matches(&rule.pattern, &target))
}

/// Segment-wise pattern match where `*` matches exactly one non-empty,
/// non-slash path segment, anchored at both ends.
fn pattern_matches(pattern: &str, target: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let target_segments: Vec<&str> = target.split('/').collect();

    if pattern_segments.len() != target_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(&target_segments)
        .all(|(p, t)| if *p == "*" { !t.is_empty() } else { p == t })
}

/// The endpoint-scoped counter key: tier key plus the sanitized pattern.
///
/// Sanitizing keeps the key free of separator characters so endpoint scopes
/// can never collide with each other or with tier keys.
pub fn endpoint_key(base_key: &str, pattern: &str) -> String {
    let sanitized: String = pattern
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}:endpoint:{}", base_key, sanitized)
}
