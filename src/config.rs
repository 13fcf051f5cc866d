//! Configuration for the Palisade throttling core.
//!
//! All configuration is immutable after startup: tier definitions, endpoint
//! rules, and exempt paths are loaded once and passed by reference into the
//! limiter. There is no runtime mutation path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{PalisadeError, Result};

/// Identity class a rate-limit tier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Unauthenticated caller, keyed by IP address
    Anonymous,
    /// Authenticated caller on the base plan
    Authenticated,
    /// Authenticated caller on a premium plan
    Premium,
}

impl Tier {
    /// Tier name as it appears in keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Authenticated => "authenticated",
            Tier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request limit over a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    /// Maximum requests allowed within the window
    pub max_requests: u64,
    /// Window duration in seconds
    pub window_secs: u64,
}

/// The fixed set of tier limits, one per identity class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_anonymous_limit")]
    pub anonymous: TierLimit,
    #[serde(default = "default_authenticated_limit")]
    pub authenticated: TierLimit,
    #[serde(default = "default_premium_limit")]
    pub premium: TierLimit,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous_limit(),
            authenticated: default_authenticated_limit(),
            premium: default_premium_limit(),
        }
    }
}

fn default_anonymous_limit() -> TierLimit {
    TierLimit {
        max_requests: 60,
        window_secs: 60,
    }
}

fn default_authenticated_limit() -> TierLimit {
    TierLimit {
        max_requests: 300,
        window_secs: 60,
    }
}

fn default_premium_limit() -> TierLimit {
    TierLimit {
        max_requests: 1000,
        window_secs: 60,
    }
}

/// A route-specific limit layered on top of the tier limit.
///
/// The pattern has the form `METHOD:/path/with/*` where `*` matches exactly
/// one non-slash path segment. Rules are evaluated in declaration order:
/// exact string matches first, then wildcard patterns, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRule {
    /// Route pattern, e.g. `POST:/api/auth/login` or `GET:/api/market/quote/*`
    pub pattern: String,
    /// Maximum requests allowed within the window
    pub max_requests: u64,
    /// Window duration in seconds
    pub window_secs: u64,
}

/// Complete limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Per-tier sliding window limits
    #[serde(default)]
    pub tiers: TierConfig,

    /// Endpoint-specific rules, kept in declaration order
    #[serde(default)]
    pub endpoint_rules: Vec<EndpointRule>,

    /// Paths that bypass the blocklist and all counting (health checks)
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            tiers: TierConfig::default(),
            endpoint_rules: Vec::new(),
            exempt_paths: default_exempt_paths(),
        }
    }
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string()]
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PalisadeError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// The limit applying to a given tier.
    pub fn tier_limit(&self, tier: Tier) -> TierLimit {
        match tier {
            Tier::Anonymous => self.tiers.anonymous,
            Tier::Authenticated => self.tiers.authenticated,
            Tier::Premium => self.tiers.premium,
        }
    }

    /// Whether a path is exempt from blocking and counting entirely.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let config = LimiterConfig::default();

        assert_eq!(config.tier_limit(Tier::Anonymous).max_requests, 60);
        assert_eq!(config.tier_limit(Tier::Anonymous).window_secs, 60);
        assert_eq!(config.tier_limit(Tier::Authenticated).max_requests, 300);
        assert_eq!(config.tier_limit(Tier::Premium).max_requests, 1000);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
tiers:
  anonymous:
    max_requests: 30
    window_secs: 60
  authenticated:
    max_requests: 120
    window_secs: 60
  premium:
    max_requests: 600
    window_secs: 60
endpoint_rules:
  - pattern: "POST:/api/auth/login"
    max_requests: 5
    window_secs: 300
  - pattern: "GET:/api/market/quote/*"
    max_requests: 20
    window_secs: 60
exempt_paths:
  - /health
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.tier_limit(Tier::Anonymous).max_requests, 30);
        assert_eq!(config.endpoint_rules.len(), 2);
        assert_eq!(config.endpoint_rules[0].pattern, "POST:/api/auth/login");
        assert_eq!(config.endpoint_rules[0].window_secs, 300);
        assert!(config.is_exempt("/health"));
        assert!(!config.is_exempt("/ready"));
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let yaml = r#"
endpoint_rules:
  - pattern: "POST:/api/orders"
    max_requests: 10
    window_secs: 60
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();

        // Unspecified sections fall back to defaults.
        assert_eq!(config.tier_limit(Tier::Anonymous).max_requests, 60);
        assert!(config.is_exempt("/health"));
        assert!(config.is_exempt("/ready"));
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = LimiterConfig::from_yaml("endpoint_rules: 42");
        assert!(matches!(result, Err(PalisadeError::Config(_))));
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Anonymous.to_string(), "anonymous");
        assert_eq!(Tier::Authenticated.to_string(), "authenticated");
        assert_eq!(Tier::Premium.to_string(), "premium");
    }
}
