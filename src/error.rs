//! Error types for the Palisade throttling core.

use thiserror::Error;

/// Main error type for Palisade operations.
#[derive(Error, Debug)]
pub enum PalisadeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller has exceeded a rate limit (tier or endpoint scope).
    #[error("Rate limit exceeded, retry in {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds until the oldest counted event ages out of the window
        retry_after_secs: u64,
    },

    /// The caller's IP address is administratively blocked.
    #[error("IP {ip} is blocked: {}", .reason.as_deref().unwrap_or("no reason recorded"))]
    IpBlocked {
        /// The blocked address
        ip: String,
        /// Reason recorded when the block was created, if readable
        reason: Option<String>,
    },

    /// Infrastructure fault communicating with the counter store.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PalisadeError {
    /// The HTTP status code a collaborating HTTP layer should map this
    /// error to.
    ///
    /// `RateLimitExceeded` and `IpBlocked` are expected, user-facing
    /// outcomes; `StoreUnavailable` is a fatal per-request fault.
    pub fn http_status(&self) -> u16 {
        match self {
            PalisadeError::RateLimitExceeded { .. } => 429,
            PalisadeError::IpBlocked { .. } => 403,
            PalisadeError::StoreUnavailable(_) => 503,
            PalisadeError::Config(_) | PalisadeError::Io(_) => 500,
        }
    }
}

/// Result type alias for Palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;
