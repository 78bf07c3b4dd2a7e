//! Error types for the cache policy engine.

use std::time::Duration;

/// Proxy errors.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Transport-level failure (connection refused, DNS, TLS, reset).
    #[error("network error: {message}")]
    Network { message: String },

    /// NetworkFirst race lost to the timer and no stored entry could be served.
    #[error("network timeout after {after:?}: {url}")]
    Timeout { url: String, after: Duration },

    /// Partition storage or persistence failure.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Rule failed validation.
    #[error("invalid cache rule {pattern}: {reason}")]
    InvalidRule { pattern: String, reason: String },

    /// Manifest could not be read or parsed.
    #[error("invalid manifest: {message}")]
    InvalidManifest { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ProxyError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::InvalidRule { .. } => 1,
            Self::InvalidManifest { .. } => 1,

            // Network/transient
            Self::Network { .. } => 5,
            Self::Timeout { .. } => 5,

            Self::Cache { .. } => 6,
        }
    }

    /// Whether the caller may retry. The engine itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
