//! Error types for the RPC request router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Error taxonomy for the request router
///
/// Transient provider failures are absorbed inside the failover loop;
/// callers of `send` only ever observe a final success, `QueueFull`,
/// `AllProvidersExhausted`, or `NonRetryableCall`.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("request queue is full ({limit} pending calls)")]
    QueueFull { limit: usize },

    #[error("all providers exhausted: {message}")]
    AllProvidersExhausted { message: String },

    #[error("non-retryable call failure: {0}")]
    NonRetryableCall(String),

    #[error("provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("result channel closed before the call completed")]
    ChannelClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Create a new provider error
    pub fn provider<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Build the terminal error for a call that ran out of providers,
    /// carrying the most recent underlying failure if one was observed
    pub fn exhausted(last_error: Option<String>) -> Self {
        Self::AllProvidersExhausted {
            message: last_error
                .unwrap_or_else(|| "no provider available within the wait ceiling".to_string()),
        }
    }

    /// Check if this error is retryable against another provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::Provider { .. } | RouterError::Network(_)
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RouterError::QueueFull { .. } => "queue_full",
            RouterError::AllProvidersExhausted { .. } => "exhausted",
            RouterError::NonRetryableCall(_) => "non_retryable",
            RouterError::Provider { .. } => "provider",
            RouterError::UnknownCapability(_) => "validation",
            RouterError::Config(_) => "config",
            RouterError::Network(_) => "network",
            RouterError::InvalidUrl(_) => "validation",
            RouterError::Serialization(_) => "serialization",
            RouterError::ChannelClosed => "internal",
            RouterError::Internal(_) => "internal",
        }
    }
}

/// Message fragments that identify caller-fault failures. A call failing
/// with one of these is surfaced immediately instead of failing over,
/// and does not count toward the provider's error streak.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "invalid argument",
    "invalid params",
    "execution reverted",
    "out of gas",
    "gas required exceeds allowance",
    "method not found",
    "insufficient funds",
    "nonce too low",
    "already known",
];

/// Classify a provider error message as a caller-fault failure
pub fn is_non_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    NON_RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}
