//! Tolk error types

use std::time::Duration;

/// Failure reported by a translation provider.
///
/// Providers classify their own failures exactly once, at the boundary where
/// the transport response is interpreted. The orchestration core trusts this
/// tag and never infers retryability from message text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Re-attempting the same call could plausibly succeed (rate limited,
    /// transient 5xx, network blip). `retry_after` is the provider's hint.
    #[error("{message}")]
    Retryable {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Re-attempting cannot succeed (invalid credentials, malformed request).
    #[error("{message}")]
    Fatal { message: String },
}

impl ProviderError {
    /// A retryable failure without a retry hint.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after: None,
        }
    }

    /// A rate-limit rejection, optionally carrying the provider's retry hint.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::Retryable {
            message: "rate limited".to_string(),
            retry_after,
        }
    }

    /// A failure that must not be retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Classify an HTTP-style status code.
    ///
    /// 408, 425, 429 and all 5xx statuses are retryable; everything else is
    /// fatal.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = format!("HTTP {status}: {}", message.into());
        match status {
            408 | 425 | 429 | 500..=599 => Self::Retryable {
                message,
                retry_after,
            },
            _ => Self::Fatal { message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Retryable { retry_after, .. } => *retry_after,
            Self::Fatal { .. } => None,
        }
    }
}

/// Tolk error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TolkError {
    // Provider errors
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("empty response from provider {provider}")]
    EmptyResponse { provider: String },

    #[error("provider {provider} returned {got} translations for {expected} inputs")]
    BatchMismatch {
        provider: String,
        expected: usize,
        got: usize,
    },

    // Terminal conditions
    /// No configured provider is registered and within quota.
    #[error("no provider candidates available")]
    NoCandidates,

    /// The caller abandoned the work, or the throttle was reset/destroyed
    /// while the work was queued.
    #[error("operation cancelled")]
    Cancelled,

    // Input/configuration errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TolkError {
    /// Wrap a provider failure with the provider's name.
    pub fn provider(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    /// Whether re-attempting the same call could succeed.
    ///
    /// Malformed responses count as transient: a second attempt, or the next
    /// candidate provider, may well answer correctly.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { source, .. } => source.is_retryable(),
            Self::EmptyResponse { .. } | Self::BatchMismatch { .. } => true,
            Self::NoCandidates
            | Self::Cancelled
            | Self::InvalidInput(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Provider-supplied delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// Result type alias for Tolk operations
pub type Result<T> = std::result::Result<T, TolkError>;
