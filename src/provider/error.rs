use thiserror::Error;

/// Error returned by a provider adapter.
///
/// The variants are closed: every adapter maps its failures onto one of
/// these so health classification and retry policy stay uniform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Credential rejected or expired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transient network or HTTP failure.
    #[error("API error (status {status:?}): {message}")]
    Api { status: Option<u16>, message: String },

    /// Adapter is missing required configuration.
    #[error("provider misconfigured: {0}")]
    Config(String),

    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl ProviderError {
    /// Create an API error without an HTTP status.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }

    /// Whether a background probe may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Timeout)
    }

    /// Whether the error means the credential itself is bad.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Api { .. } => "api",
            Self::Config(_) => "config",
            Self::Timeout => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(ProviderError::api("reset by peer").is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(!ProviderError::Auth("expired".into()).is_retryable());
        assert!(!ProviderError::Config("no zone".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ProviderError::Api {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "API error (status Some(503)): unavailable");
        assert_eq!(err.kind(), "api");
    }
}
