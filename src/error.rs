use thiserror::Error;

use crate::config::ConfigError;
use crate::provider::ProviderError;

/// Errors returned by operator actions on the orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// A provider call failed.
    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// No provider is currently eligible.
    #[error("no active provider")]
    NoActiveProvider,

    /// The named provider is not configured.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Provider {
            provider: "bunny".to_string(),
            source: ProviderError::Timeout,
        };
        assert_eq!(err.to_string(), "provider 'bunny' failed: operation timed out");
        assert_eq!(Error::NoActiveProvider.to_string(), "no active provider");
    }
}
