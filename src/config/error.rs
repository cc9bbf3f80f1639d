use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to load configuration.
    #[error("failed to load config: {0}")]
    LoadFailed(String),

    /// Failed to save configuration.
    #[error("failed to save config: {0}")]
    SaveFailed(String),

    /// Configuration validation failed.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A preference rule is malformed.
    #[error("invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A preference rule names a provider that is not configured.
    #[error("rule '{rule}' references unknown provider: {provider}")]
    UnknownProvider { rule: String, provider: String },

    /// A credential reference could not be resolved.
    #[error("credential for provider '{provider}' unavailable: {reason}")]
    Credential { provider: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
