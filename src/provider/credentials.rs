//! Credential resolution.
//!
//! Provider configs carry only a reference (`env:BUNNY_KEY`, a vault path, a
//! literal for local testing). The resolver turns it into a secret when the
//! adapter is built; nothing here persists or logs secret material.

use std::collections::HashMap;
use std::fmt;

use crate::config::{ConfigError, ProviderConfig};

/// A resolved secret. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Resolves a provider's credential reference into a secret.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, provider: &ProviderConfig) -> Result<Secret, ConfigError>;
}

/// Resolves `env:NAME` references from the process environment. Any other
/// non-empty reference is used verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialResolver;

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, provider: &ProviderConfig) -> Result<Secret, ConfigError> {
        let reference = provider.credential.trim();
        if reference.is_empty() {
            return Err(ConfigError::Credential {
                provider: provider.name.clone(),
                reason: "no credential configured".to_string(),
            });
        }

        match reference.strip_prefix("env:") {
            Some(var) => std::env::var(var)
                .map(Secret::new)
                .map_err(|e| ConfigError::Credential {
                    provider: provider.name.clone(),
                    reason: format!("environment variable {var}: {e}"),
                }),
            None => Ok(Secret::new(reference)),
        }
    }
}

/// In-memory resolver keyed by provider name.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialResolver {
    secrets: HashMap<String, Secret>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret for a provider.
    pub fn with(mut self, provider: &str, secret: &str) -> Self {
        self.secrets.insert(provider.to_string(), Secret::new(secret));
        self
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve(&self, provider: &ProviderConfig) -> Result<Secret, ConfigError> {
        self.secrets
            .get(&provider.name)
            .cloned()
            .ok_or_else(|| ConfigError::Credential {
                provider: provider.name.clone(),
                reason: "no secret registered".to_string(),
            })
    }
}
