//! Bearer token credentials for the secret store

use async_trait::async_trait;
use std::fmt;

use crate::client::SecretClientError;

/// Supplies a bearer token for each secret store request
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self) -> Result<String, SecretClientError>;
}

/// A fixed token, e.g. one injected by the platform at startup
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenCredential").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<String, SecretClientError> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every request, so an
/// externally refreshed token is picked up without a restart
#[derive(Debug, Clone)]
pub struct EnvTokenCredential {
    variable: String,
}

impl EnvTokenCredential {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

#[async_trait]
impl TokenCredential for EnvTokenCredential {
    async fn token(&self) -> Result<String, SecretClientError> {
        match std::env::var(&self.variable) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(SecretClientError::Credential(format!(
                "environment variable {} is not set",
                self.variable
            ))),
        }
    }
}
