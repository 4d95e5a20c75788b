use async_trait::async_trait;
use certpoll::{CertificateAnalyzer, CertificateSource, ServerCertificate, SourceError};
use std::sync::Arc;

use crate::client::SecretClient;
use crate::decode::decode_certificate;

/// Source reading the current version of one secret from a secret store
pub struct KeyVaultSource {
    secret_name: String,
    client: Arc<dyn SecretClient>,
    analyzer: Arc<dyn CertificateAnalyzer>,
    description: String,
}

impl KeyVaultSource {
    pub fn new(
        secret_name: impl Into<String>,
        client: Arc<dyn SecretClient>,
        analyzer: Arc<dyn CertificateAnalyzer>,
    ) -> Self {
        let secret_name = secret_name.into();
        let description = format!("KeyVault:{};Secret={}", client.vault_url(), secret_name);

        Self {
            secret_name,
            client,
            analyzer,
            description,
        }
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }
}

#[async_trait]
impl CertificateSource for KeyVaultSource {
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn fetch_latest(
        &self,
        valid_only: bool,
    ) -> Result<Option<ServerCertificate>, SourceError> {
        let secret = match self.client.get_secret(&self.secret_name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                tracing::debug!(source = %self.description, "Secret not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(SourceError::Unavailable(format!(
                    "Failed to fetch the server certificate from {}: {}",
                    self.description, e
                )));
            }
        };

        let cert = decode_certificate(&secret.value).map_err(|e| {
            SourceError::Unavailable(format!(
                "Secret {} does not hold a certificate (content type {}): {}",
                self.secret_name,
                secret.content_type.as_deref().unwrap_or("unset"),
                e
            ))
        })?;

        let usable = self.analyzer.is_usable_for_server_auth(&cert);
        let accepted = if valid_only {
            usable && self.analyzer.is_chain_valid(&cert)
        } else {
            usable
        };

        if accepted {
            return Ok(Some(cert));
        }

        Err(SourceError::Rejected(format!(
            "The latest certificate in {} is not valid for server authentication. \
             SecretVersion={}, IsValid={}, IsAllowedForServerAuth={}",
            self.description,
            secret.version.as_deref().unwrap_or("unknown"),
            self.analyzer.is_chain_valid(&cert),
            usable
        )))
    }
}
