//! Secret store selection configuration and wiring

use certpoll::config::{self, ConfigError, SelectionSection};
use certpoll::factory::analyzer_for;
use certpoll::{
    ApplicationLifetime, PollingCertificateSelector, SelectionOptions,
    configure_server_certificate_selection,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{DEFAULT_API_VERSION, HttpSecretClient, is_valid_secret_name};
use crate::credential::{EnvTokenCredential, TokenCredential};
use crate::source::KeyVaultSource;

/// Options for selecting from a secret store
#[derive(Clone)]
pub struct KeyVaultOptions {
    pub vault_url: String,
    pub secret_name: String,
    /// Needs read permission on `secret_name`
    pub credential: Arc<dyn TokenCredential>,
    pub api_version: String,
    /// PEM bundles of trusted roots; empty means the system bundle
    pub trust_anchors: Vec<PathBuf>,
    pub selection: SelectionOptions,
}

impl KeyVaultOptions {
    pub fn new(
        vault_url: impl Into<String>,
        secret_name: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            vault_url: vault_url.into(),
            secret_name: secret_name.into(),
            credential,
            api_version: DEFAULT_API_VERSION.to_string(),
            trust_anchors: Vec::new(),
            selection: SelectionOptions::default(),
        }
    }

    pub fn validate(&self) -> config::Result<()> {
        validate_vault_url(&self.vault_url)?;
        if self.secret_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "key vault secret_name is required".to_string(),
            ));
        }
        validate_secret_name(&self.secret_name)?;
        config::validate_polling_interval(self.selection.polling_interval)
    }
}

impl fmt::Debug for KeyVaultOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVaultOptions")
            .field("vault_url", &self.vault_url)
            .field("secret_name", &self.secret_name)
            .field("api_version", &self.api_version)
            .field("trust_anchors", &self.trust_anchors)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

fn validate_vault_url(url: &str) -> config::Result<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "vault_url must be an http(s) URL, got '{}'",
        url
    )))
}

fn validate_secret_name(name: &str) -> config::Result<()> {
    if is_valid_secret_name(name) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "secret_name may only contain letters, digits and '-', got '{}'",
        name
    )))
}

/// `[source]` fields for `type = "key_vault"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultSection {
    pub vault_url: String,
    pub secret_name: String,
    /// Environment variable holding the bearer token
    pub token_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl KeyVaultSection {
    pub fn validate(&self) -> config::Result<()> {
        validate_vault_url(&self.vault_url)?;
        if self.secret_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source.secret_name must not be empty".to_string(),
            ));
        }
        validate_secret_name(&self.secret_name)?;
        if self.token_env.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source.token_env must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_options(&self, selection: &SelectionSection) -> KeyVaultOptions {
        let mut options = KeyVaultOptions::new(
            self.vault_url.clone(),
            self.secret_name.clone(),
            Arc::new(EnvTokenCredential::new(self.token_env.clone())),
        );
        if let Some(api_version) = &self.api_version {
            options.api_version = api_version.clone();
        }
        options.trust_anchors = selection.trust_anchors.clone();
        options.selection = selection.to_options();
        options
    }
}

/// Secret store source described by `options`
pub fn build_key_vault_source(options: &KeyVaultOptions) -> config::Result<KeyVaultSource> {
    options.validate()?;

    let analyzer = analyzer_for(
        &options.trust_anchors,
        options.selection.valid_certificates_only,
    )?;
    let client = HttpSecretClient::new(options.vault_url.clone(), options.credential.clone())
        .map_err(|e| ConfigError::Validation(e.to_string()))?
        .with_api_version(options.api_version.clone());

    Ok(KeyVaultSource::new(
        options.secret_name.clone(),
        Arc::new(client),
        Arc::new(analyzer),
    ))
}

/// Build a selector over a secret store secret
pub fn configure_key_vault_selection(
    lifetime: &ApplicationLifetime,
    options: KeyVaultOptions,
) -> config::Result<PollingCertificateSelector> {
    let source = build_key_vault_source(&options)?;
    configure_server_certificate_selection(lifetime, Arc::new(source), &options.selection)
}
