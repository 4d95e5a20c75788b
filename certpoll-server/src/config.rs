//! certpoll.toml

use certpoll::config::{ConfigError, LocalStoreSection, Result, SelectionSection};
use certpoll::{CertificateSource, SelectionOptions, build_local_store_source};
use certpoll_keyvault::{KeyVaultSection, build_key_vault_source};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/certpoll/certpoll.toml";

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub selection: SelectionSection,
    pub source: SourceSection,
}

/// Where certificates come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSection {
    LocalStore(LocalStoreSection),
    KeyVault(KeyVaultSection),
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        match &self.source {
            SourceSection::LocalStore(section) => section.validate(),
            SourceSection::KeyVault(section) => section.validate(),
        }
    }

    pub fn selection_options(&self) -> SelectionOptions {
        self.selection.to_options()
    }

    pub fn build_source(&self) -> Result<Arc<dyn CertificateSource>> {
        match &self.source {
            SourceSection::LocalStore(section) => {
                let options = section.to_options(&self.selection);
                Ok(Arc::new(build_local_store_source(&options)?))
            }
            SourceSection::KeyVault(section) => {
                let options = section.to_options(&self.selection);
                Ok(Arc::new(build_key_vault_source(&options)?))
            }
        }
    }
}
