use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::certificate::CertificateError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Polling interval {interval:?} is below the minimum of {minimum:?}")]
    InvalidPollingInterval { interval: Duration, minimum: Duration },

    #[error("Failed to load trust anchors: {0}")]
    TrustAnchors(#[from] CertificateError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
