//! Secret store certificate source
//!
//! Polls a single secret in a remote secret store (Azure Key Vault REST API)
//! and decodes it into a server certificate for the certpoll selector.

pub mod client;
pub mod config;
pub mod credential;
pub mod decode;
pub mod source;

pub use client::{HttpSecretClient, KeyVaultSecret, SecretClient, SecretClientError};
pub use config::{
    KeyVaultOptions, KeyVaultSection, build_key_vault_source, configure_key_vault_selection,
};
pub use credential::{EnvTokenCredential, StaticTokenCredential, TokenCredential};
pub use decode::{DecodeError, decode_certificate};
pub use source::KeyVaultSource;
