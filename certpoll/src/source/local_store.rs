//! Local certificate store source
//!
//! Scans a certificate store for entries matching a find predicate and picks the
//! most recently issued certificate that is already in effect. Preferring the
//! latest `not_before` (rather than the latest expiry) picks up freshly rotated
//! material as soon as it lands in the store.

use super::{CertificateSource, SourceError};
use crate::analyzer::CertificateAnalyzer;
use crate::certificate::{CertificateError, ServerCertificate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur while reading a certificate store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Certificate store not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Certificate store unavailable: {0}")]
    Unavailable(String),
}

/// How the find value is matched against store entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindType {
    /// Case-insensitive substring of the subject distinguished name
    #[default]
    SubjectName,
    /// Case-insensitive exact subject distinguished name
    SubjectDistinguishedName,
    /// Case-insensitive substring of the issuer distinguished name
    IssuerName,
    /// SHA-256 thumbprint in hex; colons and spaces are ignored
    Thumbprint,
    /// Serial number in hex; colons, spaces and leading zeros are ignored
    SerialNumber,
}

impl FindType {
    pub fn matches(&self, cert: &ServerCertificate, value: &str) -> bool {
        match self {
            FindType::SubjectName => contains_ignore_case(cert.subject(), value),
            FindType::SubjectDistinguishedName => cert.subject().eq_ignore_ascii_case(value.trim()),
            FindType::IssuerName => contains_ignore_case(cert.issuer(), value),
            FindType::Thumbprint => normalize_hex(value) == cert.thumbprint(),
            FindType::SerialNumber => {
                normalize_hex(value).trim_start_matches('0')
                    == cert.serial().trim_start_matches('0')
            }
        }
    }
}

impl fmt::Display for FindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindType::SubjectName => "SubjectName",
            FindType::SubjectDistinguishedName => "SubjectDistinguishedName",
            FindType::IssuerName => "IssuerName",
            FindType::Thumbprint => "Thumbprint",
            FindType::SerialNumber => "SerialNumber",
        };
        f.write_str(name)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.trim().to_ascii_lowercase())
}

fn normalize_hex(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ':' | ' '))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// A store of certificates that can be opened for reading
pub trait CertificateStore: Send + Sync {
    /// Where the store lives, for diagnostics
    fn location(&self) -> String;

    /// Open the store read-only. The store is released when the handle drops.
    fn open_read_only(&self) -> Result<Box<dyn OpenStore + '_>, StoreError>;
}

/// A store opened for reading
pub trait OpenStore {
    fn certificates(&mut self) -> Result<Vec<ServerCertificate>, StoreError>;
}

/// Certificate store backed by a directory.
///
/// Recognised entries:
/// - `<name>.pem` / `<name>.crt` / `<name>.cer` bundles, with the key inline or in a sibling `<name>.key`
/// - `<name>/fullchain.pem` with `<name>/privkey.pem`
///
/// Entries that fail to parse are skipped with a warning.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    location: PathBuf,
}

impl DirectoryStore {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }
}

impl CertificateStore for DirectoryStore {
    fn location(&self) -> String {
        self.location.display().to_string()
    }

    fn open_read_only(&self) -> Result<Box<dyn OpenStore + '_>, StoreError> {
        if !self.location.is_dir() {
            return Err(StoreError::NotFound(self.location.clone()));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.location)? {
            entries.push(entry?.path());
        }
        entries.sort();

        Ok(Box::new(DirectorySnapshot { entries }))
    }
}

struct DirectorySnapshot {
    entries: Vec<PathBuf>,
}

impl OpenStore for DirectorySnapshot {
    fn certificates(&mut self) -> Result<Vec<ServerCertificate>, StoreError> {
        let mut certs = Vec::new();

        for path in &self.entries {
            match load_entry(path) {
                Ok(Some(cert)) => certs.push(cert),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable store entry: {}", e);
                }
            }
        }

        Ok(certs)
    }
}

fn load_entry(path: &Path) -> Result<Option<ServerCertificate>, CertificateError> {
    let (cert_path, key_path) = if path.is_dir() {
        (path.join("fullchain.pem"), path.join("privkey.pem"))
    } else {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pem" | "crt" | "cer") => (path.to_path_buf(), path.with_extension("key")),
            _ => return Ok(None),
        }
    };

    if !cert_path.is_file() {
        return Ok(None);
    }

    let key_path = key_path.is_file().then_some(key_path.as_path());
    match ServerCertificate::from_pem_files(&cert_path, key_path) {
        Ok(cert) => Ok(Some(cert)),
        // Key-only files and other non-certificate PEM
        Err(CertificateError::Empty) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Source that selects the latest matching certificate from a [`CertificateStore`]
pub struct LocalStoreSource {
    find_value: String,
    find_type: FindType,
    store: Arc<dyn CertificateStore>,
    analyzer: Arc<dyn CertificateAnalyzer>,
    description: String,
}

impl LocalStoreSource {
    pub fn new(
        find_value: impl Into<String>,
        find_type: FindType,
        store: Arc<dyn CertificateStore>,
        analyzer: Arc<dyn CertificateAnalyzer>,
    ) -> Self {
        let find_value = find_value.into();
        let description = format!(
            "Local Certificate Store: Location:{}, FindType:{}, FindValue:{}",
            store.location(),
            find_type,
            find_value
        );

        Self {
            find_value,
            find_type,
            store,
            analyzer,
            description,
        }
    }

    pub fn find_value(&self) -> &str {
        &self.find_value
    }

    pub fn find_type(&self) -> FindType {
        self.find_type
    }
}

/// Pick the matching, usable certificate with the latest `not_before <= now`
fn select_latest(
    store: &dyn CertificateStore,
    analyzer: &dyn CertificateAnalyzer,
    find_type: FindType,
    find_value: &str,
    valid_only: bool,
    now: SystemTime,
) -> Result<Option<ServerCertificate>, StoreError> {
    let candidates = {
        let mut opened = store.open_read_only()?;
        opened.certificates()?
    };

    Ok(candidates
        .into_iter()
        .filter(|cert| find_type.matches(cert, find_value))
        .filter(|cert| analyzer.is_usable_for_server_auth(cert))
        .filter(|cert| !valid_only || analyzer.is_chain_valid(cert))
        .filter(|cert| cert.not_before() <= now)
        .max_by_key(|cert| cert.not_before()))
}

#[async_trait]
impl CertificateSource for LocalStoreSource {
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn fetch_latest(
        &self,
        valid_only: bool,
    ) -> Result<Option<ServerCertificate>, SourceError> {
        let store = self.store.clone();
        let analyzer = self.analyzer.clone();
        let find_type = self.find_type;
        let find_value = self.find_value.clone();

        tokio::task::spawn_blocking(move || {
            select_latest(
                store.as_ref(),
                analyzer.as_ref(),
                find_type,
                &find_value,
                valid_only,
                SystemTime::now(),
            )
        })
        .await
        .map_err(|e| SourceError::Unavailable(format!("Store scan task failed: {}", e)))?
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.description, e)))
    }
}
