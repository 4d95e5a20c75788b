//! Server certificate model - an immutable, parsed certificate chain with its optional key

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls_pemfile::Item;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use x509_parser::extensions::ExtendedKeyUsage as ParsedExtendedKeyUsage;
use x509_parser::prelude::*;

pub const OID_SERVER_AUTH: &str = "1.3.6.1.5.5.7.3.1";
const OID_CLIENT_AUTH: &str = "1.3.6.1.5.5.7.3.2";
const OID_CODE_SIGNING: &str = "1.3.6.1.5.5.7.3.3";
const OID_EMAIL_PROTECTION: &str = "1.3.6.1.5.5.7.3.4";
const OID_TIME_STAMPING: &str = "1.3.6.1.5.5.7.3.8";
const OID_OCSP_SIGNING: &str = "1.3.6.1.5.5.7.3.9";
const OID_ANY_EXTENDED_KEY_USAGE: &str = "2.5.29.37.0";

/// Errors that can occur while loading a certificate
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("No certificate found in PEM data")]
    Empty,

    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Certificate has no private key")]
    MissingPrivateKey,

    #[error("Failed to load signing key: {0}")]
    SigningKey(String),
}

/// Declared extended key usage purposes of a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    /// Whether `id-kp-serverAuth` is among the declared purposes
    pub server_auth: bool,
    /// Dotted OIDs of every declared purpose
    pub purposes: Vec<String>,
}

impl ExtendedKeyUsage {
    fn from_parsed(eku: &ParsedExtendedKeyUsage<'_>) -> Self {
        let flagged = [
            (eku.any, OID_ANY_EXTENDED_KEY_USAGE),
            (eku.server_auth, OID_SERVER_AUTH),
            (eku.client_auth, OID_CLIENT_AUTH),
            (eku.code_signing, OID_CODE_SIGNING),
            (eku.email_protection, OID_EMAIL_PROTECTION),
            (eku.time_stamping, OID_TIME_STAMPING),
            (eku.ocsp_signing, OID_OCSP_SIGNING),
        ];

        let mut purposes: Vec<String> = flagged
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, oid)| oid.to_string())
            .collect();
        purposes.extend(eku.other.iter().map(|oid| oid.to_id_string()));

        Self {
            server_auth: purposes.iter().any(|oid| oid == OID_SERVER_AUTH),
            purposes,
        }
    }
}

/// A certificate chain (leaf first) and its optional private key.
///
/// Instances are never mutated after construction; sources create them and the
/// selector shares them behind an `Arc`. Equality compares certificate and key
/// bytes, not identity.
pub struct ServerCertificate {
    chain: Vec<CertificateDer<'static>>,
    private_key: Option<PrivateKeyDer<'static>>,
    subject: String,
    issuer: String,
    common_names: Vec<String>,
    serial: String,
    thumbprint: String,
    not_before: SystemTime,
    not_after: SystemTime,
    validity_text: (String, String),
    extended_key_usage: Option<ExtendedKeyUsage>,
    certified_key: OnceLock<Arc<CertifiedKey>>,
}

impl ServerCertificate {
    /// Build from a DER chain (leaf first) and an optional private key
    pub fn from_der(
        chain: Vec<CertificateDer<'static>>,
        private_key: Option<PrivateKeyDer<'static>>,
    ) -> Result<Self, CertificateError> {
        let leaf = chain.first().ok_or(CertificateError::Empty)?;
        let (_, cert) = X509Certificate::from_der(leaf.as_ref())
            .map_err(|e| CertificateError::ParseError(e.to_string()))?;

        let extended_key_usage = cert
            .extended_key_usage()
            .map_err(|e| CertificateError::ParseError(e.to_string()))?
            .map(|ext| ExtendedKeyUsage::from_parsed(ext.value));

        let common_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .map(str::to_string)
            .collect();

        let validity = cert.validity();
        let subject = cert.subject().to_string();
        let issuer = cert.issuer().to_string();
        let serial = hex::encode(cert.raw_serial());
        let not_before = system_time_from_timestamp(validity.not_before.timestamp());
        let not_after = system_time_from_timestamp(validity.not_after.timestamp());
        let validity_text = (
            validity.not_before.to_string(),
            validity.not_after.to_string(),
        );
        let thumbprint = hex::encode(Sha256::digest(leaf.as_ref()));

        Ok(Self {
            chain,
            private_key,
            subject,
            issuer,
            common_names,
            serial,
            thumbprint,
            not_before,
            not_after,
            validity_text,
            extended_key_usage,
            certified_key: OnceLock::new(),
        })
    }

    /// Parse a PEM bundle containing the chain and optionally the private key
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateError> {
        let mut chain = Vec::new();
        let mut private_key: Option<PrivateKeyDer<'static>> = None;

        let mut reader = pem;
        for item in rustls_pemfile::read_all(&mut reader) {
            let item = item.map_err(|e| CertificateError::ParseError(e.to_string()))?;
            match item {
                Item::X509Certificate(der) => chain.push(der),
                Item::Pkcs8Key(key) if private_key.is_none() => private_key = Some(key.into()),
                Item::Pkcs1Key(key) if private_key.is_none() => private_key = Some(key.into()),
                Item::Sec1Key(key) if private_key.is_none() => private_key = Some(key.into()),
                _ => {}
            }
        }

        if chain.is_empty() {
            return Err(CertificateError::Empty);
        }

        Self::from_der(chain, private_key)
    }

    /// Load a PEM certificate file and, if given, a separate PEM key file
    pub fn from_pem_files(cert_path: &Path, key_path: Option<&Path>) -> Result<Self, CertificateError> {
        let mut pem = std::fs::read(cert_path)
            .map_err(|e| CertificateError::Io(cert_path.to_path_buf(), e))?;

        if let Some(key_path) = key_path {
            let key_pem = std::fs::read(key_path)
                .map_err(|e| CertificateError::Io(key_path.to_path_buf(), e))?;
            pem.push(b'\n');
            pem.extend_from_slice(&key_pem);
        }

        Self::from_pem(&pem)
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        // from_der rejects empty chains
        &self.chain[0]
    }

    pub fn private_key(&self) -> Option<&PrivateKeyDer<'static>> {
        self.private_key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Subject distinguished name, e.g. `CN=example.com, O=Example`
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn common_names(&self) -> &[String] {
        &self.common_names
    }

    /// Serial number as lowercase hex
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// SHA-256 of the leaf DER as lowercase hex
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    /// `None` when the certificate carries no EKU extension
    pub fn extended_key_usage(&self) -> Option<&ExtendedKeyUsage> {
        self.extended_key_usage.as_ref()
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    /// Whether `at` falls inside `[not_before, not_after]`
    pub fn is_within_validity(&self, at: SystemTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// rustls signing material for this certificate, built once and cached
    pub fn certified_key(&self) -> Result<Arc<CertifiedKey>, CertificateError> {
        if let Some(key) = self.certified_key.get() {
            return Ok(key.clone());
        }

        let private_key = self
            .private_key
            .as_ref()
            .ok_or(CertificateError::MissingPrivateKey)?;

        let signing_key = crypto_provider()
            .key_provider
            .load_private_key(private_key.clone_key())
            .map_err(|e| CertificateError::SigningKey(e.to_string()))?;

        let certified = Arc::new(CertifiedKey::new(self.chain.clone(), signing_key));
        Ok(self.certified_key.get_or_init(|| certified).clone())
    }
}

/// The process-wide rustls provider, or aws-lc-rs when none is installed
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn system_time_from_timestamp(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}

impl Clone for ServerCertificate {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            private_key: self.private_key.as_ref().map(|key| key.clone_key()),
            subject: self.subject.clone(),
            issuer: self.issuer.clone(),
            common_names: self.common_names.clone(),
            serial: self.serial.clone(),
            thumbprint: self.thumbprint.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
            validity_text: self.validity_text.clone(),
            extended_key_usage: self.extended_key_usage.clone(),
            certified_key: self.certified_key.clone(),
        }
    }
}

impl PartialEq for ServerCertificate {
    fn eq(&self, other: &Self) -> bool {
        let keys_match = match (&self.private_key, &other.private_key) {
            (Some(a), Some(b)) => a.secret_der() == b.secret_der(),
            (None, None) => true,
            _ => false,
        };
        keys_match && self.chain == other.chain
    }
}

impl Eq for ServerCertificate {}

impl fmt::Debug for ServerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCertificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial)
            .field("thumbprint", &self.thumbprint)
            .field("chain_len", &self.chain.len())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

impl fmt::Display for ServerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subject:{};Thumbprint:{};NotBefore:{};NotAfter:{}",
            self.subject, self.thumbprint, self.validity_text.0, self.validity_text.1
        )
    }
}
