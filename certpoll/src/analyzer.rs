//! Certificate validity analysis
//!
//! Two independent questions are asked about a candidate certificate:
//! - can it authenticate a TLS server (private key present, EKU permits server auth)
//! - does its chain verify against the configured trust anchors right now
//!
//! Analyzers hold no mutable state and are shared freely between sources.

use crate::certificate::ServerCertificate;
use crate::trust::TrustAnchors;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use x509_parser::prelude::*;

/// Reasons a chain fails verification
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Failed to parse chain certificate: {0}")]
    Parse(String),

    #[error("Certificate is outside its validity window: {0}")]
    OutsideValidity(String),

    #[error("Signature of {subject} does not verify against {issuer}")]
    BadSignature { subject: String, issuer: String },

    #[error("Issuer of {subject} does not name {issuer}")]
    IssuerMismatch { subject: String, issuer: String },

    #[error("Certificate may not issue certificates: {0}")]
    NotAnIssuer(String),

    #[error("Chain does not lead to a trust anchor: {0}")]
    Untrusted(String),
}

/// Predicates the certificate sources use to filter candidates
pub trait CertificateAnalyzer: Send + Sync {
    /// Private key present, and either no EKU restriction or server auth among the EKUs
    fn is_usable_for_server_auth(&self, cert: &ServerCertificate) -> bool {
        is_usable_for_server_auth(cert)
    }

    /// Chain verifies against trust anchors and every link is currently valid
    fn is_chain_valid(&self, cert: &ServerCertificate) -> bool;

    fn is_valid_for_server_auth(&self, cert: &ServerCertificate) -> bool {
        self.is_usable_for_server_auth(cert) && self.is_chain_valid(cert)
    }
}

/// Fails closed: a certificate without a private key is never usable
pub fn is_usable_for_server_auth(cert: &ServerCertificate) -> bool {
    if !cert.has_private_key() {
        return false;
    }

    match cert.extended_key_usage() {
        None => true,
        Some(eku) => eku.server_auth,
    }
}

/// Analyzer verifying chains with x509-parser against a fixed set of trust anchors
#[derive(Debug, Clone, Default)]
pub struct X509Analyzer {
    anchors: TrustAnchors,
}

impl X509Analyzer {
    pub fn new(anchors: TrustAnchors) -> Self {
        Self { anchors }
    }

    pub fn anchors(&self) -> &TrustAnchors {
        &self.anchors
    }

    /// Verify the chain of `cert` as of `at`
    pub fn verify_chain(&self, cert: &ServerCertificate, at: SystemTime) -> Result<(), ChainError> {
        let at = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let parsed = cert
            .chain()
            .iter()
            .map(|der| {
                X509Certificate::from_der(der.as_ref())
                    .map(|(_, parsed)| parsed)
                    .map_err(|e| ChainError::Parse(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for link in &parsed {
            if !valid_at(link, at) {
                return Err(ChainError::OutsideValidity(link.subject().to_string()));
            }
        }

        for (i, pair) in parsed.windows(2).enumerate() {
            let (child, parent) = (&pair[0], &pair[1]);
            if child.issuer().as_raw() != parent.subject().as_raw() {
                return Err(ChainError::IssuerMismatch {
                    subject: child.subject().to_string(),
                    issuer: parent.subject().to_string(),
                });
            }
            let permitted = if self.anchors.contains(cert.chain()[i + 1].as_ref()) {
                anchor_can_issue(parent)
            } else {
                can_issue(parent)
            };
            if !permitted {
                return Err(ChainError::NotAnIssuer(parent.subject().to_string()));
            }
            if child.verify_signature(Some(parent.public_key())).is_err() {
                return Err(ChainError::BadSignature {
                    subject: child.subject().to_string(),
                    issuer: parent.subject().to_string(),
                });
            }
        }

        // A chain that contains an anchor verbatim is anchored
        if cert.chain().iter().any(|der| self.anchors.contains(der.as_ref())) {
            return Ok(());
        }

        let top = parsed
            .last()
            .ok_or_else(|| ChainError::Parse("empty chain".to_string()))?;

        for root_der in self.anchors.roots() {
            let Ok((_, root)) = X509Certificate::from_der(root_der.as_ref()) else {
                continue;
            };

            if root.subject().as_raw() == top.issuer().as_raw()
                && valid_at(&root, at)
                && anchor_can_issue(&root)
                && top.verify_signature(Some(root.public_key())).is_ok()
            {
                return Ok(());
            }
        }

        Err(ChainError::Untrusted(top.subject().to_string()))
    }
}

fn valid_at(cert: &X509Certificate<'_>, at: i64) -> bool {
    let validity = cert.validity();
    validity.not_before.timestamp() <= at && at <= validity.not_after.timestamp()
}

/// CA basic constraint set, and keyCertSign granted when key usage is restricted
fn can_issue(cert: &X509Certificate<'_>) -> bool {
    let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);
    let may_sign = match cert.key_usage() {
        Ok(Some(ku)) => ku.value.key_cert_sign(),
        Ok(None) => true,
        Err(_) => false,
    };
    is_ca && may_sign
}

/// v1 roots carry no extensions and are trusted as issuers
fn anchor_can_issue(cert: &X509Certificate<'_>) -> bool {
    cert.version() == X509Version::V1 || can_issue(cert)
}

impl CertificateAnalyzer for X509Analyzer {
    fn is_chain_valid(&self, cert: &ServerCertificate) -> bool {
        match self.verify_chain(cert, SystemTime::now()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    subject = %cert.subject(),
                    thumbprint = %cert.thumbprint(),
                    "Certificate chain rejected: {}", e
                );
                false
            }
        }
    }
}
