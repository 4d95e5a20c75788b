//! Trust anchors for certificate chain validation

use crate::certificate::CertificateError;
use crate::defaults::SYSTEM_TRUST_BUNDLES;
use rustls::pki_types::CertificateDer;
use std::path::{Path, PathBuf};

/// Root certificates a chain must lead to in order to be trusted
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    roots: Vec<CertificateDer<'static>>,
}

impl TrustAnchors {
    pub fn new(roots: Vec<CertificateDer<'static>>) -> Self {
        Self { roots }
    }

    /// No anchors; every chain fails validation
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every certificate from the given PEM bundles
    pub fn from_pem_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CertificateError> {
        let mut roots = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let pem =
                std::fs::read(path).map_err(|e| CertificateError::Io(path.to_path_buf(), e))?;

            let mut reader = pem.as_slice();
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| {
                    CertificateError::ParseError(format!("{}: {}", path.display(), e))
                })?;
                roots.push(cert);
            }
        }

        Ok(Self { roots })
    }

    /// Load the first well-known system bundle that exists
    pub fn system() -> Result<Self, CertificateError> {
        match SYSTEM_TRUST_BUNDLES.iter().map(Path::new).find(|p| p.exists()) {
            Some(bundle) => {
                let anchors = Self::from_pem_files(&[bundle])?;
                tracing::debug!(
                    bundle = %bundle.display(),
                    roots = anchors.len(),
                    "Loaded system trust anchors"
                );
                Ok(anchors)
            }
            None => {
                tracing::warn!(
                    "No system trust bundle found, chain validation will reject every certificate"
                );
                Ok(Self::empty())
            }
        }
    }

    /// Configured bundles, or the system bundle when none are configured
    pub fn load(paths: &[PathBuf]) -> Result<Self, CertificateError> {
        if paths.is_empty() {
            Self::system()
        } else {
            Self::from_pem_files(paths)
        }
    }

    pub fn roots(&self) -> &[CertificateDer<'static>] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether the exact DER encoding is one of the anchors
    pub fn contains(&self, der: &[u8]) -> bool {
        self.roots.iter().any(|root| root.as_ref() == der)
    }
}
