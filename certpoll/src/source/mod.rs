//! Certificate sources
//!
//! A source knows where certificates live (a local store, a remote secret
//! store) and how to pick the best current candidate from it. Sources are
//! immutable after construction; the selector polls them.

pub mod local_store;

use crate::certificate::ServerCertificate;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a certificate source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The backend could not be reached or returned malformed data
    #[error("Certificate source unavailable: {0}")]
    Unavailable(String),

    /// A candidate was found but failed the usability/validity checks
    #[error("Certificate rejected: {0}")]
    Rejected(String),
}

/// Capability of fetching the current best server certificate from one backend
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Human-readable provenance, stable for a given configuration
    fn describe(&self) -> String;

    /// Fetch the newest usable certificate.
    ///
    /// With `valid_only` the candidate must also pass chain validation. Returns
    /// `Ok(None)` when the backend answered but nothing matched.
    async fn fetch_latest(&self, valid_only: bool)
    -> Result<Option<ServerCertificate>, SourceError>;
}
