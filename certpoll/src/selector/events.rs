use super::SelectorError;
use crate::certificate::ServerCertificate;
use std::sync::Arc;

/// Raised after a new certificate has been published
#[derive(Debug, Clone)]
pub struct CertificateUpdated {
    pub certificate: Arc<ServerCertificate>,
    /// `None` for the first publication
    pub previous: Option<Arc<ServerCertificate>>,
}

/// Raised when a steady-state poll fails; the published certificate is kept
#[derive(Debug, Clone)]
pub struct SelectorFailure {
    pub error: SelectorError,
    pub certificate_source: String,
}

pub(super) type UpdateObserver = Arc<dyn Fn(&CertificateUpdated) + Send + Sync>;
pub(super) type FailureObserver = Arc<dyn Fn(&SelectorFailure) + Send + Sync>;
