//! Server certificate rotation
//!
//! Handles:
//! - Fetching the newest usable certificate from a certificate source
//! - Validity analysis (server-auth usability, chain trust)
//! - Periodic polling with atomic publication for the TLS handshake path
//! - rustls integration through a certificate resolver

pub mod analyzer;
pub mod certificate;
pub mod config;
pub mod defaults;
pub mod factory;
pub mod lifetime;
pub mod resolver;
pub mod selector;
pub mod source;
pub mod trust;

#[cfg(test)]
pub(crate) mod test_support;

pub use analyzer::{CertificateAnalyzer, X509Analyzer, is_usable_for_server_auth};
pub use certificate::{CertificateError, ExtendedKeyUsage, ServerCertificate};
pub use config::{ConfigError, LocalStoreOptions, SelectionOptions};
pub use factory::{
    build_local_store_source, configure_local_store_selection,
    configure_server_certificate_selection,
};
pub use lifetime::{ApplicationLifetime, LifecycleListener};
pub use resolver::ServerCertificateResolver;
pub use selector::{
    CertificateSelector, CertificateUpdated, PollingCertificateSelector, SelectorError,
    SelectorFailure, SelectorState,
};
pub use source::local_store::{
    CertificateStore, DirectoryStore, FindType, LocalStoreSource, OpenStore, StoreError,
};
pub use source::{CertificateSource, SourceError};
pub use trust::TrustAnchors;
