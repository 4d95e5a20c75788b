//! Selector wiring
//!
//! Builds a polling selector for a source, registers it with the host lifetime
//! and runs the configurator callback.

use crate::analyzer::X509Analyzer;
use crate::config::{LocalStoreOptions, Result, SelectionOptions};
use crate::lifetime::ApplicationLifetime;
use crate::selector::{CertificateSelector, PollingCertificateSelector};
use crate::source::CertificateSource;
use crate::source::local_store::{DirectoryStore, LocalStoreSource};
use crate::trust::TrustAnchors;
use std::path::PathBuf;
use std::sync::Arc;

/// Build a selector over any source
pub fn configure_server_certificate_selection(
    lifetime: &ApplicationLifetime,
    source: Arc<dyn CertificateSource>,
    options: &SelectionOptions,
) -> Result<PollingCertificateSelector> {
    let selector = PollingCertificateSelector::new(
        lifetime,
        source,
        options.polling_interval,
        options.valid_certificates_only,
    )?;

    if !options.valid_certificates_only {
        tracing::warn!(
            source = %selector.certificate_source(),
            "Certificate chain validation is disabled, do not use this outside test environments"
        );
    }

    if let Some(configure) = &options.configure_selector {
        configure(&selector);
    }

    Ok(selector)
}

/// Analyzer for a source; trust anchors are only loaded when chains are validated
pub fn analyzer_for(trust_anchors: &[PathBuf], valid_only: bool) -> Result<X509Analyzer> {
    let anchors = if valid_only {
        TrustAnchors::load(trust_anchors)?
    } else {
        TrustAnchors::empty()
    };
    Ok(X509Analyzer::new(anchors))
}

/// Local store source described by `options`
pub fn build_local_store_source(options: &LocalStoreOptions) -> Result<LocalStoreSource> {
    options.validate()?;

    let analyzer = analyzer_for(
        &options.trust_anchors,
        options.selection.valid_certificates_only,
    )?;
    let store = DirectoryStore::new(options.location.clone());

    Ok(LocalStoreSource::new(
        options.find_value.clone(),
        options.find_type,
        Arc::new(store),
        Arc::new(analyzer),
    ))
}

/// Build a selector over a directory-backed local store
pub fn configure_local_store_selection(
    lifetime: &ApplicationLifetime,
    options: LocalStoreOptions,
) -> Result<PollingCertificateSelector> {
    let source = build_local_store_source(&options)?;
    configure_server_certificate_selection(lifetime, Arc::new(source), &options.selection)
}
