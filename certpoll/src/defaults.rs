use std::time::Duration;

/// Polling faster than this risks hammering the backing source.
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_STORE_LOCATION: &str = "/etc/certpoll/store";

pub const SYSTEM_TRUST_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];
