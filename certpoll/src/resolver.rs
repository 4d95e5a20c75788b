//! rustls integration
//!
//! Resolves the server certificate for each handshake from a selector. The
//! signing key is built once per certificate and cached on it, so a handshake
//! only pays for a lock-free load.

use crate::certificate::crypto_provider;
use crate::selector::CertificateSelector;
use rustls::ServerConfig;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::sync::Arc;

/// Certificate resolver backed by a [`CertificateSelector`]
pub struct ServerCertificateResolver {
    selector: Arc<dyn CertificateSelector>,
}

impl ServerCertificateResolver {
    pub fn new(selector: Arc<dyn CertificateSelector>) -> Self {
        Self { selector }
    }

    /// Signing material for the currently published certificate
    pub fn certified_key(&self) -> Option<Arc<CertifiedKey>> {
        let Some(cert) = self.selector.select() else {
            tracing::warn!(
                source = %self.selector.certificate_source(),
                "No server certificate published yet, TLS handshake will fail"
            );
            return None;
        };

        match cert.certified_key() {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(
                    subject = %cert.subject(),
                    thumbprint = %cert.thumbprint(),
                    "Failed to load signing key: {}", e
                );
                None
            }
        }
    }

    /// A server config that resolves every handshake through `selector`
    pub fn server_config(
        selector: Arc<dyn CertificateSelector>,
    ) -> Result<ServerConfig, rustls::Error> {
        Ok(ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(Self::new(selector))))
    }
}

impl std::fmt::Debug for ServerCertificateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCertificateResolver")
            .field("source", &self.selector.certificate_source())
            .field("has_certificate", &self.selector.select().is_some())
            .finish()
    }
}

impl ResolvesServerCert for ServerCertificateResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.certified_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::ServerCertificate;
    use crate::test_support::{Eku, TestCa, fresh};
    use arc_swap::ArcSwapOption;
    use rustls::pki_types::{CertificateDer, ServerName};
    use rustls::{ClientConfig, ClientConnection, Connection, RootCertStore, ServerConnection};
    use time::{Duration, OffsetDateTime};

    #[derive(Default)]
    struct FixedSelector {
        current: ArcSwapOption<ServerCertificate>,
    }

    impl FixedSelector {
        fn publish(&self, cert: ServerCertificate) {
            self.current.store(Some(Arc::new(cert)));
        }
    }

    impl CertificateSelector for FixedSelector {
        fn select(&self) -> Option<Arc<ServerCertificate>> {
            self.current.load_full()
        }

        fn certificate_source(&self) -> &str {
            "fixed"
        }

        fn valid_certificates_only(&self) -> bool {
            true
        }
    }

    fn transfer(from: &mut Connection, to: &mut Connection) -> std::io::Result<()> {
        let mut buf = Vec::new();
        while from.wants_write() {
            from.write_tls(&mut buf)?;
        }

        let mut reader = buf.as_slice();
        while !reader.is_empty() {
            to.read_tls(&mut reader)?;
        }
        Ok(())
    }

    /// In-memory handshake, returning the chain the client saw
    fn handshake(
        server_config: ServerConfig,
        root: CertificateDer<'static>,
        server_name: &str,
    ) -> Vec<CertificateDer<'static>> {
        let mut roots = RootCertStore::empty();
        roots.add(root).unwrap();
        let client_config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let name = ServerName::try_from(server_name.to_string()).unwrap();
        let mut client = Connection::Client(
            ClientConnection::new(Arc::new(client_config), name).unwrap(),
        );
        let mut server = Connection::Server(ServerConnection::new(Arc::new(server_config)).unwrap());

        for _ in 0..10 {
            transfer(&mut client, &mut server).unwrap();
            server.process_new_packets().unwrap();
            transfer(&mut server, &mut client).unwrap();
            client.process_new_packets().unwrap();

            if !client.is_handshaking() && !server.is_handshaking() {
                break;
            }
        }

        assert!(!client.is_handshaking());
        client.peer_certificates().unwrap().to_vec()
    }

    #[test]
    fn test_nothing_published_resolves_to_none() {
        let resolver = ServerCertificateResolver::new(Arc::new(FixedSelector::default()));
        assert!(resolver.certified_key().is_none());
    }

    #[test]
    fn test_missing_private_key_resolves_to_none() {
        let selector = Arc::new(FixedSelector::default());
        let cert = fresh("nokey.test");
        selector.publish(ServerCertificate::from_der(cert.chain().to_vec(), None).unwrap());

        let resolver = ServerCertificateResolver::new(selector);
        assert!(resolver.certified_key().is_none());
    }

    #[test]
    fn test_resolver_follows_selector() {
        let selector = Arc::new(FixedSelector::default());
        let resolver = ServerCertificateResolver::new(selector.clone());

        let first = fresh("follow.test");
        selector.publish(first.clone());
        let key = resolver.certified_key().unwrap();
        assert_eq!(key.cert, first.chain());
        assert!(Arc::ptr_eq(&key, &resolver.certified_key().unwrap()));

        let second = fresh("follow.test");
        selector.publish(second.clone());
        assert_eq!(resolver.certified_key().unwrap().cert, second.chain());
    }

    #[test]
    fn test_handshake_presents_published_certificate() {
        let now = OffsetDateTime::now_utc();
        let ca = TestCa::new();
        let selector = Arc::new(FixedSelector::default());
        let config = || ServerCertificateResolver::server_config(selector.clone()).unwrap();

        let first = ca.issue(
            "handshake.test",
            now - Duration::days(1),
            now + Duration::days(30),
            Eku::ServerAuth,
        );
        selector.publish(first.clone());
        let seen = handshake(config(), ca.certificate_der(), "handshake.test");
        assert_eq!(seen[0], *first.leaf());

        let second = ca.issue(
            "handshake.test",
            now - Duration::hours(1),
            now + Duration::days(60),
            Eku::ServerAuth,
        );
        selector.publish(second.clone());
        let seen = handshake(config(), ca.certificate_der(), "handshake.test");
        assert_eq!(seen[0], *second.leaf());
    }
}
