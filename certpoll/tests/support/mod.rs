use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair, SanType};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

/// A certificate store directory that tests can drop bundles into
pub struct TempStore {
    dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a self-signed server certificate issued `issued_days_ago` days ago
    pub fn add(&self, file_name: &str, common_name: &str, issued_days_ago: i64) -> PathBuf {
        let now = OffsetDateTime::now_utc();
        let pem = server_certificate_pem(
            common_name,
            now - Duration::days(issued_days_ago),
            now + Duration::days(90),
        );

        let path = self.dir.path().join(file_name);
        std::fs::write(&path, pem).unwrap();
        path
    }

    pub fn remove(&self, file_name: &str) {
        std::fs::remove_file(self.dir.path().join(file_name)).unwrap();
    }
}

pub fn server_certificate_pem(
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> String {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.subject_alt_names = vec![SanType::DnsName(common_name.try_into().unwrap())];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.not_before = not_before;
    params.not_after = not_after;

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    format!("{}{}", cert.pem(), key.serialize_pem())
}
