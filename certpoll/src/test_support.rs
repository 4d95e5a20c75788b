//! Certificate fixtures for unit tests

use crate::certificate::ServerCertificate;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::CertificateDer;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy)]
pub enum Eku {
    /// No extended key usage extension at all
    None,
    ServerAuth,
    ClientAuth,
}

fn leaf_params(
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    eku: Eku,
) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.subject_alt_names = vec![SanType::DnsName(common_name.try_into().unwrap())];
    params.not_before = not_before;
    params.not_after = not_after;
    params.extended_key_usages = match eku {
        Eku::None => Vec::new(),
        Eku::ServerAuth => vec![ExtendedKeyUsagePurpose::ServerAuth],
        Eku::ClientAuth => vec![ExtendedKeyUsagePurpose::ClientAuth],
    };
    params
}

/// Self-signed certificate and key as one PEM bundle
pub fn generate_pem(
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    eku: Eku,
) -> String {
    let key = KeyPair::generate().unwrap();
    let cert = leaf_params(common_name, not_before, not_after, eku)
        .self_signed(&key)
        .unwrap();
    format!("{}{}", cert.pem(), key.serialize_pem())
}

pub fn generate(
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    eku: Eku,
) -> ServerCertificate {
    ServerCertificate::from_pem(generate_pem(common_name, not_before, not_after, eku).as_bytes())
        .unwrap()
}

/// Currently valid self-signed server certificate
pub fn fresh(common_name: &str) -> ServerCertificate {
    let now = OffsetDateTime::now_utc();
    generate(
        common_name,
        now - Duration::days(1),
        now + Duration::days(30),
        Eku::ServerAuth,
    )
}

/// How the middle link of a three-link chain is allowed to issue
#[derive(Debug, Clone, Copy)]
pub enum Intermediate {
    Ca,
    /// CA basic constraint, but key usage without keyCertSign
    CaWithoutCertSign,
    /// An ordinary leaf marked CA:FALSE
    NotCa,
}

/// Throwaway certificate authority for chain validation tests
pub struct TestCa {
    cert_der: CertificateDer<'static>,
    cert_pem: String,
    key_pem: String,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl TestCa {
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        let not_before = now - Duration::days(1);
        let not_after = now + Duration::days(365);

        let key = KeyPair::generate().unwrap();
        let cert = Self::params(not_before, not_after).self_signed(&key).unwrap();

        Self {
            cert_der: cert.der().clone(),
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            not_before,
            not_after,
        }
    }

    fn params(not_before: OffsetDateTime, not_after: OffsetDateTime) -> CertificateParams {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "certpoll test CA");
        dn.push(DnType::OrganizationName, "certpoll");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = not_before;
        params.not_after = not_after;
        params
    }

    pub fn certificate_der(&self) -> CertificateDer<'static> {
        self.cert_der.clone()
    }

    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn issue(
        &self,
        common_name: &str,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        eku: Eku,
    ) -> ServerCertificate {
        let pem = self.issue_pem(common_name, not_before, not_after, eku);
        ServerCertificate::from_pem(pem.as_bytes()).unwrap()
    }

    /// CA-signed leaf certificate and key as one PEM bundle
    pub fn issue_pem(
        &self,
        common_name: &str,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        eku: Eku,
    ) -> String {
        let ca_key = KeyPair::from_pem(&self.key_pem).unwrap();
        let issuer = Issuer::new(Self::params(self.not_before, self.not_after), ca_key);

        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(common_name, not_before, not_after, eku)
            .signed_by(&key, &issuer)
            .unwrap();

        format!("{}{}", cert.pem(), key.serialize_pem())
    }

    /// Chain `[leaf, intermediate]` below this CA, with the leaf key
    pub fn issue_through(&self, intermediate: Intermediate, common_name: &str) -> ServerCertificate {
        let now = OffsetDateTime::now_utc();
        let (not_before, not_after) = (now - Duration::days(1), now + Duration::days(30));

        let ca_key = KeyPair::from_pem(&self.key_pem).unwrap();
        let root = Issuer::new(Self::params(self.not_before, self.not_after), ca_key);

        let mut middle_params = leaf_params("intermediate.test", not_before, not_after, Eku::None);
        match intermediate {
            Intermediate::Ca => {
                middle_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
                middle_params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
            }
            Intermediate::CaWithoutCertSign => {
                middle_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
                middle_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
            }
            Intermediate::NotCa => {
                middle_params.is_ca = IsCa::ExplicitNoCa;
            }
        }

        let middle_key = KeyPair::generate().unwrap();
        let middle = middle_params.signed_by(&middle_key, &root).unwrap();
        let middle_issuer = Issuer::new(middle_params, middle_key);

        let key = KeyPair::generate().unwrap();
        let leaf = leaf_params(common_name, not_before, not_after, Eku::ServerAuth)
            .signed_by(&key, &middle_issuer)
            .unwrap();

        let pem = format!("{}{}{}", leaf.pem(), middle.pem(), key.serialize_pem());
        ServerCertificate::from_pem(pem.as_bytes()).unwrap()
    }
}
