//! Secret value decoding
//!
//! A certificate secret is stored in one of three shapes:
//! - PEM text (certificate chain plus key)
//! - base64 of PEM text
//! - base64 of a PKCS#12 archive with an empty password

use base64::Engine;
use certpoll::{CertificateError, ServerCertificate};
use openssl::pkcs12::Pkcs12;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// Errors turning a secret value into a certificate
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Secret value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Secret value is not a PKCS#12 archive: {0}")]
    Pkcs12(#[from] openssl::error::ErrorStack),

    #[error("PKCS#12 archive contains no certificate")]
    MissingCertificate,

    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

/// Decode a secret value into a certificate with its private key
///
/// The shape is detected from the value itself; the declared content type of a
/// secret is often missing or wrong.
pub fn decode_certificate(value: &str) -> Result<ServerCertificate, DecodeError> {
    let value = value.trim();
    if value.as_bytes().starts_with(PEM_MARKER) {
        return Ok(ServerCertificate::from_pem(value.as_bytes())?);
    }

    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;

    if bytes.starts_with(PEM_MARKER) {
        return Ok(ServerCertificate::from_pem(&bytes)?);
    }

    decode_pkcs12(&bytes)
}

fn decode_pkcs12(der: &[u8]) -> Result<ServerCertificate, DecodeError> {
    let parsed = Pkcs12::from_der(der)?.parse2("")?;

    let leaf = parsed.cert.ok_or(DecodeError::MissingCertificate)?;
    let mut chain = vec![CertificateDer::from(leaf.to_der()?)];
    if let Some(ca) = parsed.ca {
        for cert in &ca {
            chain.push(CertificateDer::from(cert.to_der()?));
        }
    }

    let private_key = match parsed.pkey {
        Some(pkey) => Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            pkey.private_key_to_pkcs8()?,
        ))),
        None => None,
    };

    Ok(ServerCertificate::from_der(chain, private_key)?)
}
