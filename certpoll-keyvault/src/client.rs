//! Secret store client
//!
//! Reads the current version of a named secret over the vault REST API:
//! `GET {vault}/secrets/{name}?api-version={version}` with a bearer token.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::credential::TokenCredential;

pub const DEFAULT_API_VERSION: &str = "7.4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SECRET_NAME_LEN: usize = 127;

/// Secret names are 1-127 ASCII letters, digits and dashes
pub fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SECRET_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Errors talking to the secret store
#[derive(Debug, Error)]
pub enum SecretClientError {
    #[error("Failed to obtain access token: {0}")]
    Credential(String),

    #[error("Invalid secret name '{0}'")]
    InvalidName(String),

    #[error("Secret store request failed: {0}")]
    Request(String),

    #[error("Secret store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed secret store response: {0}")]
    Response(String),
}

/// The current version of a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVaultSecret {
    pub name: String,
    pub value: String,
    pub content_type: Option<String>,
    /// Last segment of the secret id, if the store reported one
    pub version: Option<String>,
}

/// Read access to named secrets
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Base URL of the vault, for diagnostics
    fn vault_url(&self) -> &str;

    /// Fetch the current version of `name`; `Ok(None)` when the secret does not exist
    async fn get_secret(&self, name: &str) -> Result<Option<KeyVaultSecret>, SecretClientError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    value: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

/// [`SecretClient`] over HTTPS
pub struct HttpSecretClient {
    vault_url: String,
    api_version: String,
    credential: Arc<dyn TokenCredential>,
    client: reqwest::Client,
}

impl HttpSecretClient {
    pub fn new(
        vault_url: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, SecretClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("certpoll/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SecretClientError::Request(e.to_string()))?;

        Ok(Self {
            vault_url: vault_url.into().trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credential,
            client,
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={}",
            self.vault_url, name, self.api_version
        )
    }
}

impl std::fmt::Debug for HttpSecretClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSecretClient")
            .field("vault_url", &self.vault_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[async_trait]
impl SecretClient for HttpSecretClient {
    fn vault_url(&self) -> &str {
        &self.vault_url
    }

    async fn get_secret(&self, name: &str) -> Result<Option<KeyVaultSecret>, SecretClientError> {
        if !is_valid_secret_name(name) {
            return Err(SecretClientError::InvalidName(name.to_string()));
        }

        let token = self.credential.token().await?;
        let url = self.secret_url(name);

        tracing::debug!(vault = %self.vault_url, secret = %name, "Fetching secret");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecretClientError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SecretClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| SecretClientError::Response(e.to_string()))?;

        let version = bundle
            .id
            .as_deref()
            .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
            .map(str::to_string);

        Ok(Some(KeyVaultSecret {
            name: name.to_string(),
            value: bundle.value,
            content_type: bundle.content_type,
            version,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve a single canned HTTP response and hand back the request head
    async fn serve_once(status: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
        });

        (format!("http://{}", addr), rx)
    }

    fn client(url: &str) -> HttpSecretClient {
        HttpSecretClient::new(url, Arc::new(StaticTokenCredential::new("test-token"))).unwrap()
    }

    #[tokio::test]
    async fn test_get_secret() {
        let body = serde_json::json!({
            "value": "c2VjcmV0",
            "contentType": "application/x-pkcs12",
            "id": "https://vault.example/secrets/tls/0123abcd",
        })
        .to_string();
        let (url, request) = serve_once("200 OK", body).await;

        let secret = client(&url).get_secret("tls").await.unwrap().unwrap();
        assert_eq!(secret.value, "c2VjcmV0");
        assert_eq!(secret.content_type.as_deref(), Some("application/x-pkcs12"));
        assert_eq!(secret.version.as_deref(), Some("0123abcd"));

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /secrets/tls?api-version=7.4 HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer test-token"));
    }

    #[tokio::test]
    async fn test_missing_secret_is_none() {
        let (url, _request) = serve_once("404 Not Found", "{}".to_string()).await;
        assert!(client(&url).get_secret("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_status() {
        let (url, _request) = serve_once("403 Forbidden", r#"{"error":"denied"}"#.to_string()).await;
        let err = client(&url).get_secret("tls").await.unwrap_err();
        assert!(matches!(err, SecretClientError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (url, _request) = serve_once("200 OK", "not json".to_string()).await;
        let err = client(&url).get_secret("tls").await.unwrap_err();
        assert!(matches!(err, SecretClientError::Response(_)));
    }

    #[tokio::test]
    async fn test_unreachable_vault() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&url).get_secret("tls").await.unwrap_err();
        assert!(matches!(err, SecretClientError::Request(_)));
    }

    #[tokio::test]
    async fn test_path_characters_in_name_are_rejected_before_any_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        for name in ["tls/../keys/root", "tls?api-version=1", "tls#frag", "", "tls cert"] {
            let err = client(&url).get_secret(name).await.unwrap_err();
            assert!(matches!(err, SecretClientError::InvalidName(_)), "{name:?}: {err:?}");
        }
    }

    #[test]
    fn test_secret_name_rules() {
        assert!(is_valid_secret_name("tls-cert-2024"));
        assert!(is_valid_secret_name(&"a".repeat(127)));
        assert!(!is_valid_secret_name(&"a".repeat(128)));
        assert!(!is_valid_secret_name("tls_cert"));
        assert!(!is_valid_secret_name("tls%2Fcert"));
    }

    #[test]
    fn test_secret_url() {
        let client = client("https://vault.example/").with_api_version("2025-07-01");
        assert_eq!(client.vault_url(), "https://vault.example");
        assert_eq!(
            client.secret_url("tls-cert"),
            "https://vault.example/secrets/tls-cert?api-version=2025-07-01"
        );
    }
}
