use crate::config::{insecure_tls_requested, AuthScheme, GovernanceConfig};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Proxy;
use serde::Serialize;
use std::env;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";
pub const LICENSE_KEY_HEADER: &str = "x-license-key";

/// What went wrong before a response was received.
///
/// Set at the point the error is created so callers never need to sniff
/// error messages to decide on fail-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// TCP/TLS connection could not be established.
    Connect,
    /// The configured request timeout elapsed.
    Timeout,
    /// Generic failure while sending the request.
    Request,
    /// The response body could not be read.
    Body,
    /// The HTTP client or request could not be built.
    Build,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<reqwest::Error>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Connection failures, timeouts and generic send failures mean the
    /// governance service is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Timeout | TransportErrorKind::Request
        )
    }

    fn send(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_builder() {
            TransportErrorKind::Build
        } else {
            TransportErrorKind::Request
        };
        Self {
            kind,
            message: e.to_string(),
            source: Some(e),
        }
    }

    fn body(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else {
            TransportErrorKind::Body
        };
        Self {
            kind,
            message: e.to_string(),
            source: Some(e),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::send(e)
    }
}

/// Thin reqwest wrapper that knows the governance endpoint and its auth convention.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &GovernanceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(
                env::var("GOVERNANCE_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if insecure_tls_requested() {
            warn!(
                endpoint = %config.endpoint,
                "TLS certificate verification disabled; use only for local development"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Ok(proxy_url) = env::var("GOVERNANCE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::Transport(TransportError::new(TransportErrorKind::Build, e.to_string()))
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_headers: Self::auth_headers(config)?,
        })
    }

    /// Credentials are never attached when the endpoint is loopback.
    fn auth_headers(config: &GovernanceConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if config.is_loopback() {
            return Ok(headers);
        }

        match config.auth_scheme {
            AuthScheme::Basic => {
                if let (Some(id), Some(secret)) = (&config.client_id, &config.client_secret) {
                    let token = BASE64.encode(format!("{}:{}", id, secret));
                    headers.insert(AUTHORIZATION, header_value(&format!("Basic {}", token))?);
                }
            }
            AuthScheme::Headers => {
                if let Some(secret) = &config.client_secret {
                    headers.insert(CLIENT_SECRET_HEADER, header_value(secret)?);
                }
            }
        }
        if let Some(key) = &config.license_key {
            headers.insert(LICENSE_KEY_HEADER, header_value(key)?);
        }
        Ok(headers)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn has_credentials(&self) -> bool {
        !self.auth_headers.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// POST a JSON body and return the raw response body of a 2xx response.
    ///
    /// Non-2xx responses become [`Error::Status`] carrying the status and body.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Bytes> {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .client
            .post(self.url(path))
            .headers(self.auth_headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::send(e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::body(e)))?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }

    /// GET a path and return only the status code.
    pub async fn get_status(&self, path: &str) -> Result<u16> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.auth_headers.clone())
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::send(e)))?;
        Ok(response.status().as_u16())
    }
}

fn header_value(raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|_| {
        Error::configuration_with_context(
            "credential contains characters not allowed in an HTTP header",
            crate::ErrorContext::new().with_source("http_transport"),
        )
    })
}
