//! HTTP transport for witness, ledger and content-store calls.
//!
//! All upstream access goes through the [`HttpTransport`] trait. The engine
//! resolves one implementation at startup and hands it to every
//! collaborator; tests substitute scripted fakes.
//!
//! Bodies are treated as JSON. An empty body decodes to `None`, which the
//! endpoint cascade counts as a failed candidate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::VerifyError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST with a JSON body.
    Post,
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body for POST.
    pub body: Option<Value>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Request {
    /// A GET request.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            timeout,
        }
    }

    /// A POST request with a JSON body.
    pub fn post(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            timeout,
        }
    }
}

/// Upstream answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body; `None` when the body was empty.
    pub body: Option<Value>,
}

impl Response {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Client interface for all upstream HTTP.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request.
    ///
    /// Returns `Err` only for transport-level failures; non-success statuses
    /// come back as a [`Response`] for the caller to classify.
    async fn send(&self, request: &Request) -> Result<Response, VerifyError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the shared client.
    pub fn new(connect_timeout: Duration) -> Result<Self, VerifyError> {
        let client = ClientBuilder::new()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .user_agent(format!("proof-verify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VerifyError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url, method = ?request.method))]
    async fn send(&self, request: &Request) -> Result<Response, VerifyError> {
        let started = Instant::now();
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => {
                let builder = self.client.post(&request.url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            },
        };

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %request.url, error = %e, "HTTP request failed");
                VerifyError::Transport {
                    endpoint: request.url.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| VerifyError::Transport {
            endpoint: request.url.clone(),
            message: format!("Failed to read body: {}", e),
        })?;

        debug!(
            url = %request.url,
            status,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HTTP response received"
        );

        let body = decode_body(&request.url, status, &bytes)?;
        Ok(Response { status, body })
    }
}

/// Decode a raw body. Empty or whitespace-only bodies become `None`.
///
/// Non-JSON bodies on a success status are a decode error; on a failure
/// status they are dropped, since the status already tells the story.
fn decode_body(url: &str, status: u16, bytes: &[u8]) -> Result<Option<Value>, VerifyError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Ok(Some(value)),
        Err(_) if !(200..300).contains(&status) => Ok(None),
        Err(e) => Err(VerifyError::Decode {
            endpoint: url.to_string(),
            message: e.to_string(),
        }),
    }
}
