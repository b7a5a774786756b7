//! Outbound transport for barrier requests.
//!
//! The [`Transport`] trait is the seam between the forwarder and the network.
//! [`HttpTransport`] is the production implementation over `reqwest`; tests
//! substitute in-memory transports.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use super::ForwardError;

/// A fully prepared POST to the barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierRequest {
    /// Destination URL, as configured
    pub url: String,

    /// Value of the `Content-Type` header
    pub content_type: &'static str,

    /// Encoded event
    pub body: Vec<u8>,
}

/// Delivers one request and reports the HTTP status code.
///
/// Implementations classify their own failures: problems building the
/// request map to [`ForwardError::Request`], problems on the wire map to
/// [`ForwardError::Transport`]. The response body is never inspected.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: BarrierRequest) -> Result<u16, ForwardError>;
}

/// Plain HTTP transport backed by a shared `reqwest` client.
///
/// No retry and no client-level timeout; the forwarder bounds each push.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Barrier traffic goes direct; system proxy settings are ignored.
    pub fn new() -> Self {
        let client = Client::builder().no_proxy().build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build barrier client, using defaults");
            Client::new()
        });

        Self { client }
    }

    /// Use an existing client (e.g. one built with custom TLS roots)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Parse and check a barrier URL before anything touches the network.
fn parse_url(raw: &str) -> Result<Url, ForwardError> {
    let url = Url::parse(raw)
        .map_err(|e| ForwardError::Request(format!("invalid barrier url '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ForwardError::Request(format!(
            "unsupported protocol scheme '{}' in barrier url '{}'",
            scheme, raw
        ))),
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: BarrierRequest) -> Result<u16, ForwardError> {
        let url = parse_url(&request.url)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, request.content_type)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    ForwardError::Request(e.to_string())
                } else {
                    ForwardError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        debug!(status = status, url = %request.url, "Barrier responded");

        // Dropping the response without reading the body releases the connection.
        drop(response);

        Ok(status)
    }
}
