//! HTTP transport for the ESM API.
//!
//! The transport sends JSON bodies over POST/DELETE and carries a set of
//! persistent headers across calls. It never interprets status codes; that
//! is left to the session client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;

/// A response as received from the appliance, before any unwrapping.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// Look up a response header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError>;

    async fn delete(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError>;

    /// Merge headers into every future request.
    fn set_headers(&mut self, headers: &[(&str, &str)]) -> Result<(), ApiError>;

    fn remove_header(&mut self, name: &str);
}

/// reqwest-backed transport.
/// The cookie store keeps the session cookie set by the login response.
pub struct HttpTransport {
    client: Client,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Create a transport. Certificate validation is off unless `verify_certs`
    /// is set, since appliances usually present self-signed certificates.
    pub fn new(verify_certs: bool, timeout: Option<Duration>) -> Result<Self, ApiError> {
        if !verify_certs {
            warn!("TLS certificate validation is disabled");
        }

        let mut builder = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(!verify_certs);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            headers: HeaderMap::new(),
        })
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, ApiError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Response received");
        Ok(RawResponse { status, headers, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError> {
        debug!(url, "POST");
        let mut request = self.client.post(url).headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::read(request.send().await?).await
    }

    async fn delete(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError> {
        debug!(url, "DELETE");
        let mut request = self.client.delete(url).headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::read(request.send().await?).await
    }

    fn set_headers(&mut self, headers: &[(&str, &str)]) -> Result<(), ApiError> {
        for (name, value) in headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            self.headers.insert(header_name, header_value);
        }
        Ok(())
    }

    fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }
}
