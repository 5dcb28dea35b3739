//! Session client for the ESM REST API.
//!
//! This module provides the `EsmClient` struct, which logs in, builds
//! per-method URLs, unwraps response envelopes and pages through watchlist
//! value files.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::models::{WatchlistDetails, WatchlistId, WatchlistSummary, WatchlistValues};

use super::transport::{RawResponse, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Response header carrying the anti-CSRF token after login
const CSRF_RESPONSE_HEADER: &str = "Xsrf-Token";

/// Request header the token is echoed back in
const CSRF_REQUEST_HEADER: &str = "X-Xsrf-Token";

const LOGIN_LOCALE: &str = "en_US";
const LOGIN_OS: &str = "Win32";

const METHOD_LOGOUT: &str = "logout";
const METHOD_WATCHLIST_FIELDS: &str = "sysGetWatchlistFields";
const METHOD_WATCHLISTS: &str =
    "sysGetWatchlists?hidden=false&dynamic=false&writeOnly=false&indexedOnly=false";
const METHOD_WATCHLIST_DETAILS: &str = "sysGetWatchlistDetails";
const METHOD_WATCHLIST_VALUES: &str = "sysGetWatchlistValues";

/// Upper bound on value-file chunks fetched for a single watchlist.
pub const MAX_EXPORT_CHUNKS: usize = 100_000;

/// ESM public API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    V1,
    #[default]
    V2,
}

impl FromStr for ApiVersion {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(ApiVersion::V1),
            "2" => Ok(ApiVersion::V2),
            other => Err(ApiError::InvalidApiVersion(other.to_string())),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V1 => f.write_str("1"),
            ApiVersion::V2 => f.write_str("2"),
        }
    }
}

/// URLs derived once from the appliance host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub login_url: String,
    pub internal_url: String,
}

impl Endpoints {
    pub fn new(host: &str, version: ApiVersion) -> Self {
        let base_url = match version {
            ApiVersion::V2 => format!("https://{}/rs/esm/v2/", host),
            ApiVersion::V1 => format!("https://{}/rs/esm/", host),
        };
        Self {
            base_url,
            login_url: format!("https://{}/rs/esm/login", host),
            internal_url: format!("https://{}/ess", host),
        }
    }

    /// URL for a public API method. Fully-uppercase names belong to the
    /// internal API, whose request format is not supported here.
    pub fn method_url(&self, method: &str) -> Result<String, ApiError> {
        if is_internal_method(method) {
            return Err(ApiError::InternalApiUnsupported(method.to_string()));
        }
        Ok(format!("{}{}", self.base_url, method))
    }
}

fn is_internal_method(method: &str) -> bool {
    let name = method.split('?').next().unwrap_or(method);
    name.chars().any(|c| c.is_alphabetic()) && !name.chars().any(|c| c.is_lowercase())
}

/// Unwrap the JSON envelope of an API response.
///
/// Sequences come back unchanged and a `value` key is unwrapped. A mapping
/// with a `return` key but no `value` key is returned whole, as is any
/// other mapping. Bodies that are not JSON yield `None`.
pub fn unwrap_envelope(body: &str) -> Option<Value> {
    let decoded: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Response body is not JSON");
            return None;
        }
    };

    match decoded {
        Value::Object(mut map) => match map.remove("value") {
            Some(value) => Some(value),
            None => {
                if map.contains_key("return") {
                    debug!("Response carries a return marker");
                }
                Some(Value::Object(map))
            }
        },
        other => Some(other),
    }
}

/// Login request body with base64-encoded credentials.
pub fn login_payload(username: &str, password: &str) -> Value {
    json!({
        "username": BASE64.encode(username.as_bytes()),
        "password": BASE64.encode(password.as_bytes()),
        "locale": LOGIN_LOCALE,
        "os": LOGIN_OS,
    })
}

/// Session client for one ESM appliance.
pub struct EsmClient<T: Transport> {
    transport: T,
    credentials: Credentials,
    endpoints: Endpoints,
    csrf_token: Option<String>,
    max_export_chunks: usize,
}

impl<T: Transport> EsmClient<T> {
    /// Create a client. No network I/O happens until `login`.
    pub fn new(credentials: Credentials, version: ApiVersion, transport: T) -> Self {
        let endpoints = Endpoints::new(credentials.host(), version);
        debug!(base_url = %endpoints.base_url, "ESM client created");
        Self {
            transport,
            credentials,
            endpoints,
            csrf_token: None,
            max_export_chunks: MAX_EXPORT_CHUNKS,
        }
    }

    /// Override the per-watchlist chunk limit (default `MAX_EXPORT_CHUNKS`).
    pub fn with_max_export_chunks(mut self, max_export_chunks: usize) -> Self {
        self.max_export_chunks = max_export_chunks;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn is_authenticated(&self) -> bool {
        self.csrf_token.is_some()
    }

    /// Authenticate and install the CSRF token on the transport.
    pub async fn login(&mut self) -> Result<(), ApiError> {
        let payload = login_payload(self.credentials.username(), self.credentials.password());

        info!(host = %self.credentials.host(), "Logging in to ESM");
        let response = self
            .transport
            .post(&self.endpoints.login_url, Some(&payload))
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "Login rejected");
            return Err(ApiError::from_status(response.status, &response.body));
        }

        self.install_csrf_token(&response)
    }

    fn install_csrf_token(&mut self, response: &RawResponse) -> Result<(), ApiError> {
        let token = response
            .header(CSRF_RESPONSE_HEADER)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingCsrfToken)?
            .to_string();

        self.transport
            .set_headers(&[(CSRF_REQUEST_HEADER, token.as_str())])?;
        self.csrf_token = Some(token);
        info!("Logged in");
        Ok(())
    }

    /// End the session and discard the token.
    pub async fn logout(&mut self) -> Result<(), ApiError> {
        self.require_auth()?;
        let url = self.endpoints.method_url(METHOD_LOGOUT)?;
        let response = self.transport.delete(&url, None).await;

        self.transport.remove_header(CSRF_REQUEST_HEADER);
        self.csrf_token = None;

        let response = response?;
        if !response.is_success() {
            warn!(status = response.status, "Logout returned an error status");
        }
        info!("Logged out");
        Ok(())
    }

    fn require_auth(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::NotAuthenticated)
        }
    }

    /// POST an API method and return the unwrapped body, or `None` when the
    /// body is not JSON.
    pub async fn post(&self, method: &str, body: Option<&Value>) -> Result<Option<Value>, ApiError> {
        self.require_auth()?;
        let url = self.endpoints.method_url(method)?;
        let response = self.transport.post(&url, body).await?;
        if !response.is_success() {
            warn!(method, status = response.status, "API call returned an error status");
        }
        Ok(unwrap_envelope(&response.body))
    }

    async fn post_as<R: DeserializeOwned>(
        &self,
        method: &str,
        body: Option<&Value>,
    ) -> Result<R, ApiError> {
        let value = self
            .post(method, body)
            .await?
            .ok_or_else(|| ApiError::EmptyResponse(method.to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", method, e)))
    }

    // ===== Watchlists =====

    pub async fn list_watchlist_fields(&self) -> Result<Option<Value>, ApiError> {
        self.post(METHOD_WATCHLIST_FIELDS, None).await
    }

    pub async fn list_watchlists(&self) -> Result<Vec<WatchlistSummary>, ApiError> {
        let lists: Vec<WatchlistSummary> = self.post_as(METHOD_WATCHLISTS, None).await?;
        debug!(count = lists.len(), "Watchlists listed");
        Ok(lists)
    }

    pub async fn get_watchlist_details(&self, id: &WatchlistId) -> Result<WatchlistDetails, ApiError> {
        let body = json!({ "id": id });
        self.post_as(METHOD_WATCHLIST_DETAILS, Some(&body)).await
    }

    async fn get_watchlist_values(
        &self,
        file_token: &str,
        position: u64,
    ) -> Result<WatchlistValues, ApiError> {
        let method = format!("{}?pos={}&count=0", METHOD_WATCHLIST_VALUES, position);
        let body = json!({ "file": { "id": file_token } });
        self.post_as(&method, Some(&body)).await
    }

    /// Fetch a watchlist's value file as an ordered list of chunks.
    ///
    /// Chunks are requested from the running byte position until it equals
    /// the file size reported by the latest chunk. The loop fails instead of
    /// spinning when a chunk makes no progress, when the position passes the
    /// reported size, when the byte count would overflow, or after the
    /// configured chunk limit.
    pub async fn export_watchlist(&self, id: &WatchlistId) -> Result<Vec<String>, ApiError> {
        let details = self.get_watchlist_details(id).await?;
        let file_token = details.value_file.file_token;

        let mut chunks = Vec::new();
        let mut bytes_read: u64 = 0;

        loop {
            if chunks.len() >= self.max_export_chunks {
                return Err(ApiError::ExportTooManyChunks(self.max_export_chunks));
            }

            let chunk = self.get_watchlist_values(&file_token, bytes_read).await?;
            debug!(
                watchlist = %id,
                position = bytes_read,
                bytes_read = chunk.bytes_read,
                file_size = chunk.file_size,
                "Watchlist chunk received"
            );

            let first = chunks.is_empty();
            bytes_read = bytes_read.checked_add(chunk.bytes_read).ok_or(
                ApiError::ExportSizeOverflow {
                    position: bytes_read,
                    bytes_read: chunk.bytes_read,
                },
            )?;
            chunks.push(chunk.data);

            if bytes_read == chunk.file_size {
                break;
            }
            if bytes_read > chunk.file_size {
                return Err(ApiError::ExportOverrun {
                    position: bytes_read,
                    file_size: chunk.file_size,
                });
            }
            if chunk.bytes_read == 0 && !first {
                return Err(ApiError::ExportStalled {
                    position: bytes_read,
                    file_size: chunk.file_size,
                });
            }
        }

        info!(watchlist = %id, chunks = chunks.len(), bytes = bytes_read, "Watchlist exported");
        Ok(chunks)
    }
}
