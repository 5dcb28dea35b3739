use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API version must be \"1\" or \"2\", got {0:?}")]
    InvalidApiVersion(String),

    #[error("Not authenticated - call login first")]
    NotAuthenticated,

    #[error("Unauthorized - check ESM username and password")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Login response did not carry an Xsrf-Token header")]
    MissingCsrfToken,

    #[error("Internal API method {0} is not supported")]
    InternalApiUnsupported(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Empty or non-JSON response from {0}")]
    EmptyResponse(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Watchlist export stalled at byte {position} of {file_size}")]
    ExportStalled { position: u64, file_size: u64 },

    #[error("Watchlist export read {position} bytes, past reported size {file_size}")]
    ExportOverrun { position: u64, file_size: u64 },

    #[error("Watchlist chunk of {bytes_read} bytes at byte {position} overflows the byte count")]
    ExportSizeOverflow { position: u64, bytes_read: u64 },

    #[error("Watchlist export exceeded {0} chunks")]
    ExportTooManyChunks(usize),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
