//! REST API client module for the ESM appliance.
//!
//! This module provides the `EsmClient` for logging in to an ESM and
//! enumerating and exporting its watchlists, on top of a `Transport`
//! that carries JSON over HTTPS.
//!
//! The API authenticates with a session cookie plus an anti-CSRF token
//! returned by the login endpoint and echoed on every later request.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiVersion, Endpoints, EsmClient};
pub use error::ApiError;
pub use transport::{HttpTransport, RawResponse, Transport};

#[cfg(test)]
pub(crate) mod testing;
