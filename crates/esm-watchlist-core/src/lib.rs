//! Core library for exporting ESM watchlists.
//!
//! - `config`: credentials discovery and validation
//! - `api`: HTTP transport and the ESM session client
//! - `models`: watchlist records returned by the API
//! - `export`: the list/export/write workflow and the filesystem sink

pub mod api;
pub mod config;
pub mod export;
pub mod models;

pub use api::{ApiError, ApiVersion, EsmClient, HttpTransport};
pub use config::{ConfigError, ConfigLoader, Credentials};
