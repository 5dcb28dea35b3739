//! Data models for ESM watchlist entities.
//!
//! - `WatchlistSummary`: id/name pair from `sysGetWatchlists`
//! - `WatchlistDetails`: per-watchlist details carrying the value file token
//! - `WatchlistValues`: one chunk of a watchlist's value file

pub mod watchlist;

pub use watchlist::{ValueFile, WatchlistDetails, WatchlistId, WatchlistSummary, WatchlistValues};
