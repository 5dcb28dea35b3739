use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Watchlist identifier as reported by the appliance.
///
/// Depending on firmware this is a bare integer or an `{"value": n}` object,
/// so it is kept as raw JSON and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchlistId(pub Value);

impl From<u64> for WatchlistId {
    fn from(id: u64) -> Self {
        Self(Value::from(id))
    }
}

impl fmt::Display for WatchlistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::Object(map) => match map.get("value") {
                Some(inner) => write!(f, "{}", inner),
                None => write!(f, "{}", self.0),
            },
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistSummary {
    pub id: WatchlistId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueFile {
    #[serde(rename = "fileToken")]
    pub file_token: String,
}

/// Watchlist details. Only the value file is interpreted; everything else
/// the appliance returns is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistDetails {
    #[serde(rename = "valueFile")]
    pub value_file: ValueFile,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One chunk of a watchlist value file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistValues {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: String,
    #[serde(rename = "bytesRead")]
    pub bytes_read: u64,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

/// Treat an explicit `null` the same as a missing string.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
