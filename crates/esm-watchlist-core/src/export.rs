//! Watchlist export workflow.
//!
//! Lists every watchlist on the appliance, pulls each value file and hands
//! the reassembled text to a `WatchlistSink`.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use crate::api::{EsmClient, Transport};
use crate::models::WatchlistSummary;

/// Suffix appended to every exported watchlist file name
const FILENAME_SUFFIX: &str = "_watchlist.txt";

/// Derive the output file name for a watchlist: lowercased, spaces replaced
/// with underscores, `_watchlist.txt` appended. Path separators and control
/// characters also become underscores so the name stays one path component.
pub fn watchlist_filename(name: &str) -> String {
    let stem: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}{}", stem, FILENAME_SUFFIX)
}

/// True when `filename` names an entry directly inside its parent directory.
fn is_single_component(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Destination for exported watchlist text.
pub trait WatchlistSink {
    /// Store `contents` for the watchlist called `name`, returning where it went.
    fn write(&self, name: &str, contents: &str) -> Result<PathBuf>;
}

/// Writes each watchlist to `<output_dir>/<derived filename>`.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl WatchlistSink for FileSink {
    fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;
        let filename = watchlist_filename(name);
        if !is_single_component(&filename) {
            bail!("Refusing to write watchlist {:?} outside {}", name, self.output_dir.display());
        }
        let path = self.output_dir.join(filename);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[derive(Debug, Clone)]
pub struct ExportedWatchlist {
    pub name: String,
    pub path: PathBuf,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct FailedWatchlist {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub exported: Vec<ExportedWatchlist>,
    pub failed: Vec<FailedWatchlist>,
}

impl ExportReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Export a single watchlist through `sink`.
pub async fn export_one<T: Transport, S: WatchlistSink>(
    client: &EsmClient<T>,
    sink: &S,
    watchlist: &WatchlistSummary,
) -> Result<ExportedWatchlist> {
    let chunks = client
        .export_watchlist(&watchlist.id)
        .await
        .with_context(|| format!("Failed to export watchlist {:?}", watchlist.name))?;
    let contents = chunks.concat();
    let path = sink.write(&watchlist.name, &contents)?;
    info!(watchlist = %watchlist.name, path = %path.display(), bytes = contents.len(), "Watchlist written");

    Ok(ExportedWatchlist {
        name: watchlist.name.clone(),
        path,
        bytes: contents.len(),
    })
}

/// Export every watchlist in server order. Without `keep_going` the first
/// failure aborts the run; with it, failures are collected in the report.
pub async fn export_all<T: Transport, S: WatchlistSink>(
    client: &EsmClient<T>,
    sink: &S,
    keep_going: bool,
) -> Result<ExportReport> {
    let watchlists = client
        .list_watchlists()
        .await
        .context("Failed to list watchlists")?;
    info!(count = watchlists.len(), "Exporting watchlists");

    let mut report = ExportReport::default();
    for watchlist in &watchlists {
        match export_one(client, sink, watchlist).await {
            Ok(exported) => report.exported.push(exported),
            Err(e) if keep_going => {
                error!(watchlist = %watchlist.name, error = %format!("{:#}", e), "Watchlist export failed");
                report.failed.push(FailedWatchlist {
                    name: watchlist.name.clone(),
                    error: format!("{:#}", e),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
