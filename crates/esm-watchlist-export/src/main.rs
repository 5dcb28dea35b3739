//! ESM watchlist export - dump every watchlist on an ESM to text files.
//!
//! Logs in with credentials from the local credentials file (or `ESM_*`
//! environment variables), writes one `<name>_watchlist.txt` per watchlist
//! and logs out.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use esm_watchlist_core::config::DEFAULT_SECTION;
use esm_watchlist_core::export::{export_all, FileSink};
use esm_watchlist_core::{ApiVersion, ConfigLoader, EsmClient, HttpTransport};

#[derive(Debug, Parser)]
#[command(name = "esm-watchlist-export", version, about = "Export ESM watchlists to text files")]
struct Args {
    /// Credentials file (TOML). Searched for in the home and current directories when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile section in the credentials file
    #[arg(short, long, default_value = DEFAULT_SECTION)]
    section: String,

    /// ESM API version ("1" or "2")
    #[arg(long, default_value = "2")]
    api_version: String,

    /// Directory the watchlist files are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Validate the appliance's TLS certificate
    #[arg(long)]
    verify_certs: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Continue with the remaining watchlists when one fails
    #[arg(long)]
    keep_going: bool,

    /// Print watchlist ids and names instead of exporting
    #[arg(long)]
    list: bool,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing();

    tokio::select! {
        result = run(args) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Control-C pressed, stopping");
            ExitCode::from(130)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let credentials = ConfigLoader::new(args.section.as_str())
        .load(args.config.as_deref())
        .context("Failed to load ESM credentials")?;
    let version: ApiVersion = args.api_version.parse()?;

    let transport = HttpTransport::new(args.verify_certs, args.timeout.map(Duration::from_secs))
        .context("Failed to create HTTP client")?;
    let mut client = EsmClient::new(credentials, version, transport);

    client.login().await.context("Login failed")?;

    let result = if args.list {
        list(&client).await
    } else {
        export(&client, &args).await
    };

    if let Err(e) = client.logout().await {
        warn!(error = %e, "Logout failed");
    }

    result
}

async fn list(client: &EsmClient<HttpTransport>) -> Result<()> {
    let watchlists = client
        .list_watchlists()
        .await
        .context("Failed to list watchlists")?;
    for watchlist in watchlists {
        println!("{}\t{}", watchlist.id, watchlist.name);
    }
    Ok(())
}

async fn export(client: &EsmClient<HttpTransport>, args: &Args) -> Result<()> {
    let sink = FileSink::new(&args.output_dir);
    let report = export_all(client, &sink, args.keep_going).await?;

    info!(
        exported = report.exported.len(),
        failed = report.failed.len(),
        "Export finished"
    );
    for exported in &report.exported {
        eprintln!("Wrote {} ({} bytes)", exported.path.display(), exported.bytes);
    }

    if report.is_clean() {
        Ok(())
    } else {
        for failed in &report.failed {
            eprintln!("Failed {}: {}", failed.name, failed.error);
        }
        anyhow::bail!("{} watchlist(s) failed to export", report.failed.len())
    }
}
