use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rsi_screener::analysis::{self, ScanOverrides};
use rsi_screener::comfy_table;
use rsi_screener::market::Interval;
use rsi_screener::scanner::CancelFlag;
use rsi_screener::storage_utils::AsyncStorageManager;

#[derive(Parser)]
#[command(name = "rsi-screener")]
#[command(about = "Scan tickers for RSI(14) below a threshold", long_about = None)]
struct Cli {
    /// Bar interval (1m, 5m, 15m, 30m, 60m, 1d). Repeat for dual-interval mode.
    #[arg(short, long = "interval")]
    intervals: Vec<Interval>,

    /// Tickers per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Report tickers whose RSI is strictly below this value
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Concurrent fetches inside a batch
    #[arg(short, long)]
    workers: Option<usize>,

    /// Comma-separated tickers, replacing the configured universe and listing
    #[arg(short, long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Directory holding config.json (defaults to ./storage next to the binary)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Print reports as JSON instead of tables
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Step 1: Storage and config (config.json is written on first run)
    let storage = match &cli.storage {
        Some(dir) => AsyncStorageManager::new(dir).await?,
        None => AsyncStorageManager::new_relative("storage").await?,
    };

    let mut config = analysis::load_config(&storage).await?;
    ScanOverrides {
        intervals: cli.intervals.clone(),
        batch_size: cli.batch_size,
        threshold: cli.threshold,
        workers: cli.workers,
        symbols: cli.symbols.clone(),
    }
    .apply(&mut config);

    // Step 2: Ctrl-C stops the scan at the next ticker or pause
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling scan");
                cancel.cancel();
            }
        });
    }

    // Step 3: Universe and scans (the NYSE listing is downloaded if missing)
    let reports = analysis::run_scan_pipeline(&storage, &config, cancel, |progress| {
        eprintln!(
            "[{}] {}/{} batches ({:.0}%)",
            progress.interval,
            progress.completed,
            progress.total,
            progress.fraction() * 100.0
        );
    })
    .await?;

    // Step 4: Output
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", comfy_table::render_reports(&reports));
    }

    info!(reports = reports.len(), "Done");
    Ok(())
}
