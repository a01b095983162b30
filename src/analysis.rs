//! This module contains the end-to-end scan pipeline.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::CachedSource;
use crate::find_tickers;
use crate::market::{Interval, TickerSymbol};
use crate::market_data::{MarketCapLookup, MarketDataSource, YahooChartSource};
use crate::report::ScanReport;
use crate::scanner::{CancelFlag, Progress, Scanner};
use crate::storage_utils::{AppConfig, AsyncStorageManager};
use crate::universe;

/// Command-line values that take precedence over `config.json`.
#[derive(Debug, Clone, Default)]
pub struct ScanOverrides {
    pub intervals: Vec<Interval>,
    pub batch_size: Option<usize>,
    pub threshold: Option<f64>,
    pub workers: Option<usize>,
    pub symbols: Option<Vec<String>>,
}

impl ScanOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.intervals.is_empty() {
            config.scan.intervals = self.intervals.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.scan.batch_size = batch_size;
        }
        if let Some(threshold) = self.threshold {
            config.scan.threshold = threshold;
        }
        if let Some(workers) = self.workers {
            config.scan.workers = workers;
        }
        if let Some(symbols) = &self.symbols {
            config.universe.symbols = symbols.clone();
            config.universe.file = None;
            config.universe.listing = None;
        }
    }
}

pub async fn load_config(storage: &AsyncStorageManager) -> Result<AppConfig> {
    storage
        .load_or_init("config", AppConfig::default())
        .await
        .with_context(|| format!("Failed to load config from {}", storage.base_dir.display()))
}

/// Static symbols plus the optional symbols file, normalised and optionally
/// floored by market cap.
///
/// A listing-backed file is downloaded first if it is not in storage yet, and
/// then defaults to the large-cap floor.
pub async fn build_universe<L>(
    storage: &AsyncStorageManager,
    config: &AppConfig,
    lookup: &L,
) -> Result<Vec<TickerSymbol>>
where
    L: MarketCapLookup + ?Sized,
{
    let mut raw = config.universe.symbols.clone();
    if let Some(file) = &config.universe.file {
        if let Some(listing) = &config.universe.listing {
            find_tickers::ensure_listing(storage, file, listing, &config.source).await?;
        }
        let from_file: Vec<String> = storage
            .load(file)
            .await
            .with_context(|| format!("Failed to load universe file {}.json", file))?;
        raw.extend(from_file);
    }

    let symbols = universe::normalize(&raw);
    Ok(match config.universe.effective_min_market_cap() {
        Some(floor) => universe::filter_by_market_cap(lookup, &symbols, floor).await,
        None => symbols,
    })
}

/// Runs one scan per configured interval (two independent scans in dual mode).
pub async fn run_scan_pipeline(
    storage: &AsyncStorageManager,
    config: &AppConfig,
    cancel: CancelFlag,
    on_progress: impl Fn(Progress) + Send + Sync + 'static,
) -> Result<Vec<ScanReport>> {
    // Step 1: Validate every interval before touching the network
    let batch_configs = config.batch_configs()?;

    let yahoo = YahooChartSource::new(
        config.source.base_url.clone(),
        config.source.timeout(),
        &config.source.user_agent,
    )?;

    // Step 2: Listing download (if needed), normalisation and market-cap floor
    let universe = build_universe(storage, config, &yahoo).await?;
    info!(tickers = universe.len(), "Checking tickers");

    // Step 3: Wire the source, optionally behind the cache
    let cache = config
        .source
        .cache_ttl_secs
        .map(|ttl| Arc::new(CachedSource::new(yahoo.clone(), Duration::from_secs(ttl))));
    let source: Arc<dyn MarketDataSource> = match &cache {
        Some(cache) => Arc::clone(cache) as Arc<dyn MarketDataSource>,
        None => Arc::new(yahoo),
    };
    let purge_cache = || {
        if let Some(cache) = &cache {
            cache.purge_expired();
        }
    };

    let scanner = Scanner::new(source)
        .with_rate_limiter(Arc::new(config.scan.throttle.clone()))
        .with_cancel_flag(cancel)
        .on_progress(on_progress);

    // Step 4: Scan, as a dual pair or one interval at a time
    let reports = match batch_configs.as_slice() {
        [first, second] => {
            purge_cache();
            let dual = scanner.scan_dual(&universe, first, second).await?;
            vec![dual.first, dual.second]
        }
        configs => {
            let mut reports = Vec::with_capacity(configs.len());
            for batch_config in configs {
                purge_cache();
                reports.push(scanner.scan(&universe, batch_config).await?);
            }
            reports
        }
    };

    Ok(reports)
}
