use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::errors::ScanError;
use crate::find_tickers::{NYSE_EXCHANGE_CODE, NYSE_LISTING_URL};
use crate::indicators::{DEFAULT_RSI_WINDOW, RsiSmoothing};
use crate::market::{Interval, Period};
use crate::market_data::YAHOO_BASE_URL;
use crate::scanner::{BatchConfig, DEFAULT_BATCH_SIZE, DEFAULT_THRESHOLD};
use crate::throttle::ThrottlePolicy;
use crate::universe::DEFAULT_MARKET_CAP_FLOOR;

pub const DEFAULT_LISTING_FILE: &str = "nyse_tickers";

// CONFIGURATION STRUCTS
// Every field has a default so an older or partial config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanSettings {
    /// One interval for a single scan, two for dual-interval mode.
    pub intervals: Vec<Interval>,
    pub batch_size: usize,
    pub threshold: f64,
    pub rsi_window: usize,
    pub smoothing: RsiSmoothing,
    pub workers: usize,
    pub dedupe: bool,
    /// Overrides the lookback derived from each interval.
    pub period: Option<Period>,
    pub throttle: ThrottlePolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            intervals: vec![Interval::OneMinute, Interval::FiveMinutes],
            batch_size: DEFAULT_BATCH_SIZE,
            threshold: DEFAULT_THRESHOLD,
            rsi_window: DEFAULT_RSI_WINDOW,
            smoothing: RsiSmoothing::Simple,
            workers: 1,
            dedupe: true,
            period: None,
            throttle: ThrottlePolicy::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    /// Storage file (without `.json`) holding an array of symbols.
    pub file: Option<String>,
    /// Where to download `file` from when it is missing.
    pub listing: Option<ListingConfig>,
    /// e.g. 500_000_000.0 to keep only large caps.
    pub min_market_cap: Option<f64>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            file: Some(DEFAULT_LISTING_FILE.to_string()),
            listing: Some(ListingConfig::default()),
            min_market_cap: None,
        }
    }
}

impl UniverseConfig {
    /// True when the universe file is backed by an exchange listing download.
    pub fn uses_listing(&self) -> bool {
        self.file.is_some() && self.listing.is_some()
    }

    /// The configured floor, or the large-cap default for a listing-backed universe.
    pub fn effective_min_market_cap(&self) -> Option<f64> {
        self.min_market_cap
            .or_else(|| self.uses_listing().then_some(DEFAULT_MARKET_CAP_FLOOR))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ListingConfig {
    pub url: String,
    /// Exchange code as it appears in the listing's `Exchange` column.
    pub exchange: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            url: NYSE_LISTING_URL.to_string(),
            exchange: NYSE_EXCHANGE_CODE.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Enables the response cache when set.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            timeout_secs: 10,
            user_agent: "Mozilla/5.0".to_string(),
            cache_ttl_secs: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanSettings,
    pub universe: UniverseConfig,
    pub source: SourceConfig,
}

impl AppConfig {
    /// One validated `BatchConfig` per configured interval.
    pub fn batch_configs(&self) -> Result<Vec<BatchConfig>, ScanError> {
        if self.scan.intervals.is_empty() {
            return Err(ScanError::NoIntervals);
        }
        self.scan
            .intervals
            .iter()
            .map(|&interval| {
                let config = BatchConfig {
                    batch_size: self.scan.batch_size,
                    interval,
                    period: self.scan.period.unwrap_or_else(|| interval.default_period()),
                    threshold: self.scan.threshold,
                    window: self.scan.rsi_window,
                    smoothing: self.scan.smoothing,
                    workers: self.scan.workers,
                    dedupe: self.scan.dedupe,
                };
                config.validate()?;
                Ok(config)
            })
            .collect()
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// **Constructor**
    /// Storage directory next to the running executable, created if missing.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;
        // 2. Resolve the storage folder beside it
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Writes `<filename>.json` via a temp file and rename so readers never see
    /// a half-written file.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));
        // serde_json validates UTF-8 itself, so skip read_to_string.
        let content = fs::read(path).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.base_dir.join(format!("{}.json", filename)).exists()
    }

    /// Loads `filename`, or writes `default` there first if it does not exist yet.
    pub async fn load_or_init<T>(&self, filename: &str, default: T) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.exists(filename) {
            return self.load(filename).await;
        }
        self.save(filename, &default).await?;
        info!(file = filename, dir = %self.base_dir.display(), "Wrote default file");
        Ok(default)
    }
}
