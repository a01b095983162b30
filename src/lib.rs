//! Batch RSI screener: scans a ticker universe and reports the tickers whose
//! latest 14-period RSI sits below a threshold.

pub mod analysis;
pub mod cache;
pub mod comfy_table;
pub mod errors;
pub mod evaluator;
pub mod find_tickers;
pub mod indicators;
pub mod market;
pub mod market_data;
pub mod report;
pub mod scanner;
pub mod storage_utils;
pub mod throttle;
pub mod universe;

pub use errors::{FetchError, ScanError};
pub use market::{Bar, Interval, Period, Series, TickerSymbol};
pub use market_data::MarketDataSource;
pub use report::{DualScanReport, ScanReport, ScanResult};
pub use scanner::{BatchConfig, CancelFlag, Progress, Scanner};
