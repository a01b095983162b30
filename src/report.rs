use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::market::{Interval, TickerSymbol};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One ticker whose latest RSI fell below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub ticker: TickerSymbol,
    /// Latest close, rounded to cents.
    pub price: Option<f64>,
    /// Latest RSI, rounded to two decimals.
    pub rsi: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub interval: Interval,
    pub threshold: f64,
    pub results: Vec<ScanResult>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub completed_at: DateTime<Local>,
    /// Tickers evaluated in this scan.
    pub attempted: usize,
    /// Tickers that produced an RSI value, whether or not they qualified.
    pub succeeded: usize,
}

impl ScanReport {
    pub fn completed_at_display(&self) -> String {
        self.completed_at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Reports from the two independent runs of a dual-interval scan.
#[derive(Debug, Clone, Serialize)]
pub struct DualScanReport {
    pub first: ScanReport,
    pub second: ScanReport,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

/// Collects qualifying results in scan order and sorts once at the end.
#[derive(Debug)]
pub struct Aggregator {
    interval: Interval,
    threshold: f64,
    results: Vec<ScanResult>,
    attempted: usize,
    succeeded: usize,
}

impl Aggregator {
    pub fn new(interval: Interval, threshold: f64) -> Self {
        Self {
            interval,
            threshold,
            results: Vec::new(),
            attempted: 0,
            succeeded: 0,
        }
    }

    pub fn record_attempt(&mut self, produced_rsi: bool) {
        self.attempted += 1;
        if produced_rsi {
            self.succeeded += 1;
        }
    }

    pub fn push(&mut self, result: ScanResult) {
        self.results.push(result);
    }

    /// Stable ascending sort by RSI; equal values keep scan order.
    pub fn finish(mut self) -> ScanReport {
        self.results.sort_by(|a, b| a.rsi.total_cmp(&b.rsi));
        ScanReport {
            interval: self.interval,
            threshold: self.threshold,
            results: self.results,
            completed_at: Local::now(),
            attempted: self.attempted,
            succeeded: self.succeeded,
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
