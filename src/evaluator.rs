//! Per-ticker evaluation: fetch, compute RSI, classify against the threshold.

use tracing::debug;

use crate::errors::FetchError;
use crate::indicators::{RsiSmoothing, latest_rsi};
use crate::market::{Interval, Period, TickerSymbol};
use crate::market_data::MarketDataSource;
use crate::report::{ScanResult, round2};

/// Everything the evaluator needs besides the ticker itself.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationParams {
    pub interval: Interval,
    pub period: Period,
    pub threshold: f64,
    pub window: usize,
    pub smoothing: RsiSmoothing,
}

/// What happened to one ticker.
#[derive(Debug)]
pub enum Evaluation {
    Oversold(ScanResult),
    /// Latest RSI at or above the threshold.
    NotOversold { rsi: f64 },
    /// Fewer than `window + 1` bars.
    InsufficientData { bars: usize },
    EmptySeries,
    FetchFailed(FetchError),
}

impl Evaluation {
    pub fn produced_rsi(&self) -> bool {
        matches!(self, Evaluation::Oversold(_) | Evaluation::NotOversold { .. })
    }

    pub fn into_result(self) -> Option<ScanResult> {
        match self {
            Evaluation::Oversold(result) => Some(result),
            _ => None,
        }
    }
}

/// Classifies one ticker. Never fails: fetch errors become `FetchFailed`.
pub async fn assess<S>(source: &S, ticker: &TickerSymbol, params: &EvaluationParams) -> Evaluation
where
    S: MarketDataSource + ?Sized,
{
    let series = match source.fetch(ticker, params.interval, params.period).await {
        Ok(series) if series.is_empty() => return Evaluation::EmptySeries,
        Ok(series) => series,
        Err(error) => {
            debug!(ticker = %ticker, interval = %params.interval, error = %error, "Fetch failed");
            return Evaluation::FetchFailed(error);
        }
    };

    let closes = series.closes();
    let Some(rsi) = latest_rsi(&closes, params.window, params.smoothing) else {
        return Evaluation::InsufficientData { bars: closes.len() };
    };

    if rsi < params.threshold {
        Evaluation::Oversold(ScanResult {
            ticker: ticker.clone(),
            price: series.last_close().map(round2),
            rsi: round2(rsi),
        })
    } else {
        Evaluation::NotOversold { rsi }
    }
}

/// `Some` only for tickers whose latest RSI is strictly below the threshold.
pub async fn evaluate<S>(source: &S, ticker: &TickerSymbol, params: &EvaluationParams) -> Option<ScanResult>
where
    S: MarketDataSource + ?Sized,
{
    assess(source, ticker, params).await.into_result()
}
