//! Market data collaborators and the Yahoo Finance HTTP implementation.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::errors::FetchError;
use crate::market::{Bar, Interval, Period, Series, TickerSymbol};

/// Source of price history for one ticker.
///
/// Implementations are treated as unreliable: an unknown symbol may come back
/// as an empty series rather than an error.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(
        &self,
        ticker: &TickerSymbol,
        interval: Interval,
        period: Period,
    ) -> Result<Series, FetchError>;
}

/// Market capitalisation lookup used to floor the ticker universe.
#[async_trait]
pub trait MarketCapLookup: Send + Sync {
    /// Caps for whichever of `tickers` the provider knows about.
    async fn market_caps(
        &self,
        tickers: &[TickerSymbol],
    ) -> Result<HashMap<TickerSymbol, f64>, FetchError>;
}

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<QuoteEntry>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    symbol: String,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
}

/// Yahoo Finance chart (`/v8/finance/chart`) and quote (`/v7/finance/quote`) client.
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    base_url: String,
    client: Client,
}

impl YahooChartSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .pool_max_idle_per_host(50)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl MarketDataSource for YahooChartSource {
    async fn fetch(
        &self,
        ticker: &TickerSymbol,
        interval: Interval,
        period: Period,
    ) -> Result<Series, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let response = self
            .client
            .get(&url)
            .query(&[("interval", interval.as_str()), ("range", period.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        // Unknown symbols come back as 404 with a chart error body.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let series = parse_chart(ticker, &body)?;
        debug!(ticker = %ticker, interval = %interval, bars = series.len(), "Fetched chart");
        Ok(series)
    }
}

#[async_trait]
impl MarketCapLookup for YahooChartSource {
    async fn market_caps(
        &self,
        tickers: &[TickerSymbol],
    ) -> Result<HashMap<TickerSymbol, f64>, FetchError> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }
        let symbols = tickers
            .iter()
            .map(TickerSymbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/v7/finance/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", symbols.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_quotes(&body)
    }
}

/// Decodes a chart payload. Rows without a close are skipped.
fn parse_chart(ticker: &TickerSymbol, body: &str) -> Result<Series, FetchError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(FetchError::UnknownSymbol(ticker.to_string()));
        }
        return Err(FetchError::Api(format!(
            "{} - {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Series::empty());
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let bars = data
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let close = quote.close.get(i).copied().flatten()?;
            let timestamp = Utc.timestamp_opt(ts, 0).single()?;
            Some(Bar {
                timestamp,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close,
            })
        })
        .collect();

    Ok(Series::new(bars))
}

fn parse_quotes(body: &str) -> Result<HashMap<TickerSymbol, f64>, FetchError> {
    let response: QuoteResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    if let Some(error) = response.quote_response.error {
        return Err(FetchError::Api(error.code));
    }

    Ok(response
        .quote_response
        .result
        .into_iter()
        .filter_map(|entry| {
            let symbol = TickerSymbol::parse(&entry.symbol).ok()?;
            Some((symbol, entry.market_cap?))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> TickerSymbol {
        TickerSymbol::parse("AAPL").unwrap()
    }

    #[test]
    fn parses_chart_and_skips_null_closes() {
        let body = r#"{"chart":{"result":[{"timestamp":[300,100,200],
            "indicators":{"quote":[{"open":[3.0,1.0,null],"high":[3.5,1.5,2.5],
            "low":[2.5,0.5,1.5],"close":[3.1,1.1,null]}]}}],"error":null}}"#;
        let series = parse_chart(&aapl(), body).unwrap();
        assert_eq!(series.closes(), vec![1.1, 3.1]);
        assert_eq!(series.bars()[0].open, Some(1.0));
    }

    #[test]
    fn missing_result_is_empty_series() {
        let body = r#"{"chart":{"result":null,"error":null}}"#;
        assert!(parse_chart(&aapl(), body).unwrap().is_empty());
    }

    #[test]
    fn not_found_is_unknown_symbol() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse_chart(&aapl(), body),
            Err(FetchError::UnknownSymbol(s)) if s == "AAPL"
        ));
    }

    #[test]
    fn other_provider_errors_surface_as_api() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Unprocessable Entity","description":"bad range"}}}"#;
        assert!(matches!(parse_chart(&aapl(), body), Err(FetchError::Api(_))));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_chart(&aapl(), "<html>"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn parses_market_caps() {
        let body = r#"{"quoteResponse":{"result":[
            {"symbol":"AAPL","marketCap":3.0e12},
            {"symbol":"TINY"},
            {"symbol":"ibm","marketCap":1.5e11}],"error":null}}"#;
        let caps = parse_quotes(body).unwrap();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[&aapl()], 3.0e12);
        assert_eq!(caps[&TickerSymbol::parse("IBM").unwrap()], 1.5e11);
    }

    // Requires network access.
    #[tokio::test]
    #[ignore]
    async fn fetches_live_daily_chart() {
        let source =
            YahooChartSource::new(YAHOO_BASE_URL, Duration::from_secs(10), "Mozilla/5.0").unwrap();
        let series = source
            .fetch(&aapl(), Interval::OneDay, Period::OneYear)
            .await
            .unwrap();
        assert!(series.len() > 100);
    }
}
