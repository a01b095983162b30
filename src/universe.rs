//! Building the ticker universe handed to the scanner.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::market::TickerSymbol;
use crate::market_data::MarketCapLookup;

pub const DEFAULT_MARKET_CAP_FLOOR: f64 = 500_000_000.0;

/// Symbols per market-cap request.
pub const MARKET_CAP_CHUNK: usize = 50;

/// Parses raw symbols, dropping (and logging) the ones that are not valid tickers.
pub fn normalize<I, T>(raw: I) -> Vec<TickerSymbol>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|entry| match TickerSymbol::parse(entry.as_ref()) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                warn!(error = %e, "Dropping universe entry");
                None
            }
        })
        .collect()
}

/// Keeps the first occurrence of every symbol, in input order.
pub fn dedupe(symbols: &[TickerSymbol]) -> Vec<TickerSymbol> {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols
        .iter()
        .filter(|symbol| seen.insert(*symbol))
        .cloned()
        .collect()
}

/// Keeps symbols whose market cap is at least `floor`.
///
/// A symbol without a reported cap counts as zero. A failing lookup drops its
/// whole chunk.
pub async fn filter_by_market_cap<L>(lookup: &L, symbols: &[TickerSymbol], floor: f64) -> Vec<TickerSymbol>
where
    L: MarketCapLookup + ?Sized,
{
    let mut kept = Vec::with_capacity(symbols.len());

    for chunk in symbols.chunks(MARKET_CAP_CHUNK) {
        match lookup.market_caps(chunk).await {
            Ok(caps) => kept.extend(
                chunk
                    .iter()
                    .filter(|symbol| caps.get(*symbol).copied().unwrap_or(0.0) >= floor)
                    .cloned(),
            ),
            Err(e) => warn!(error = %e, symbols = chunk.len(), "Market cap lookup failed"),
        }
    }

    info!(candidates = symbols.len(), kept = kept.len(), floor, "Applied market cap floor");
    kept
}
