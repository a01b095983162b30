//! Exchange listing download backing the default ticker universe.
//!
//! The NASDAQ Trader symbol directory lists every non-Nasdaq security with
//! its exchange code (`N` is the New York Stock Exchange). Rows come as a
//! pipe-delimited table with a header line and a trailing creation-time line.

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::market::TickerSymbol;
use crate::storage_utils::{AsyncStorageManager, ListingConfig, SourceConfig};

pub const NYSE_LISTING_URL: &str = "https://www.nasdaqtrader.com/dynamic/SymDir/otherlisted.txt";
pub const NYSE_EXCHANGE_CODE: &str = "N";

/// Symbols listed on `exchange`, in file order, test issues excluded.
///
/// Class suffixes are rewritten to the chart provider's form (`BRK.B` to
/// `BRK-B`). Rows that still do not form a valid ticker (preferreds such as
/// `ABR$D`) are skipped.
pub fn parse_listing(body: &str, exchange: &str) -> Result<Vec<String>> {
    let mut lines = body.lines();
    let header: Vec<&str> = lines
        .next()
        .context("Listing is empty")?
        .split('|')
        .map(str::trim)
        .collect();

    let column = |name: &str| header.iter().position(|h| *h == name);
    let (Some(symbol_col), Some(exchange_col)) = (column("ACT Symbol"), column("Exchange")) else {
        bail!("Listing header lacks ACT Symbol/Exchange columns");
    };
    let test_col = column("Test Issue");

    let mut symbols = Vec::new();
    let mut skipped = 0usize;

    for line in lines {
        if line.starts_with("File Creation Time") || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.get(exchange_col) != Some(&exchange) {
            continue;
        }
        if test_col.and_then(|c| fields.get(c)) == Some(&"Y") {
            continue;
        }
        let Some(raw) = fields.get(symbol_col) else { continue };

        let symbol = raw.replace('.', "-");
        if TickerSymbol::parse(&symbol).is_ok() {
            symbols.push(symbol);
        } else {
            skipped += 1;
        }
    }

    debug!(exchange, kept = symbols.len(), skipped, "Parsed exchange listing");
    Ok(symbols)
}

/// Downloads the listing and returns the symbols for the configured exchange.
pub async fn fetch_listing(listing: &ListingConfig, source: &SourceConfig) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .user_agent(source.user_agent.as_str())
        .timeout(source.timeout())
        .build()?;

    let body = client
        .get(&listing.url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    parse_listing(&body, &listing.exchange)
}

/// Makes sure `file` exists in storage, downloading the listing into it when missing.
pub async fn ensure_listing(
    storage: &AsyncStorageManager,
    file: &str,
    listing: &ListingConfig,
    source: &SourceConfig,
) -> Result<()> {
    if storage.exists(file) {
        return Ok(());
    }

    // 1. Download and filter to the configured exchange
    let symbols = fetch_listing(listing, source)
        .await
        .with_context(|| format!("Failed to download exchange listing from {}", listing.url))?;

    // 2. Persist as a plain symbol array for later runs
    storage.save(file, &symbols).await?;

    info!(
        file,
        exchange = %listing.exchange,
        symbols = symbols.len(),
        dir = %storage.base_dir.display(),
        "Saved exchange listing"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
ACT Symbol|Security Name|Exchange|CQS Symbol|ETF|Round Lot Size|Test Issue|NASDAQ Symbol
A|Agilent Technologies, Inc. Common Stock|N|A|N|100|N|A
ABR$D|Arbor Realty Trust 6.375% Series D Preferred|N|ABRpD|N|100|N|ABR-D
BRK.B|Berkshire Hathaway Inc. Class B|N|BRK.B|N|100|N|BRK=B
SPY|SPDR S&P 500 ETF Trust|P|SPY|Y|100|N|SPY
ZXZZT|NYSE Test Issue|N|ZXZZT|N|100|Y|ZXZZT
IBM|International Business Machines Corporation Common Stock|N|IBM|N|100|N|IBM
File Creation Time: 1015202618:00|||||||
";

    #[test]
    fn keeps_exchange_rows_in_order() {
        let symbols = parse_listing(LISTING, NYSE_EXCHANGE_CODE).unwrap();
        assert_eq!(symbols, vec!["A", "BRK-B", "IBM"]);
    }

    #[test]
    fn other_exchange_codes_select_other_rows() {
        assert_eq!(parse_listing(LISTING, "P").unwrap(), vec!["SPY"]);
    }

    #[test]
    fn missing_columns_is_an_error() {
        assert!(parse_listing("Symbol|Name\nA|Agilent\n", NYSE_EXCHANGE_CODE).is_err());
        assert!(parse_listing("", NYSE_EXCHANGE_CODE).is_err());
    }

    #[tokio::test]
    async fn existing_file_is_not_downloaded_again() {
        let dir = std::env::temp_dir().join(format!("rsi-screener-listing-{}", std::process::id()));
        let storage = AsyncStorageManager::new(&dir).await.unwrap();
        storage.save("nyse", &vec!["IBM"]).await.unwrap();

        // An unroutable URL would fail if a download were attempted.
        let listing = ListingConfig {
            url: "http://127.0.0.1:9/otherlisted.txt".to_string(),
            exchange: NYSE_EXCHANGE_CODE.to_string(),
        };
        ensure_listing(&storage, "nyse", &listing, &SourceConfig::default())
            .await
            .unwrap();
        let loaded: Vec<String> = storage.load("nyse").await.unwrap();
        assert_eq!(loaded, vec!["IBM"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    // Requires network access.
    #[tokio::test]
    #[ignore]
    async fn fetches_live_nyse_listing() {
        let symbols = fetch_listing(&ListingConfig::default(), &SourceConfig::default())
            .await
            .unwrap();
        assert!(symbols.len() > 1000);
        assert!(symbols.iter().any(|s| s == "IBM"));
    }
}
