use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::FetchError;
use crate::market::{Interval, Period, Series, TickerSymbol};
use crate::market_data::MarketDataSource;

type CacheKey = (TickerSymbol, Interval, Period);

/// Opt-in response cache in front of another source.
///
/// Entries older than `ttl` are refetched. Failures and empty series are never stored.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, (Instant, Series)>>,
}

impl<S: MarketDataSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every entry past its time-to-live.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .lock()
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }

    /// Fresh entry for `key`. An expired one is removed on the way.
    fn lookup(&self, key: &CacheKey) -> Option<Series> {
        let mut entries = self.entries.lock();
        let (stored_at, series) = entries.get(key)?;
        if stored_at.elapsed() < self.ttl {
            return Some(series.clone());
        }
        entries.remove(key);
        None
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for CachedSource<S> {
    async fn fetch(
        &self,
        ticker: &TickerSymbol,
        interval: Interval,
        period: Period,
    ) -> Result<Series, FetchError> {
        let key = (ticker.clone(), interval, period);
        if let Some(series) = self.lookup(&key) {
            debug!(ticker = %ticker, interval = %interval, "Cache hit");
            return Ok(series);
        }

        let series = self.inner.fetch(ticker, interval, period).await?;
        if !series.is_empty() {
            self.entries
                .lock()
                .insert(key, (Instant::now(), series.clone()));
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Bar;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        empty: bool,
    }

    #[async_trait]
    impl MarketDataSource for CountingSource {
        async fn fetch(
            &self,
            _ticker: &TickerSymbol,
            _interval: Interval,
            _period: Period,
        ) -> Result<Series, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.empty {
                return Ok(Series::empty());
            }
            Ok(Series::new(vec![Bar {
                timestamp: Utc::now(),
                open: None,
                high: None,
                low: None,
                close: 1.0,
            }]))
        }
    }

    fn source(empty: bool) -> CountingSource {
        CountingSource {
            calls: AtomicUsize::new(0),
            empty,
        }
    }

    #[tokio::test]
    async fn repeated_fetch_hits_cache() {
        let cache = CachedSource::new(source(false), Duration::from_secs(60));
        let ticker = TickerSymbol::parse("AAPL").unwrap();

        cache.fetch(&ticker, Interval::OneMinute, Period::OneDay).await.unwrap();
        cache.fetch(&ticker, Interval::OneMinute, Period::OneDay).await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);

        // different key
        cache.fetch(&ticker, Interval::FiveMinutes, Period::FiveDays).await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let cache = CachedSource::new(source(false), Duration::ZERO);
        let ticker = TickerSymbol::parse("MSFT").unwrap();

        cache.fetch(&ticker, Interval::OneDay, Period::OneYear).await.unwrap();
        cache.fetch(&ticker, Interval::OneDay, Period::OneYear).await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        // The stale entry was replaced, not duplicated.
        assert_eq!(cache.len(), 1);

        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn empty_series_not_cached() {
        let cache = CachedSource::new(source(true), Duration::from_secs(60));
        let ticker = TickerSymbol::parse("ZZZZ").unwrap();

        cache.fetch(&ticker, Interval::OneDay, Period::OneYear).await.unwrap();
        cache.fetch(&ticker, Interval::OneDay, Period::OneYear).await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}
