//! Batch scheduling for a scan over the whole ticker universe.
//!
//! Batches run strictly in order. Inside a batch up to `workers` tickers are
//! evaluated at once; results are collected in scan order, the batch is
//! finished completely, and only then does the rate limiter pause.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::errors::ScanError;
use crate::evaluator::{self, Evaluation, EvaluationParams};
use crate::indicators::{DEFAULT_RSI_WINDOW, RsiSmoothing};
use crate::market::{Interval, Period, TickerSymbol};
use crate::market_data::MarketDataSource;
use crate::report::{Aggregator, DualScanReport, ScanReport};
use crate::throttle::{RateLimiter, ThrottlePolicy};
use crate::universe::dedupe;

pub const DEFAULT_THRESHOLD: f64 = 30.0;
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Parameters for one scan invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub interval: Interval,
    pub period: Period,
    pub threshold: f64,
    pub window: usize,
    pub smoothing: RsiSmoothing,
    /// Concurrent evaluations inside one batch; 1 is strictly sequential.
    pub workers: usize,
    /// Collapse repeated symbols to their first occurrence.
    pub dedupe: bool,
}

impl BatchConfig {
    /// Defaults for `interval`, with the lookback period derived from it.
    pub fn new(interval: Interval) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            interval,
            period: interval.default_period(),
            threshold: DEFAULT_THRESHOLD,
            window: DEFAULT_RSI_WINDOW,
            smoothing: RsiSmoothing::Simple,
            workers: 1,
            dedupe: true,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.batch_size == 0 {
            return Err(ScanError::InvalidBatchSize(self.batch_size));
        }
        if !self.threshold.is_finite() || !(0.0..=100.0).contains(&self.threshold) {
            return Err(ScanError::InvalidThreshold(self.threshold));
        }
        if self.window == 0 {
            return Err(ScanError::InvalidWindow(self.window));
        }
        if self.workers == 0 {
            return Err(ScanError::InvalidWorkers(self.workers));
        }
        Ok(())
    }

    fn evaluation_params(&self) -> EvaluationParams {
        EvaluationParams {
            interval: self.interval,
            period: self.period,
            threshold: self.threshold,
            window: self.window,
            smoothing: self.smoothing,
        }
    }
}

/// Cooperative cancellation shared between a scan and whoever started it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Emitted after every completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub interval: Interval,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Consecutive slices of `universe`; only the last may be shorter.
pub fn partition(universe: &[TickerSymbol], batch_size: usize) -> Vec<&[TickerSymbol]> {
    if batch_size == 0 {
        return Vec::new();
    }
    universe.chunks(batch_size).collect()
}

/// Drives batched evaluation over a ticker universe.
pub struct Scanner<S: ?Sized> {
    source: Arc<S>,
    limiter: Arc<dyn RateLimiter>,
    cancel: CancelFlag,
    on_progress: Option<ProgressCallback>,
}

impl<S: MarketDataSource + ?Sized> Scanner<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            limiter: Arc::new(ThrottlePolicy::default()),
            cancel: CancelFlag::new(),
            on_progress: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Scans `universe` and returns the qualifying tickers sorted by RSI.
    ///
    /// Only configuration problems and cancellation are errors. A ticker that
    /// fails to fetch or compute is left out of the report.
    pub async fn scan(&self, universe: &[TickerSymbol], config: &BatchConfig) -> Result<ScanReport, ScanError> {
        config.validate()?;

        let owned;
        let tickers = if config.dedupe {
            owned = dedupe(universe);
            owned.as_slice()
        } else {
            universe
        };

        let batches = partition(tickers, config.batch_size);
        let total = batches.len();
        let params = config.evaluation_params();
        let mut aggregator = Aggregator::new(config.interval, config.threshold);

        info!(
            interval = %config.interval,
            period = %config.period,
            tickers = tickers.len(),
            batches = total,
            "Starting scan"
        );

        for (index, batch) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let started = Instant::now();

            let outcomes = self.run_batch(batch, &params, config.workers).await;
            for outcome in outcomes {
                // `None` marks a ticker skipped after cancellation.
                let Some(evaluation) = outcome else { continue };
                aggregator.record_attempt(evaluation.produced_rsi());
                if let Some(result) = evaluation.into_result() {
                    aggregator.push(result);
                }
            }
            if self.cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let progress = Progress {
                interval: config.interval,
                completed: index + 1,
                total,
            };
            info!(
                interval = %config.interval,
                batch = progress.completed,
                total_batches = total,
                tickers = batch.len(),
                "Batch completed"
            );
            if let Some(callback) = &self.on_progress {
                callback(progress);
            }

            if progress.completed < total {
                tokio::select! {
                    _ = self.limiter.pause(progress.completed, started.elapsed()) => {}
                    _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
                }
            }
        }

        let report = aggregator.finish();
        info!(
            interval = %report.interval,
            attempted = report.attempted,
            succeeded = report.succeeded,
            matches = report.results.len(),
            "Scan finished"
        );
        Ok(report)
    }

    /// Two fully independent scans over the same universe, one after the other.
    pub async fn scan_dual(
        &self,
        universe: &[TickerSymbol],
        first: &BatchConfig,
        second: &BatchConfig,
    ) -> Result<DualScanReport, ScanError> {
        first.validate()?;
        second.validate()?;
        let first = self.scan(universe, first).await?;
        let second = self.scan(universe, second).await?;
        Ok(DualScanReport { first, second })
    }

    async fn run_batch(
        &self,
        batch: &[TickerSymbol],
        params: &EvaluationParams,
        workers: usize,
    ) -> Vec<Option<Evaluation>> {
        let source = self.source.as_ref();
        let cancel = &self.cancel;

        stream::iter(batch)
            .map(|ticker| async move {
                if cancel.is_cancelled() {
                    debug!(ticker = %ticker, "Skipping ticker after cancellation");
                    return None;
                }
                Some(evaluator::assess(source, ticker, params).await)
            })
            .buffered(workers)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(n: usize) -> Vec<TickerSymbol> {
        (0..n)
            .map(|i| TickerSymbol::parse(&format!("T{i}")).unwrap())
            .collect()
    }

    #[test]
    fn partition_sizes() {
        let universe = symbols(47);
        let sizes: Vec<usize> = partition(&universe, 20).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![20, 20, 7]);

        assert!(partition(&[], 20).is_empty());
        assert_eq!(partition(&symbols(5), 100).len(), 1);
        assert_eq!(partition(&symbols(40), 20).len(), 2);
    }

    #[test]
    fn batches_preserve_order() {
        let universe = symbols(5);
        let batches = partition(&universe, 2);
        let flattened: Vec<&TickerSymbol> = batches.iter().flat_map(|b| b.iter()).collect();
        assert_eq!(flattened, universe.iter().collect::<Vec<_>>());
    }

    #[test]
    fn validation_rejects_bad_configs() {
        let base = BatchConfig::new(Interval::OneMinute);
        assert!(base.validate().is_ok());
        assert!(matches!(
            base.clone().with_batch_size(0).validate(),
            Err(ScanError::InvalidBatchSize(0))
        ));
        assert!(matches!(
            base.clone().with_threshold(100.5).validate(),
            Err(ScanError::InvalidThreshold(_))
        ));
        assert!(matches!(
            base.clone().with_threshold(f64::NAN).validate(),
            Err(ScanError::InvalidThreshold(_))
        ));
        assert!(matches!(
            base.clone().with_workers(0).validate(),
            Err(ScanError::InvalidWorkers(0))
        ));
        let mut zero_window = base;
        zero_window.window = 0;
        assert!(matches!(zero_window.validate(), Err(ScanError::InvalidWindow(0))));
    }

    #[test]
    fn config_derives_period_from_interval() {
        let config = BatchConfig::new(Interval::ThirtyMinutes);
        assert_eq!(config.period, Period::TwentyDays);
        assert_eq!(config.threshold, 30.0);
        assert_eq!(config.window, 14);
    }

    #[test]
    fn progress_fraction() {
        let progress = Progress {
            interval: Interval::OneDay,
            completed: 1,
            total: 4,
        };
        assert_eq!(progress.fraction(), 0.25);
    }

    #[tokio::test]
    async fn cancel_flag_wakes_waiters() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::task::yield_now().await;
        flag.cancel();
        waiter.await.unwrap();
        assert!(flag.is_cancelled());
    }
}
