//! Pacing between batches so the market data provider's rate limits hold.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Decides how long to wait after a batch before the next one starts.
///
/// Only called between batches, never after the last one.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `completed` is the number of finished batches, `batch_elapsed` how long
    /// the batch just finished took.
    async fn pause(&self, completed: usize, batch_elapsed: Duration);
}

/// Built-in pacing strategies, selectable from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThrottlePolicy {
    None,
    /// Same pause after every batch.
    FixedDelay { delay_ms: u64 },
    /// Pad each batch out to at least `window_ms` of wall time.
    Window { window_ms: u64 },
    /// `base_ms * factor^(completed - 1)`, capped at `max_ms`.
    ExponentialBackoff {
        base_ms: u64,
        factor: f64,
        max_ms: u64,
    },
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        ThrottlePolicy::FixedDelay { delay_ms: 1_000 }
    }
}

impl ThrottlePolicy {
    pub fn delay_for(&self, completed: usize, batch_elapsed: Duration) -> Duration {
        match *self {
            ThrottlePolicy::None => Duration::ZERO,
            ThrottlePolicy::FixedDelay { delay_ms } => Duration::from_millis(delay_ms),
            ThrottlePolicy::Window { window_ms } => {
                Duration::from_millis(window_ms).saturating_sub(batch_elapsed)
            }
            ThrottlePolicy::ExponentialBackoff {
                base_ms,
                factor,
                max_ms,
            } => {
                let exponent = completed.saturating_sub(1).min(i32::MAX as usize) as i32;
                let millis = (base_ms as f64 * factor.max(1.0).powi(exponent)).min(max_ms as f64);
                Duration::from_millis(millis as u64)
            }
        }
    }
}

#[async_trait]
impl RateLimiter for ThrottlePolicy {
    async fn pause(&self, completed: usize, batch_elapsed: Duration) {
        let wait = self.delay_for(completed, batch_elapsed);
        if wait.is_zero() {
            return;
        }
        debug!(wait_ms = wait.as_millis() as u64, completed, "Pausing between batches");
        tokio::time::sleep(wait).await;
    }
}
