/// Why a single ticker's history could not be retrieved.
///
/// These never abort a scan. The evaluator matches on them, logs them and
/// drops the ticker from the report.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by market data provider")]
    RateLimited,

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Provider error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// Errors surfaced to the caller of a scan.
///
/// Everything except `Cancelled` is raised before the first fetch.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    // ── Validation ──
    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Invalid RSI threshold: {0} (must be within 0..=100)")]
    InvalidThreshold(f64),

    #[error("Invalid RSI window: {0} (must be at least 1)")]
    InvalidWindow(usize),

    #[error("Invalid worker count: {0} (must be at least 1)")]
    InvalidWorkers(usize),

    #[error("Unknown interval: {0}")]
    UnknownInterval(String),

    #[error("No scan interval configured")]
    NoIntervals,

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("Invalid ticker symbol: {0:?}")]
    InvalidSymbol(String),

    // ── Lifecycle ──
    #[error("Scan cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, ScanError::Cancelled)
    }
}
