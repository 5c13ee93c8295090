use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Concurrency limit must be >= 1.")]
    ZeroConcurrency,
    #[error("Concurrency limit must be <= {max}.")]
    ConcurrencyTooLarge { max: usize },
    #[error("Request timeout must be > 0.")]
    ZeroRequestTimeout,
    #[error("Request timeout must be <= {max_secs}s.")]
    RequestTimeoutTooLarge { max_secs: u64 },
    #[error("Concurrency limiter closed unexpectedly.")]
    LimiterClosed,
    #[error("Latency histogram unavailable: {message}")]
    Histogram { message: String },
}
