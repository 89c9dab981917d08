pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`concurrency` must be a positive integer")]
    InvalidConcurrency,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`{field}` of {secs}s is too large to schedule")]
    DurationOutOfRange { field: &'static str, secs: u64 },

    #[error("`repeats` must be a positive integer")]
    InvalidRepeats,

    #[error("`cpu_sample_interval` must be at least {min_ms}ms (got {got_ms}ms)")]
    InvalidCpuInterval { min_ms: u128, got_ms: u128 },

    #[error("`latency_capacity` must be a positive integer")]
    InvalidLatencyCapacity,

    #[error("invalid percentile `{0}` (expected a number in [0, 100])")]
    InvalidPercentile(String),

    #[error("percentile list must not be empty")]
    EmptyPercentiles,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
