use std::time::{Duration, Instant};

use super::error::{Error, Result};
use super::metrics::MAX_LATENCY_SAMPLES;
use super::percentiles::PercentileSet;

pub const DEFAULT_CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Worker threads per phase.
    pub concurrency: usize,
    /// Measurement phase length. Throughput is computed against this, not against elapsed time.
    pub duration: Duration,
    /// Warmup phase length; zero disables warmup.
    pub warmup: Duration,
    pub repeats: usize,
    pub percentiles: PercentileSet,
    pub cpu_sample_interval: Duration,
    pub latency_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            duration: Duration::from_secs(1),
            warmup: Duration::ZERO,
            repeats: 1,
            percentiles: PercentileSet::default(),
            cpu_sample_interval: DEFAULT_CPU_SAMPLE_INTERVAL,
            latency_capacity: MAX_LATENCY_SAMPLES,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConcurrency);
        }
        if self.duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        deadline_after(Instant::now(), self.duration, "duration")?;
        deadline_after(Instant::now(), self.warmup, "warmup")?;
        if self.repeats == 0 {
            return Err(Error::InvalidRepeats);
        }
        if self.cpu_sample_interval < MIN_CPU_SAMPLE_INTERVAL {
            return Err(Error::InvalidCpuInterval {
                min_ms: MIN_CPU_SAMPLE_INTERVAL.as_millis(),
                got_ms: self.cpu_sample_interval.as_millis(),
            });
        }
        if self.latency_capacity == 0 {
            return Err(Error::InvalidLatencyCapacity);
        }
        Ok(())
    }
}

/// `start + len`, or `DurationOutOfRange` when the platform clock cannot represent it.
pub(crate) fn deadline_after(start: Instant, len: Duration, field: &'static str) -> Result<Instant> {
    start
        .checked_add(len)
        .ok_or(Error::DurationOutOfRange {
            field,
            secs: len.as_secs(),
        })
}
