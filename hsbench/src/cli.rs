use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use hsbench_core::runner::{MAX_LATENCY_SAMPLES, PercentileSet, RunConfig};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10, 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10, 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10, 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10, 10s, 250ms, 1m)"
        )),
    }
}

fn parse_positive_duration(input: &str) -> Result<Duration, String> {
    let d = parse_duration(input)?;
    if d.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(d)
}

/// Fractional seconds, e.g. `0.5`.
fn parse_seconds(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("invalid number of seconds '{s}' (expected e.g. 0.5)"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid number of seconds '{s}'"))
}

fn parse_percentiles(input: &str) -> Result<PercentileSet, String> {
    PercentileSet::parse(input).map_err(|err| err.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "hsbench",
    author,
    version,
    about = "Handshake capacity benchmark",
    long_about = "hsbench drives a key-exchange profile from many worker threads for a fixed duration and writes a JSON capacity report.\n\nEach repeat runs an optional warmup (discarded) followed by a measurement phase. The report holds per-repeat results, a cross-repeat summary, CPU utilization and a hashed error taxonomy.",
    after_help = "Examples:\n  hsbench --profile profiles/mock.yaml --concurrency 8 --duration 30 --warmup 5 --out out/report.json\n  hsbench --profile profiles/mock.yaml --concurrency 4 --duration 10s --warmup 0 --repeats 3 --percentiles 50,95,99,99.9 --out report.json"
)]
pub struct Cli {
    /// Path to the profile YAML
    #[arg(long, env = "HSBENCH_PROFILE")]
    pub profile: PathBuf,

    /// Number of concurrent workers
    #[arg(long, env = "HSBENCH_CONCURRENCY")]
    pub concurrency: NonZeroUsize,

    /// Measurement duration per repeat (e.g. 30, 30s, 1m)
    #[arg(long, env = "HSBENCH_DURATION", value_parser = parse_positive_duration)]
    pub duration: Duration,

    /// Warmup duration before each measurement; 0 disables warmup
    #[arg(long, env = "HSBENCH_WARMUP", value_parser = parse_duration)]
    pub warmup: Duration,

    /// Number of warmup + measurement cycles
    #[arg(long, env = "HSBENCH_REPEATS", default_value = "1")]
    pub repeats: NonZeroUsize,

    /// Comma-separated percentiles in [0, 100]; p50/p95/p99 are always reported
    #[arg(
        long,
        env = "HSBENCH_PERCENTILES",
        default_value = "50,95,99",
        value_parser = parse_percentiles
    )]
    pub percentiles: PercentileSet,

    /// CPU sampling interval in seconds (minimum 0.2)
    #[arg(
        long,
        env = "HSBENCH_CPU_SAMPLE_INTERVAL",
        default_value = "0.5",
        value_parser = parse_seconds
    )]
    pub cpu_sample_interval: Duration,

    /// Where to write the JSON report (parent directories are created)
    #[arg(long, env = "HSBENCH_OUT")]
    pub out: PathBuf,

    /// Log filter used when RUST_LOG is not set (e.g. info, debug, hsbench_core=trace)
    #[arg(long, env = "HSBENCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Do not echo the report to stdout
    #[arg(long)]
    pub quiet: bool,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            concurrency: self.concurrency.get(),
            duration: self.duration,
            warmup: self.warmup,
            repeats: self.repeats.get(),
            percentiles: self.percentiles.clone(),
            cpu_sample_interval: self.cpu_sample_interval,
            latency_capacity: MAX_LATENCY_SAMPLES,
        }
    }
}
