mod config;
mod cpu;
mod error;
mod metrics;
mod operation;
mod percentiles;
mod phase;
mod repeat;
mod stats;

pub use config::{DEFAULT_CPU_SAMPLE_INTERVAL, MIN_CPU_SAMPLE_INTERVAL, RunConfig};
pub use cpu::{
    CpuProbe, CpuSampler, CpuSamples, CpuSource, CpuTick, LoadAverage, SAMPLER_JOIN_TIMEOUT,
    SamplerExit, SysinfoCpu, logical_cpu_count,
};
pub use error::{Error, Result};
pub use metrics::{MAX_LATENCY_SAMPLES, MetricsStore, PhaseMetrics};
pub use operation::{FnOperation, Operation};
pub use percentiles::{BASELINE_PERCENTILES, Percentile, PercentileSet, percentile_key};
pub use phase::run_phase;
pub use repeat::{
    CrossRepeatSummary, PhaseResults, RepeatResult, RunOutcome, run_repeats, summarize_repeats,
};
pub use stats::{
    CpuSummary, CpuUsage, LatencySummary, RunningStats, percentile_sorted, summarize_cpu,
    summarize_latencies,
};
