use std::collections::HashMap;
use std::time::Instant;

use crate::failure::ErrorKey;

use super::config::{RunConfig, deadline_after};
use super::cpu::{CpuSampler, CpuSamples, CpuSource, SAMPLER_JOIN_TIMEOUT, SamplerExit};
use super::error::Result;
use super::metrics::MetricsStore;
use super::operation::Operation;
use super::percentiles::PercentileSet;
use super::phase::run_phase;
use super::stats::{CpuSummary, LatencySummary, RunningStats, summarize_cpu, summarize_latencies};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseResults {
    pub success_count: u64,
    pub failure_count: u64,
    /// Attempts per second of configured measurement duration.
    pub throughput: f64,
}

/// Outcome of one warmup + measurement cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatResult {
    /// 1-based.
    pub index: usize,
    pub results: PhaseResults,
    pub latency: LatencySummary,
    pub latency_truncated: bool,
    pub cpu: CpuSummary,
    pub errors: HashMap<ErrorKey, u64>,
}

impl RepeatResult {
    /// Placeholder for a repeat that never ran.
    pub fn zeroed(index: usize, cfg: &RunConfig, logical_cpus: usize) -> Self {
        Self {
            index,
            results: PhaseResults::default(),
            latency: LatencySummary::empty(&cfg.percentiles),
            latency_truncated: false,
            cpu: CpuSummary::unavailable(cfg.cpu_sample_interval, None, logical_cpus),
            errors: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrossRepeatSummary {
    pub throughput_mean: Option<f64>,
    /// Sample stdev; absent for a single repeat.
    pub throughput_stdev: Option<f64>,
    pub p99_mean: Option<f64>,
    /// Only computed when 99.9 was requested.
    pub p99_9_mean: Option<f64>,
    pub max_latency_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub repeats: Vec<RepeatResult>,
    pub summary: CrossRepeatSummary,
    pub notes: Vec<String>,
}

/// How the CPU sampler ended for one measurement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SamplerState {
    Observed,
    Unavailable,
    Unobserved,
}

/// Runs `cfg.repeats` sequential warmup + measurement cycles.
pub fn run_repeats<O: Operation>(
    cfg: &RunConfig,
    op: &O,
    cpu: &dyn CpuSource,
) -> Result<RunOutcome> {
    cfg.validate()?;

    let mut repeats = Vec::with_capacity(cfg.repeats);
    let mut unavailable = false;
    let mut unobserved = Vec::new();

    for index in 1..=cfg.repeats {
        if !cfg.warmup.is_zero() {
            tracing::debug!(repeat = index, warmup_ms = cfg.warmup.as_millis() as u64, "warmup");
            let deadline = deadline_after(Instant::now(), cfg.warmup, "warmup")?;
            run_phase(cfg.concurrency, deadline, op, None)?;
        }

        let (result, sampler) = run_measurement(index, cfg, op, cpu)?;
        tracing::info!(
            repeat = index,
            success = result.results.success_count,
            failure = result.results.failure_count,
            throughput = result.results.throughput,
            "measurement complete"
        );

        match sampler {
            SamplerState::Observed => {}
            SamplerState::Unavailable => unavailable = true,
            SamplerState::Unobserved => unobserved.push(index),
        }
        repeats.push(result);
    }

    let summary = summarize_repeats(&repeats, &cfg.percentiles);

    let mut notes = Vec::new();
    if let Some(note) = warmup_note(cfg) {
        notes.push(note);
    }
    if unavailable {
        notes.push(
            "CPU sampling unavailable on this host; cpu percentage fields set to null.".to_string(),
        );
    }
    if !unobserved.is_empty() {
        notes.push(format!(
            "CPU sampler did not stop within {}s in repeat(s) {}; its samples were discarded.",
            SAMPLER_JOIN_TIMEOUT.as_secs(),
            join_indices(&unobserved)
        ));
    }
    if let Some(note) = truncation_note(&repeats, cfg.latency_capacity) {
        notes.push(note);
    }

    Ok(RunOutcome {
        repeats,
        summary,
        notes,
    })
}

fn run_measurement<O: Operation>(
    index: usize,
    cfg: &RunConfig,
    op: &O,
    cpu: &dyn CpuSource,
) -> Result<(RepeatResult, SamplerState)> {
    let store = MetricsStore::with_capacity(cfg.latency_capacity);
    let deadline = deadline_after(Instant::now(), cfg.duration, "duration")?;
    let sampler = CpuSampler::start(cpu, cfg.cpu_sample_interval)?;
    if sampler.is_none() {
        tracing::debug!(repeat = index, "cpu sampling unavailable");
    }

    tracing::debug!(repeat = index, concurrency = cfg.concurrency, "measurement started");
    let phase = run_phase(cfg.concurrency, deadline, op, Some(&store));

    // Stop the sampler before propagating a phase error.
    let (samples, state): (Option<CpuSamples>, SamplerState) =
        match sampler.map(|s| s.stop(SAMPLER_JOIN_TIMEOUT)) {
            None => (None, SamplerState::Unavailable),
            Some(SamplerExit::Joined(samples)) => (Some(samples), SamplerState::Observed),
            Some(SamplerExit::TimedOut | SamplerExit::Lost) => {
                (Some(CpuSamples::default()), SamplerState::Unobserved)
            }
        };
    phase?;

    let load_average = cpu.load_average();
    let metrics = store.into_inner();

    let results = PhaseResults {
        success_count: metrics.success_count,
        failure_count: metrics.failure_count,
        throughput: metrics.attempts() as f64 / cfg.duration.as_secs_f64(),
    };
    let cpu_summary = summarize_cpu(
        samples.as_ref(),
        cfg.cpu_sample_interval,
        load_average,
        cpu.logical_cpus(),
    );

    Ok((
        RepeatResult {
            index,
            results,
            latency: summarize_latencies(metrics.latencies_ms, &cfg.percentiles),
            latency_truncated: metrics.latency_truncated,
            cpu: cpu_summary,
            errors: metrics.errors,
        },
        state,
    ))
}

pub fn summarize_repeats(repeats: &[RepeatResult], set: &PercentileSet) -> CrossRepeatSummary {
    let throughput: RunningStats = repeats.iter().map(|r| r.results.throughput).collect();
    let p99: RunningStats = repeats.iter().filter_map(|r| r.latency.p99()).collect();
    let max: RunningStats = repeats.iter().filter_map(|r| r.latency.max).collect();

    let p99_9_mean = if set.contains(99.9) {
        repeats
            .iter()
            .filter_map(|r| r.latency.get("p99_9"))
            .collect::<RunningStats>()
            .mean()
    } else {
        None
    };

    CrossRepeatSummary {
        throughput_mean: throughput.mean(),
        throughput_stdev: throughput.stdev(),
        p99_mean: p99.mean(),
        p99_9_mean,
        max_latency_max: max.max(),
    }
}

fn warmup_note(cfg: &RunConfig) -> Option<String> {
    if cfg.warmup.is_zero() {
        return None;
    }
    Some(if cfg.repeats == 1 {
        "Warmup completed; warmup metrics discarded and counters reset.".to_string()
    } else {
        format!(
            "Warmup ran before each of the {} repeats; warmup metrics discarded and counters reset.",
            cfg.repeats
        )
    })
}

fn truncation_note(repeats: &[RepeatResult], capacity: usize) -> Option<String> {
    let truncated: Vec<usize> = repeats
        .iter()
        .filter(|r| r.latency_truncated)
        .map(|r| r.index)
        .collect();
    if truncated.is_empty() {
        return None;
    }
    Some(format!(
        "Latency list hit {} samples in repeat(s) {}; additional latencies were dropped.",
        group_thousands(capacity),
        join_indices(&truncated)
    ))
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::cpu::{CpuProbe, LoadAverage};
    use crate::runner::stats::CpuUsage;
    use std::time::Duration;

    fn repeat_with(
        index: usize,
        throughput: f64,
        p99: Option<f64>,
        max: Option<f64>,
    ) -> RepeatResult {
        let cfg = RunConfig::default();
        let mut r = RepeatResult::zeroed(index, &cfg, 1);
        r.results.throughput = throughput;
        r.latency.percentiles = vec![
            ("p50".to_string(), p99),
            ("p95".to_string(), p99),
            ("p99".to_string(), p99),
        ];
        r.latency.max = max;
        r
    }

    #[test]
    fn single_repeat_has_no_stdev() {
        let repeats = vec![repeat_with(1, 100.0, Some(2.0), Some(3.0))];
        let s = summarize_repeats(&repeats, &PercentileSet::default());
        assert_eq!(s.throughput_mean, Some(100.0));
        assert_eq!(s.throughput_stdev, None);
        assert_eq!(s.p99_mean, Some(2.0));
        assert_eq!(s.p99_9_mean, None);
        assert_eq!(s.max_latency_max, Some(3.0));
    }

    #[test]
    fn cross_repeat_summary_skips_absent_values() {
        let repeats = vec![
            repeat_with(1, 100.0, Some(2.0), Some(3.0)),
            repeat_with(2, 200.0, None, None),
            repeat_with(3, 300.0, Some(4.0), Some(9.0)),
        ];
        let s = summarize_repeats(&repeats, &PercentileSet::default());
        assert_eq!(s.throughput_mean, Some(200.0));
        assert_eq!(s.throughput_stdev, Some(100.0));
        assert_eq!(s.p99_mean, Some(3.0));
        assert_eq!(s.max_latency_max, Some(9.0));
    }

    #[test]
    fn p99_mean_absent_when_all_absent() {
        let repeats = vec![repeat_with(1, 1.0, None, None), repeat_with(2, 1.0, None, None)];
        let s = summarize_repeats(&repeats, &PercentileSet::default());
        assert_eq!(s.p99_mean, None);
        assert_eq!(s.max_latency_max, None);
    }

    #[test]
    fn p99_9_mean_requires_request() {
        let set = match PercentileSet::parse("50,99.9") {
            Ok(v) => v,
            Err(err) => panic!("parse failed: {err}"),
        };
        let mut a = repeat_with(1, 1.0, Some(1.0), Some(1.0));
        a.latency.percentiles.push(("p99_9".to_string(), Some(4.0)));
        let mut b = repeat_with(2, 1.0, Some(1.0), Some(1.0));
        b.latency.percentiles.push(("p99_9".to_string(), Some(6.0)));

        let repeats = vec![a, b];
        assert_eq!(summarize_repeats(&repeats, &set).p99_9_mean, Some(5.0));
        assert_eq!(
            summarize_repeats(&repeats, &PercentileSet::default()).p99_9_mean,
            None
        );
    }

    #[test]
    fn truncation_note_lists_one_based_indices() {
        let mut a = repeat_with(1, 1.0, None, None);
        a.latency_truncated = true;
        let b = repeat_with(2, 1.0, None, None);
        let mut c = repeat_with(3, 1.0, None, None);
        c.latency_truncated = true;

        let note = truncation_note(&[a, b, c], 2_000_000);
        assert_eq!(
            note.as_deref(),
            Some(
                "Latency list hit 2,000,000 samples in repeat(s) 1, 3; additional latencies were dropped."
            )
        );
        assert_eq!(truncation_note(&[], 10), None);
    }

    #[test]
    fn group_thousands_formats() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(2_000_000), "2,000,000");
    }

    #[test]
    fn warmup_note_wording_depends_on_repeats() {
        let cfg = RunConfig::default();
        assert_eq!(warmup_note(&cfg), None);

        let cfg = RunConfig {
            warmup: Duration::from_secs(1),
            ..RunConfig::default()
        };
        assert!(warmup_note(&cfg).is_some_and(|n| n.starts_with("Warmup completed")));

        let cfg = RunConfig {
            warmup: Duration::from_secs(1),
            repeats: 3,
            ..RunConfig::default()
        };
        assert!(warmup_note(&cfg).is_some_and(|n| n.contains("each of the 3 repeats")));
    }

    struct NoCpu;

    impl CpuSource for NoCpu {
        fn open(&self) -> Option<Box<dyn CpuProbe>> {
            None
        }

        fn load_average(&self) -> Option<LoadAverage> {
            Some(LoadAverage {
                one: 1.0,
                five: 2.0,
                fifteen: 3.0,
            })
        }

        fn logical_cpus(&self) -> usize {
            2
        }
    }

    #[test]
    fn throughput_is_attempts_over_configured_duration() {
        let op = crate::runner::operation::FnOperation::new(|| Ok(()));
        let cfg = RunConfig {
            concurrency: 2,
            duration: Duration::from_millis(100),
            ..RunConfig::default()
        };

        let out = match run_repeats(&cfg, &op, &NoCpu) {
            Ok(v) => v,
            Err(err) => panic!("run failed: {err}"),
        };
        let r = &out.repeats[0];
        let attempts = (r.results.success_count + r.results.failure_count) as f64;
        assert_eq!(r.results.throughput, attempts / 0.1);
        assert_eq!(r.cpu.usage, CpuUsage::Unavailable);
        assert!(r.cpu.load_average.is_some());
        assert!(out.notes.iter().any(|n| n.starts_with("CPU sampling unavailable")));
    }
}
