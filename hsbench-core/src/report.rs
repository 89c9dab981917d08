use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::environment::{Environment, utc_now};
use crate::failure::{ErrorKey, Failure};
use crate::runner::{
    CpuSource, CpuSummary, CpuUsage, CrossRepeatSummary, LatencySummary, Operation,
    RepeatResult, Result, RunConfig, RunOutcome, run_repeats,
};

pub const INTERNAL_ERROR_NOTE: &str =
    "Benchmark execution raised an internal error; see errors[] for hashed details.";

/// Identifies what was benchmarked. Supplied by the caller that loaded the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub profile_path: String,
    pub profile_name: String,
    pub provider: String,
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub handshake_model: &'static str,
    pub iterations_per_handshake: u32,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            handshake_model: "burst",
            iterations_per_handshake: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultsDoc {
    pub success_count: u64,
    pub failure_count: u64,
    pub throughput_hs_per_sec: f64,
}

/// `{count, p50, p95, p99, <extra>..., max}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyDoc {
    pub count: u64,
    #[serde(flatten)]
    pub percentiles: BTreeMap<String, Option<f64>>,
    pub max: Option<f64>,
}

impl From<&LatencySummary> for LatencyDoc {
    fn from(s: &LatencySummary) -> Self {
        Self {
            count: s.count,
            percentiles: s.percentiles.iter().cloned().collect(),
            max: s.max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuDoc {
    pub system_avg_percent: Option<f64>,
    pub system_peak_percent: Option<f64>,
    pub process_avg_percent: Option<f64>,
    pub process_peak_percent: Option<f64>,
    pub sample_interval_s: f64,
    pub sample_count: usize,
    pub load_avg_1m: Option<f64>,
    pub load_avg_5m: Option<f64>,
    pub load_avg_15m: Option<f64>,
    pub logical_cpus: usize,
}

impl From<&CpuSummary> for CpuDoc {
    fn from(s: &CpuSummary) -> Self {
        let (system_avg, system_peak, process_avg, process_peak, sample_count) = match s.usage {
            CpuUsage::Available {
                system_avg,
                system_peak,
                process_avg,
                process_peak,
                sample_count,
            } => (system_avg, system_peak, process_avg, process_peak, sample_count),
            CpuUsage::Unavailable => (None, None, None, None, 0),
        };
        Self {
            system_avg_percent: system_avg,
            system_peak_percent: system_peak,
            process_avg_percent: process_avg,
            process_peak_percent: process_peak,
            sample_interval_s: s.sample_interval.as_secs_f64(),
            sample_count,
            load_avg_1m: s.load_average.map(|l| l.one),
            load_avg_5m: s.load_average.map(|l| l.five),
            load_avg_15m: s.load_average.map(|l| l.fifteen),
            logical_cpus: s.logical_cpus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub msg_hash: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatDoc {
    pub index: usize,
    pub results: ResultsDoc,
    pub latency_ms: LatencyDoc,
    pub latency_truncated: bool,
    pub cpu: CpuDoc,
    pub errors: Vec<ErrorEntry>,
}

impl From<&RepeatResult> for RepeatDoc {
    fn from(r: &RepeatResult) -> Self {
        Self {
            index: r.index,
            results: ResultsDoc {
                success_count: r.results.success_count,
                failure_count: r.results.failure_count,
                throughput_hs_per_sec: r.results.throughput,
            },
            latency_ms: LatencyDoc::from(&r.latency),
            latency_truncated: r.latency_truncated,
            cpu: CpuDoc::from(&r.cpu),
            errors: error_entries(&r.errors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryDoc {
    pub throughput_mean: Option<f64>,
    pub throughput_stdev: Option<f64>,
    pub p99_mean: Option<f64>,
    pub p99_9_mean: Option<f64>,
    pub max_latency_max: Option<f64>,
}

impl From<&CrossRepeatSummary> for SummaryDoc {
    fn from(s: &CrossRepeatSummary) -> Self {
        Self {
            throughput_mean: s.throughput_mean,
            throughput_stdev: s.throughput_stdev,
            p99_mean: s.p99_mean,
            p99_9_mean: s.p99_9_mean,
            max_latency_max: s.max_latency_max,
        }
    }
}

/// The complete benchmark document.
///
/// `results`, `latency_ms`, `latency_truncated` and `cpu` mirror the first repeat so single-repeat
/// consumers keep working.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub profile_path: String,
    pub profile_name: String,
    pub provider: String,
    pub mode: String,
    pub concurrency: usize,
    #[serde(serialize_with = "whole_seconds")]
    pub warmup_s: Duration,
    #[serde(serialize_with = "whole_seconds")]
    pub duration_s: Duration,
    pub repeats_requested: usize,
    /// Reported percentiles: baseline first, then extras in request order.
    pub percentiles: Vec<f64>,
    pub cpu_sample_interval_s: f64,
    pub timestamp_utc: String,
    pub environment: Environment,
    pub workload: Workload,
    pub results: ResultsDoc,
    pub latency_ms: LatencyDoc,
    pub latency_truncated: bool,
    pub cpu: CpuDoc,
    pub repeats: Vec<RepeatDoc>,
    pub summary: SummaryDoc,
    pub errors: Vec<ErrorEntry>,
    pub notes: Vec<String>,
}

/// Integer seconds when exact, fractional seconds otherwise.
fn whole_seconds<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    if d.subsec_nanos() == 0 {
        s.serialize_u64(d.as_secs())
    } else {
        s.serialize_f64(d.as_secs_f64())
    }
}

impl Report {
    /// Pretty JSON with sorted keys and a trailing newline.
    pub fn to_json_pretty(&self) -> Result<String> {
        // `Value` objects are BTreeMap-backed, which sorts every key.
        let value = serde_json::to_value(self)?;
        let mut out = serde_json::to_string_pretty(&value)?;
        out.push('\n');
        Ok(out)
    }
}

/// Sorted by descending count, then kind, then hash.
pub fn error_entries(errors: &HashMap<ErrorKey, u64>) -> Vec<ErrorEntry> {
    let mut items: Vec<(&ErrorKey, u64)> = errors.iter().map(|(k, v)| (k, *v)).collect();
    items.sort_by(|(ka, ca), (kb, cb)| {
        cb.cmp(ca)
            .then_with(|| ka.kind.as_str().cmp(kb.kind.as_str()))
            .then_with(|| ka.msg_hash.cmp(&kb.msg_hash))
    });
    items
        .into_iter()
        .map(|(k, count)| ErrorEntry {
            kind: k.kind.to_string(),
            msg_hash: k.msg_hash.clone(),
            count,
        })
        .collect()
}

pub fn merge_errors<'a, I>(repeats: I) -> HashMap<ErrorKey, u64>
where
    I: IntoIterator<Item = &'a RepeatResult>,
{
    let mut merged: HashMap<ErrorKey, u64> = HashMap::new();
    for r in repeats {
        for (key, count) in &r.errors {
            let slot = merged.entry(key.clone()).or_insert(0);
            *slot = slot.saturating_add(*count);
        }
    }
    merged
}

fn skeleton(
    header: &ReportHeader,
    cfg: &RunConfig,
    environment: Environment,
    repeats: &[RepeatResult],
) -> Report {
    let docs: Vec<RepeatDoc> = repeats.iter().map(RepeatDoc::from).collect();
    let (results, latency_ms, latency_truncated, cpu) = match docs.first() {
        Some(first) => (
            first.results,
            first.latency_ms.clone(),
            first.latency_truncated,
            first.cpu,
        ),
        None => {
            let zero = RepeatDoc::from(&RepeatResult::zeroed(1, cfg, environment.cpu_count));
            (zero.results, zero.latency_ms, false, zero.cpu)
        }
    };

    Report {
        profile_path: header.profile_path.clone(),
        profile_name: header.profile_name.clone(),
        provider: header.provider.clone(),
        mode: header.mode.clone(),
        concurrency: cfg.concurrency,
        warmup_s: cfg.warmup,
        duration_s: cfg.duration,
        repeats_requested: cfg.repeats,
        percentiles: cfg.percentiles.effective().iter().map(|p| p.value()).collect(),
        cpu_sample_interval_s: cfg.cpu_sample_interval.as_secs_f64(),
        timestamp_utc: utc_now(),
        environment,
        workload: Workload::default(),
        results,
        latency_ms,
        latency_truncated,
        cpu,
        repeats: docs,
        summary: SummaryDoc::from(&CrossRepeatSummary::default()),
        errors: Vec::new(),
        notes: Vec::new(),
    }
}

pub fn build_report(
    header: &ReportHeader,
    cfg: &RunConfig,
    environment: Environment,
    outcome: &RunOutcome,
) -> Report {
    let mut report = skeleton(header, cfg, environment, &outcome.repeats);
    report.summary = SummaryDoc::from(&outcome.summary);
    report.errors = error_entries(&merge_errors(&outcome.repeats));
    report.notes = outcome.notes.clone();
    report
}

/// Schema-valid report for a run that failed outside of any attempt.
pub fn build_internal_error_report(
    header: &ReportHeader,
    cfg: &RunConfig,
    environment: Environment,
    failure: &Failure,
) -> Report {
    let logical_cpus = environment.cpu_count;
    let repeats: Vec<RepeatResult> = (1..=cfg.repeats)
        .map(|index| RepeatResult::zeroed(index, cfg, logical_cpus))
        .collect();

    let mut report = skeleton(header, cfg, environment, &repeats);
    report.errors = error_entries(&HashMap::from([(failure.key(), 1)]));
    report.notes = vec![INTERNAL_ERROR_NOTE.to_string()];
    report
}

/// Runs every repeat and assembles the report.
///
/// Only pre-flight configuration errors are returned; anything that goes wrong once the run has
/// started, panics included, ends up in an internal-error report.
pub fn run_and_report<O: Operation>(
    header: &ReportHeader,
    cfg: &RunConfig,
    op: &O,
    cpu: &dyn CpuSource,
) -> Result<Report> {
    cfg.validate()?;
    let environment = Environment::detect();

    let failure = match catch_unwind(AssertUnwindSafe(|| run_repeats(cfg, op, cpu))) {
        Ok(Ok(outcome)) => return Ok(build_report(header, cfg, environment, &outcome)),
        Ok(Err(err)) => Failure::internal(err.to_string()),
        Err(payload) => Failure::from_panic(payload.as_ref()),
    };

    tracing::error!(kind = %failure.kind, "benchmark run failed: {}", failure.message);
    Ok(build_internal_error_report(header, cfg, environment, &failure))
}

/// Writes `json` to `path`, creating missing parent directories.
pub fn write_report(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{FailureKind, msg_hash};

    fn header() -> ReportHeader {
        ReportHeader {
            profile_path: "profiles/mock.yaml".to_string(),
            profile_name: "mock".to_string(),
            provider: "mock".to_string(),
            mode: "single".to_string(),
        }
    }

    fn key(kind: FailureKind, message: &str) -> ErrorKey {
        ErrorKey {
            kind,
            msg_hash: msg_hash(message),
        }
    }

    #[test]
    fn error_entries_sort_by_count_then_kind_then_hash() {
        let a = key(FailureKind::Rejected, "a");
        let b = key(FailureKind::Invocation, "b");
        let c = key(FailureKind::Invocation, "c");
        let errors = HashMap::from([(a, 2), (b.clone(), 5), (c.clone(), 2)]);

        let entries = error_entries(&errors);
        let order: Vec<(&str, u64)> = entries
            .iter()
            .map(|e| (e.kind.as_str(), e.count))
            .collect();
        assert_eq!(
            order,
            vec![("Invocation", 5), ("Invocation", 2), ("Rejected", 2)]
        );
        assert_eq!(entries[0].msg_hash, b.msg_hash);
        assert_eq!(entries[1].msg_hash, c.msg_hash);
    }

    #[test]
    fn equal_count_and_kind_sort_by_hash() {
        let x = key(FailureKind::Panic, "x");
        let y = key(FailureKind::Panic, "y");
        let errors = HashMap::from([(x.clone(), 1), (y.clone(), 1)]);

        let hashes: Vec<String> = error_entries(&errors)
            .into_iter()
            .map(|e| e.msg_hash)
            .collect();
        let mut expected = vec![x.msg_hash, y.msg_hash];
        expected.sort();
        assert_eq!(hashes, expected);
    }

    #[test]
    fn merge_sums_counts_across_repeats() {
        let cfg = RunConfig::default();
        let boom = key(FailureKind::Invocation, "boom");
        let mut a = RepeatResult::zeroed(1, &cfg, 1);
        a.errors.insert(boom.clone(), 2);
        let mut b = RepeatResult::zeroed(2, &cfg, 1);
        b.errors.insert(boom.clone(), 3);

        let merged = merge_errors([&a, &b]);
        assert_eq!(merged.get(&boom), Some(&5));
    }

    #[test]
    fn internal_error_report_keeps_shape() {
        let cfg = RunConfig {
            repeats: 3,
            ..RunConfig::default()
        };
        let failure = Failure::internal("sampler spawn failed");
        let report =
            build_internal_error_report(&header(), &cfg, Environment::detect(), &failure);

        assert_eq!(report.repeats.len(), 3);
        let indices: Vec<usize> = report.repeats.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(report.repeats.iter().all(|r| r.results.success_count == 0));
        assert_eq!(report.results.throughput_hs_per_sec, 0.0);
        assert_eq!(report.latency_ms.count, 0);
        assert_eq!(report.latency_ms.percentiles.get("p99"), Some(&None));
        assert_eq!(report.cpu.system_avg_percent, None);
        assert_eq!(
            report.errors,
            vec![ErrorEntry {
                kind: "Internal".to_string(),
                msg_hash: msg_hash("sampler spawn failed"),
                count: 1,
            }]
        );
        assert_eq!(report.notes, vec![INTERNAL_ERROR_NOTE.to_string()]);
    }

    #[test]
    fn json_keys_are_sorted_and_nulls_kept() {
        let cfg = RunConfig::default();
        let report = build_internal_error_report(
            &header(),
            &cfg,
            Environment::detect(),
            &Failure::internal("x"),
        );
        let json = match report.to_json_pretty() {
            Ok(v) => v,
            Err(err) => panic!("serialize failed: {err}"),
        };
        assert!(json.ends_with("}\n"));
        assert!(json.contains("\"system_avg_percent\": null"));

        let value: serde_json::Value = match serde_json::from_str(&json) {
            Ok(v) => v,
            Err(err) => panic!("parse failed: {err}"),
        };
        let Some(top) = value.as_object() else {
            panic!("report is not an object");
        };
        let keys: Vec<&String> = top.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let latency = &value["latency_ms"];
        for k in ["count", "p50", "p95", "p99", "max"] {
            assert!(latency.get(k).is_some(), "missing latency key {k}");
        }
        assert_eq!(value["errors"][0]["type"], "Internal");
    }

    #[test]
    fn whole_second_durations_serialize_as_integers() {
        let cfg = RunConfig {
            duration: Duration::from_secs(30),
            warmup: Duration::from_millis(250),
            ..RunConfig::default()
        };
        let report = build_internal_error_report(
            &header(),
            &cfg,
            Environment::detect(),
            &Failure::internal("x"),
        );
        let value = match serde_json::to_value(&report) {
            Ok(v) => v,
            Err(err) => panic!("serialize failed: {err}"),
        };
        assert_eq!(value["duration_s"], serde_json::json!(30));
        assert!(value["duration_s"].is_u64());
        assert_eq!(value["warmup_s"], serde_json::json!(0.25));
    }

    #[test]
    fn write_report_creates_parent_dirs() {
        let dir = match tempfile::tempdir() {
            Ok(v) => v,
            Err(err) => panic!("tempdir failed: {err}"),
        };
        let path = dir.path().join("nested").join("out").join("report.json");
        if let Err(err) = write_report(&path, "{}\n") {
            panic!("write failed: {err}");
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => assert_eq!(content, "{}\n"),
            Err(err) => panic!("read failed: {err}"),
        }
    }
}
