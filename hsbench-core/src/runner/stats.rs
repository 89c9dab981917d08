use std::time::Duration;

use super::cpu::{CpuSamples, LoadAverage};
use super::percentiles::PercentileSet;

/// Welford accumulator for mean/sample-stdev/max.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        self.n = self.n.saturating_add(1);
        let n_f = self.n as f64;

        let delta = x - self.mean;
        self.mean += delta / n_f;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;

        if self.n == 1 || x > self.max {
            self.max = x;
        }
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then_some(self.mean)
    }

    /// Sample standard deviation; undefined below two observations.
    pub fn stdev(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        Some((self.m2 / (self.n as f64 - 1.0)).sqrt())
    }

    pub fn max(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max)
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = Self::default();
        for x in iter {
            s.push(x);
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    /// `(key, value)` in effective percentile order; values are milliseconds.
    pub percentiles: Vec<(String, Option<f64>)>,
    pub max: Option<f64>,
}

impl LatencySummary {
    pub fn empty(set: &PercentileSet) -> Self {
        Self {
            count: 0,
            percentiles: set.effective().iter().map(|p| (p.key(), None)).collect(),
            max: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| *v)
    }

    pub fn p50(&self) -> Option<f64> {
        self.get("p50")
    }

    pub fn p95(&self) -> Option<f64> {
        self.get("p95")
    }

    pub fn p99(&self) -> Option<f64> {
        self.get("p99")
    }
}

/// Summarizes a phase's latency samples. Sorts in place.
pub fn summarize_latencies(mut samples: Vec<f64>, set: &PercentileSet) -> LatencySummary {
    samples.retain(|v| v.is_finite());
    if samples.is_empty() {
        return LatencySummary::empty(set);
    }

    samples.sort_unstable_by(f64::total_cmp);

    let percentiles = set
        .effective()
        .iter()
        .map(|p| (p.key(), percentile_sorted(&samples, p.quantile())))
        .collect();

    LatencySummary {
        count: samples.len() as u64,
        percentiles,
        max: samples.last().copied(),
    }
}

/// Linear interpolation between the order statistics bracketing rank `q * (n - 1)`.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let q = q.clamp(0.0, 1.0);

    let position = (last as f64) * q;
    let lower = (position.floor() as usize).min(last);
    let upper = (lower + 1).min(last);
    let weight = position - lower as f64;

    let lo = sorted[lower];
    let hi = sorted[upper];
    Some((lo + (hi - lo) * weight).clamp(lo, hi))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CpuUsage {
    Available {
        system_avg: Option<f64>,
        system_peak: Option<f64>,
        process_avg: Option<f64>,
        process_peak: Option<f64>,
        sample_count: usize,
    },
    /// The host could not sample CPU utilization for this phase.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuSummary {
    pub usage: CpuUsage,
    pub sample_interval: Duration,
    /// Captured once at phase end, independently of the sampler.
    pub load_average: Option<LoadAverage>,
    pub logical_cpus: usize,
}

impl CpuSummary {
    pub fn unavailable(
        sample_interval: Duration,
        load_average: Option<LoadAverage>,
        logical_cpus: usize,
    ) -> Self {
        Self {
            usage: CpuUsage::Unavailable,
            sample_interval,
            load_average,
            logical_cpus,
        }
    }
}

/// `samples == None` means the sampler never ran for this phase.
pub fn summarize_cpu(
    samples: Option<&CpuSamples>,
    sample_interval: Duration,
    load_average: Option<LoadAverage>,
    logical_cpus: usize,
) -> CpuSummary {
    let Some(samples) = samples else {
        return CpuSummary::unavailable(sample_interval, load_average, logical_cpus);
    };

    let system: RunningStats = samples.system_percent.iter().copied().collect();
    let process: RunningStats = samples.process_percent.iter().copied().collect();

    CpuSummary {
        usage: CpuUsage::Available {
            system_avg: system.mean(),
            system_peak: system.max(),
            process_avg: process.mean(),
            process_peak: process.max(),
            sample_count: samples.system_percent.len(),
        },
        sample_interval,
        load_average,
        logical_cpus,
    }
}
