use std::collections::HashMap;

use parking_lot::Mutex;

use crate::failure::{ErrorKey, Failure};

/// Retained latency samples per measurement phase.
pub const MAX_LATENCY_SAMPLES: usize = 2_000_000;

/// Counters and latency buffer for one measurement phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub latencies_ms: Vec<f64>,
    /// Set once the buffer is full and never cleared.
    pub latency_truncated: bool,
    pub errors: HashMap<ErrorKey, u64>,
}

impl PhaseMetrics {
    pub fn attempts(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    fn push_latency(&mut self, latency_ms: f64, capacity: usize) {
        if self.latencies_ms.len() < capacity {
            self.latencies_ms.push(latency_ms);
        } else {
            self.latency_truncated = true;
        }
    }
}

/// Shared store for all workers of one phase.
///
/// Every attempt takes the lock exactly once and increments exactly one of
/// `success_count`/`failure_count`.
#[derive(Debug)]
pub struct MetricsStore {
    capacity: usize,
    inner: Mutex<PhaseMetrics>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::with_capacity(MAX_LATENCY_SAMPLES)
    }
}

impl MetricsStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(PhaseMetrics::default()),
        }
    }

    pub fn record_success(&self, latency_ms: f64) {
        let mut m = self.inner.lock();
        m.push_latency(latency_ms, self.capacity);
        m.success_count = m.success_count.saturating_add(1);
    }

    /// `latency_ms` is `None` when the attempt failed before timing started.
    pub fn record_failure(&self, failure: &Failure, latency_ms: Option<f64>) {
        // Hash outside the critical section.
        let key = failure.key();

        let mut m = self.inner.lock();
        if let Some(latency_ms) = latency_ms {
            m.push_latency(latency_ms, self.capacity);
        }
        m.failure_count = m.failure_count.saturating_add(1);
        *m.errors.entry(key).or_insert(0) += 1;
    }

    /// Ends the phase, handing the accumulated metrics to the caller.
    pub fn into_inner(self) -> PhaseMetrics {
        self.inner.into_inner()
    }
}
