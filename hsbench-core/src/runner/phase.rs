use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::Once;
use std::thread;
use std::time::Instant;

use crate::failure::Failure;

use super::error::{Error, Result};
use super::metrics::MetricsStore;
use super::operation::Operation;

/// Runs `concurrency` workers against `op` until `deadline`.
///
/// With `metrics == None` (warmup) outcomes are discarded. Returns once every worker has observed
/// the deadline and exited; an in-flight attempt always finishes first.
pub fn run_phase<O: Operation>(
    concurrency: usize,
    deadline: Instant,
    op: &O,
    metrics: Option<&MetricsStore>,
) -> Result<()> {
    if concurrency == 0 {
        return Err(Error::InvalidConcurrency);
    }

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(concurrency);
        let mut spawn_error = None;

        for worker in 0..concurrency {
            let spawned = thread::Builder::new()
                .name(format!("hsbench-worker-{worker}"))
                .spawn_scoped(scope, move || worker_loop(deadline, op, metrics));
            match spawned {
                Ok(h) => handles.push(h),
                Err(err) => {
                    spawn_error = Some(Error::Spawn(err));
                    break;
                }
            }
        }

        let mut first_panic = None;
        for h in handles {
            if let Err(payload) = h.join() {
                first_panic.get_or_insert_with(|| {
                    Error::WorkerPanicked(Failure::from_panic(payload.as_ref()).message)
                });
            }
        }

        match spawn_error.or(first_panic) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

fn worker_loop<O: Operation>(deadline: Instant, op: &O, metrics: Option<&MetricsStore>) {
    install_quiet_panic_hook();
    while Instant::now() < deadline {
        let outcome = attempt(op);
        let Some(metrics) = metrics else {
            continue;
        };
        match outcome {
            Attempt::Succeeded { latency_ms } => metrics.record_success(latency_ms),
            Attempt::Failed {
                failure,
                latency_ms,
            } => metrics.record_failure(&failure, latency_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Attempt {
    Succeeded {
        latency_ms: f64,
    },
    /// `latency_ms` is `None` when `prepare` failed.
    Failed {
        failure: Failure,
        latency_ms: Option<f64>,
    },
}

/// One attempt: construct, then time the invocation. Panics are contained here.
fn attempt<O: Operation>(op: &O) -> Attempt {
    let _quiet = QuietPanics::enter();

    let input = match catch_unwind(AssertUnwindSafe(|| op.prepare())) {
        Ok(Ok(input)) => input,
        Ok(Err(failure)) => {
            return Attempt::Failed {
                failure,
                latency_ms: None,
            };
        }
        Err(payload) => {
            return Attempt::Failed {
                failure: Failure::from_panic(payload.as_ref()),
                latency_ms: None,
            };
        }
    };

    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| op.execute(input)));
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let failure = match outcome {
        Ok(Ok(())) => return Attempt::Succeeded { latency_ms },
        Ok(Err(failure)) => failure,
        Err(payload) => Failure::from_panic(payload.as_ref()),
    };
    Attempt::Failed {
        failure,
        latency_ms: Some(latency_ms),
    }
}

thread_local! {
    static IN_ATTEMPT: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside an attempt until dropped.
struct QuietPanics;

impl QuietPanics {
    fn enter() -> Self {
        IN_ATTEMPT.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for QuietPanics {
    fn drop(&mut self) {
        IN_ATTEMPT.with(|flag| flag.set(false));
    }
}

/// Panics raised inside an attempt are recorded as failures, so they are logged at debug instead
/// of going through the default hook. Every other panic still reaches the previous hook.
fn install_quiet_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_ATTEMPT.with(Cell::get) {
                tracing::debug!(location = ?info.location(), "operation panicked");
            } else {
                previous(info);
            }
        }));
    });
}
