use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sysinfo::{CpuRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use super::error::{Error, Result};

/// How long a stopped sampler may take to hand back its samples.
pub const SAMPLER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// One sampling tick. Either side may be missing if the host could not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTick {
    pub system_percent: Option<f64>,
    pub process_percent: Option<f64>,
}

pub trait CpuProbe: Send {
    fn sample(&mut self) -> CpuTick;
}

/// Host CPU capability. `open` returns `None` when periodic sampling is not supported.
pub trait CpuSource: Send + Sync {
    fn open(&self) -> Option<Box<dyn CpuProbe>>;

    fn load_average(&self) -> Option<LoadAverage>;

    fn logical_cpus(&self) -> usize;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSamples {
    pub system_percent: Vec<f64>,
    pub process_percent: Vec<f64>,
}

impl CpuSamples {
    fn push(&mut self, tick: CpuTick) {
        if let Some(v) = tick.system_percent.filter(|v| v.is_finite()) {
            self.system_percent.push(v);
        }
        if let Some(v) = tick.process_percent.filter(|v| v.is_finite()) {
            self.process_percent.push(v);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerExit {
    Joined(CpuSamples),
    /// The sampler did not hand back its samples within the join timeout.
    TimedOut,
    /// The sampler thread died without reporting.
    Lost,
}

/// Background sampling loop for one measurement phase.
#[derive(Debug)]
pub struct CpuSampler {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    done: Receiver<CpuSamples>,
}

impl CpuSampler {
    /// Starts sampling if `source` supports it. `Ok(None)` means the capability is unavailable.
    pub fn start(source: &dyn CpuSource, interval: Duration) -> Result<Option<Self>> {
        let Some(mut probe) = source.open() else {
            return Ok(None);
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_sampler = Arc::clone(&stop);
        let (tx, done) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("hsbench-cpu-sampler".to_string())
            .spawn(move || {
                let mut samples = CpuSamples::default();
                let mut next_tick = Instant::now() + interval;
                loop {
                    if stop_sampler.load(Ordering::Acquire) {
                        break;
                    }
                    let now = Instant::now();
                    if now < next_tick {
                        // Wakes early on `unpark`; spurious wakeups just loop.
                        thread::park_timeout(next_tick - now);
                        continue;
                    }
                    samples.push(probe.sample());
                    next_tick += interval;
                    if next_tick < now {
                        next_tick = now + interval;
                    }
                }
                let _ = tx.send(samples);
            })
            .map_err(Error::Spawn)?;

        Ok(Some(Self { stop, handle, done }))
    }

    /// Signals the sampler and waits up to `timeout` for its samples.
    pub fn stop(self, timeout: Duration) -> SamplerExit {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();

        match self.done.recv_timeout(timeout) {
            Ok(samples) => {
                let _ = self.handle.join();
                SamplerExit::Joined(samples)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "cpu sampler did not stop in time; detaching"
                );
                SamplerExit::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("cpu sampler exited without reporting samples");
                SamplerExit::Lost
            }
        }
    }
}

/// Host CPU instrumentation backed by `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoCpu;

impl CpuSource for SysinfoCpu {
    fn open(&self) -> Option<Box<dyn CpuProbe>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        let pid = sysinfo::get_current_pid().ok()?;
        Some(Box::new(SysinfoProbe::new(pid)))
    }

    fn load_average(&self) -> Option<LoadAverage> {
        if cfg!(windows) || !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        let avg = System::load_average();
        let load = LoadAverage {
            one: avg.one,
            five: avg.five,
            fifteen: avg.fifteen,
        };
        let values = [load.one, load.five, load.fifteen];
        let sane = values.iter().all(|v| v.is_finite() && *v >= 0.0);
        // Unsupported hosts report zeros rather than failing.
        (sane && values.iter().any(|v| *v > 0.0)).then_some(load)
    }

    fn logical_cpus(&self) -> usize {
        logical_cpu_count()
    }
}

pub fn logical_cpu_count() -> usize {
    thread::available_parallelism().map_or(0, |n| n.get())
}

struct SysinfoProbe {
    sys: System,
    pid: Pid,
}

impl SysinfoProbe {
    fn new(pid: Pid) -> Self {
        let refresh = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
        let mut sys = System::new_with_specifics(refresh);

        // Usage is computed from deltas, so the first refresh only establishes a baseline.
        sys.refresh_cpu_usage();
        Self::refresh_process(&mut sys, pid);

        Self { sys, pid }
    }

    fn refresh_process(sys: &mut System, pid: Pid) {
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );
    }
}

impl CpuProbe for SysinfoProbe {
    fn sample(&mut self) -> CpuTick {
        self.sys.refresh_cpu_usage();
        Self::refresh_process(&mut self.sys, self.pid);

        CpuTick {
            system_percent: Some(f64::from(self.sys.global_cpu_usage())),
            process_percent: self.sys.process(self.pid).map(|p| f64::from(p.cpu_usage())),
        }
    }
}
