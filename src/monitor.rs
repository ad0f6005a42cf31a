//! Progress and memory monitoring with cooperative cancellation.
//!
//! The [`Monitor`] is consulted at page boundaries only: after each page
//! has been written it samples process memory, compares it with the
//! ceiling, checks the job deadline and reports [`Progress`]. A triggered
//! limit sets the shared [`CancellationToken`], which the dispatcher polls
//! before handing out the next page.

use crate::config::ExtractionConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Why a job was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled through the token by the caller
    Requested,
    /// Resident memory exceeded the ceiling
    MemoryCeiling {
        /// Sampled resident bytes
        usage: u64,
        /// Configured ceiling
        ceiling: u64,
    },
    /// The wall-clock budget ran out
    Timeout {
        /// Configured budget
        budget: Duration,
    },
    /// Another stage failed and the job is shutting down
    Aborted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::MemoryCeiling { usage, ceiling } => {
                write!(f, "memory usage {} bytes exceeds ceiling of {} bytes", usage, ceiling)
            },
            CancelReason::Timeout { budget } => write!(f, "time budget of {:?} exhausted", budget),
            CancelReason::Aborted => write!(f, "job aborted"),
        }
    }
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: OnceLock<CancelReason>,
}

/// Shared cancellation flag. Clones observe the same flag; the first
/// reason recorded wins.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` when this call set the reason.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.state.reason.set(reason).is_ok();
        self.state.cancelled.store(true, Ordering::Release);
        first
    }

    /// Cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// The winning reason, once cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        self.state.reason.get().cloned()
    }
}

/// Source of resident memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Current resident bytes, when available.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Resident set size of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    #[cfg(target_os = "linux")]
    fn resident_bytes(&self) -> Option<u64> {
        // Second field of statm is the resident page count.
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        Some(pages * page_size as u64)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_bytes(&self) -> Option<u64> {
        None
    }
}

/// Snapshot reported after every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Pages written so far
    pub pages_completed: usize,
    /// Pages selected for the job
    pub pages_total: usize,
    /// Time since the job started
    pub elapsed: Duration,
    /// Last memory sample
    pub memory_bytes: Option<u64>,
}

impl Progress {
    /// Completed share in `[0, 1]`; 1 for an empty job.
    pub fn fraction(&self) -> f64 {
        if self.pages_total == 0 {
            1.0
        } else {
            self.pages_completed as f64 / self.pages_total as f64
        }
    }
}

/// Receives progress after every page.
pub trait ProgressObserver {
    /// Called once per written page.
    fn on_progress(&self, progress: &Progress);
}

impl<F: Fn(&Progress)> ProgressObserver for F {
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Page-boundary monitor for one job.
pub struct Monitor {
    token: CancellationToken,
    probe: Box<dyn MemoryProbe>,
    ceiling: Option<u64>,
    sample_interval: Duration,
    budget: Option<Duration>,
    started: Instant,
    last_sample: Option<(Instant, Option<u64>)>,
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("ceiling", &self.ceiling)
            .field("sample_interval", &self.sample_interval)
            .field("budget", &self.budget)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// Monitor without limits, sampling the process at every page.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            probe: Box::new(ProcessMemory),
            ceiling: None,
            sample_interval: Duration::ZERO,
            budget: None,
            started: Instant::now(),
            last_sample: None,
            observers: Vec::new(),
        }
    }

    /// Monitor with the ceiling, sampling interval and budget of `config`.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let mut monitor = Self::new().with_sample_interval(Duration::from_millis(config.sample_interval_ms));
        if let Some(ceiling) = config.memory_ceiling_bytes {
            monitor = monitor.with_memory_ceiling(ceiling);
        }
        if let Some(ms) = config.timeout_ms {
            monitor = monitor.with_timeout(Duration::from_millis(ms));
        }
        monitor
    }

    /// Use a different memory source.
    pub fn with_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Cancel once resident memory exceeds `bytes`.
    pub fn with_memory_ceiling(mut self, bytes: u64) -> Self {
        self.ceiling = Some(bytes);
        self
    }

    /// Minimum time between memory samples.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Whole-job wall-clock budget.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Share an existing token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Register an observer.
    pub fn add_observer(&mut self, observer: impl ProgressObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Restart the job clock.
    pub fn start(&mut self) {
        self.started = Instant::now();
        self.last_sample = None;
    }

    /// Point in time at which the budget runs out.
    pub fn deadline(&self) -> Option<Instant> {
        self.budget.map(|b| self.started + b)
    }

    /// Configured wall-clock budget.
    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Time since [`start`](Self::start).
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Cancel when the budget has run out. Returns `true` once cancelled
    /// for any reason.
    pub fn check_deadline(&self) -> bool {
        if let Some(budget) = self.budget {
            if !self.token.is_cancelled() && self.elapsed() >= budget {
                log::warn!("Time budget of {:?} exhausted", budget);
                self.token.cancel(CancelReason::Timeout { budget });
            }
        }
        self.token.is_cancelled()
    }

    fn sample(&mut self) -> Option<u64> {
        let now = Instant::now();
        if let Some((at, bytes)) = self.last_sample {
            if now.duration_since(at) < self.sample_interval {
                return bytes;
            }
        }
        let bytes = self.probe.resident_bytes();
        self.last_sample = Some((now, bytes));
        bytes
    }

    /// Record a written page: sample memory, enforce the ceiling and the
    /// budget, and notify observers.
    pub fn page_completed(&mut self, pages_completed: usize, pages_total: usize) -> Progress {
        let memory_bytes = self.sample();
        if let (Some(usage), Some(ceiling)) = (memory_bytes, self.ceiling) {
            if usage > ceiling && !self.token.is_cancelled() {
                log::warn!(
                    "Memory ceiling exceeded after {} pages: {} > {} bytes",
                    pages_completed,
                    usage,
                    ceiling
                );
                self.token.cancel(CancelReason::MemoryCeiling { usage, ceiling });
            }
        }
        self.check_deadline();

        let progress = Progress {
            pages_completed,
            pages_total,
            elapsed: self.elapsed(),
            memory_bytes,
        };
        for observer in &self.observers {
            observer.on_progress(&progress);
        }
        progress
    }
}
