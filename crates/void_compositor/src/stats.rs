//! Render loop statistics
//!
//! Counters are plain atomics so the tick path never takes a lock for
//! bookkeeping. Task timings keep a bounded history for average and
//! percentile queries.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of render loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderLoopStats {
    /// Ticks that ran their tasks
    pub ticks: u64,
    /// Ticks dropped because the previous tick was still running
    pub dropped_ticks: u64,
    /// Task render steps executed
    pub task_runs: u64,
    /// Task render steps that returned an error or panicked
    pub task_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    ticks: AtomicU64,
    dropped_ticks: AtomicU64,
    task_runs: AtomicU64,
    task_failures: AtomicU64,
}

impl LoopCounters {
    pub(crate) fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn dropped_tick(&self) -> u64 {
        self.dropped_ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn task_run(&self) {
        self.task_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failure(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RenderLoopStats {
        RenderLoopStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            dropped_ticks: self.dropped_ticks.load(Ordering::Relaxed),
            task_runs: self.task_runs.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
        }
    }
}

/// Rolling window of task step durations
#[derive(Debug)]
pub struct TaskTimings {
    samples: Mutex<VecDeque<Duration>>,
    max_history: usize,
}

impl TaskTimings {
    /// Create with a maximum history size
    pub fn new(max_history: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history: max_history.max(1),
        }
    }

    /// Record one task step
    pub fn record(&self, duration: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.max_history {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    /// Number of recorded samples
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Check if no samples were recorded
    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Average step duration
    pub fn average(&self) -> Duration {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = samples.iter().sum();
        total / samples.len() as u32
    }

    /// Step duration at a percentile (0-100)
    pub fn percentile(&self, percentile: f64) -> Duration {
        let mut sorted: Vec<_> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return Duration::ZERO;
        }
        sorted.sort();

        let index = ((percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64) as usize;
        sorted[index.min(sorted.len() - 1)]
    }

    /// Forget all samples
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl Default for TaskTimings {
    fn default() -> Self {
        Self::new(120)
    }
}
