//! Render loop
//!
//! Drives every registered [`RenderTask`] once per timer tick. The loop is
//! subscribed to its [`RenderTimer`] only while it has at least one task.
//!
//! Ticks never overlap: if a tick arrives while the previous one is still
//! running it is dropped and counted, not queued. Tasks run against a
//! snapshot of the task list taken at the start of the tick, so adding or
//! removing tasks from inside a task takes effect on the next tick.

use crate::error::{CompositorResult, RenderTaskError};
use crate::stats::{LoopCounters, RenderLoopStats, TaskTimings};
use crate::timer::RenderTimer;
use crate::CompositorConfig;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use void_core::ThreadAffinity;

/// Work performed once per render tick
pub trait RenderTask: Send + Sync {
    /// Produce this task's frame
    fn render(&self) -> Result<(), RenderTaskError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "render task"
    }
}

struct LoopInner {
    tasks: Mutex<Vec<Arc<dyn RenderTask>>>,
    /// Reused per-tick snapshot of `tasks`
    scratch: Mutex<Vec<Arc<dyn RenderTask>>>,
    in_tick: AtomicBool,
    counters: LoopCounters,
    timings: TaskTimings,
    slow_task_threshold: Duration,
    report_interval_ticks: u64,
}

/// Clears the in-tick flag when the tick ends, including by unwinding
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LoopInner {
    fn tick(&self, elapsed: Duration) {
        if self
            .in_tick
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let dropped = self.counters.dropped_tick();
            log::trace!("Render tick at {:?} dropped, previous tick still running ({} dropped)", elapsed, dropped);
            return;
        }
        let _guard = TickGuard(&self.in_tick);
        let tick = self.counters.tick();

        let mut snapshot = self.scratch.lock();
        snapshot.clear();
        snapshot.extend(self.tasks.lock().iter().cloned());

        for task in snapshot.iter() {
            self.run_task(task.as_ref());
        }
        snapshot.clear();

        if self.report_interval_ticks > 0 && tick % self.report_interval_ticks == 0 {
            log::debug!(
                "Render loop: {} ticks, avg task {:?}, p95 {:?}, {} dropped",
                tick,
                self.timings.average(),
                self.timings.percentile(95.0),
                self.counters.snapshot().dropped_ticks,
            );
        }
    }

    fn run_task(&self, task: &dyn RenderTask) {
        let started = Instant::now();
        self.counters.task_run();

        let result = panic::catch_unwind(AssertUnwindSafe(|| task.render()));
        let duration = started.elapsed();
        self.timings.record(duration);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.counters.task_failure();
                log::error!("Render task '{}' failed: {}", task.name(), e);
            }
            Err(payload) => {
                self.counters.task_failure();
                log::error!("Render task '{}' panicked: {}", task.name(), panic_message(&*payload));
            }
        }

        if duration > self.slow_task_threshold {
            log::warn!("Render task '{}' took {:?}", task.name(), duration);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn same_task(a: &Arc<dyn RenderTask>, b: &Arc<dyn RenderTask>) -> bool {
    // Compare data pointers only, vtables may be duplicated across codegen units
    std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
}

/// Runs render tasks on timer ticks
///
/// Tasks are added and removed from the thread that created the loop.
/// Ticks may arrive on any thread.
pub struct RenderLoop {
    inner: Arc<LoopInner>,
    timer: Arc<dyn RenderTimer>,
    affinity: ThreadAffinity,
}

impl RenderLoop {
    /// Create a loop bound to the current thread
    pub fn new(timer: Arc<dyn RenderTimer>, config: &CompositorConfig) -> Self {
        Self::with_affinity(timer, config, ThreadAffinity::current())
    }

    /// Create a loop whose mutation thread is `affinity`
    pub fn with_affinity(
        timer: Arc<dyn RenderTimer>,
        config: &CompositorConfig,
        affinity: ThreadAffinity,
    ) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                tasks: Mutex::new(Vec::new()),
                scratch: Mutex::new(Vec::new()),
                in_tick: AtomicBool::new(false),
                counters: LoopCounters::default(),
                timings: TaskTimings::new(config.timing_history),
                slow_task_threshold: config.slow_task_threshold(),
                report_interval_ticks: config.report_interval_ticks,
            }),
            timer,
            affinity,
        }
    }

    /// Register a task. The first task subscribes the loop to its timer.
    ///
    /// Adding a task that is already registered has no effect.
    pub fn add(&self, task: Arc<dyn RenderTask>) -> CompositorResult<()> {
        self.affinity.verify_access("RenderLoop::add")?;

        let mut tasks = self.inner.tasks.lock();
        if tasks.iter().any(|t| same_task(t, &task)) {
            log::debug!("Render task '{}' is already registered", task.name());
            return Ok(());
        }
        log::debug!("Adding render task '{}'", task.name());
        tasks.push(task);
        if tasks.len() == 1 {
            let inner: Weak<LoopInner> = Arc::downgrade(&self.inner);
            let subscribed = self.timer.subscribe(Arc::new(move |elapsed| {
                if let Some(inner) = inner.upgrade() {
                    inner.tick(elapsed);
                }
            }));
            if let Err(e) = subscribed {
                tasks.pop();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Unregister a task. Returns false if it was not registered.
    ///
    /// Removing the last task unsubscribes the loop from its timer.
    pub fn remove(&self, task: &Arc<dyn RenderTask>) -> CompositorResult<bool> {
        self.affinity.verify_access("RenderLoop::remove")?;

        let mut tasks = self.inner.tasks.lock();
        let Some(index) = tasks.iter().position(|t| same_task(t, task)) else {
            return Ok(false);
        };
        let removed = tasks.remove(index);
        log::debug!("Removed render task '{}'", removed.name());
        if tasks.is_empty() {
            self.timer.unsubscribe();
        }
        Ok(true)
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Whether a tick is executing right now
    pub fn is_in_tick(&self) -> bool {
        self.inner.in_tick.load(Ordering::Acquire)
    }

    /// Whether ticks arrive on a background thread
    pub fn runs_in_background(&self) -> bool {
        self.timer.runs_in_background()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RenderLoopStats {
        self.inner.counters.snapshot()
    }

    /// Recent task step durations
    pub fn timings(&self) -> &TaskTimings {
        &self.inner.timings
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if !self.inner.tasks.lock().is_empty() {
            self.timer.unsubscribe();
        }
    }
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("tasks", &self.task_count())
            .field("in_tick", &self.is_in_tick())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualRenderTimer;
    use std::sync::atomic::AtomicU32;

    struct Counting(AtomicU32);

    impl RenderTask for Counting {
        fn render(&self) -> Result<(), RenderTaskError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_same_task_identity() {
        let a: Arc<dyn RenderTask> = Arc::new(Counting(AtomicU32::new(0)));
        let b: Arc<dyn RenderTask> = Arc::new(Counting(AtomicU32::new(0)));
        assert!(same_task(&a, &a.clone()));
        assert!(!same_task(&a, &b));
    }

    #[test]
    fn test_remove_unknown_task() {
        let timer = Arc::new(ManualRenderTimer::new());
        let render_loop = RenderLoop::new(timer.clone(), &CompositorConfig::default());
        let task: Arc<dyn RenderTask> = Arc::new(Counting(AtomicU32::new(0)));

        assert!(!render_loop.remove(&task).unwrap());
        assert!(!timer.is_subscribed());
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 1");
    }
}
