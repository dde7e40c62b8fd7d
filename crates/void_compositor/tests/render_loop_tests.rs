//! Render loop behavior under a manually fired timer

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use void_compositor::*;

fn manual_loop() -> (Arc<ManualRenderTimer>, Arc<RenderLoop>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let timer = Arc::new(ManualRenderTimer::new());
    let render_loop = Arc::new(RenderLoop::new(timer.clone(), &CompositorConfig::default()));
    (timer, render_loop)
}

/// Appends its label to a shared log
struct Recording {
    label: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl RenderTask for Recording {
    fn render(&self) -> Result<(), RenderTaskError> {
        self.log.lock().push(self.label);
        Ok(())
    }

    fn name(&self) -> &str {
        self.label
    }
}

fn recording(label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn RenderTask> {
    Arc::new(Recording { label, log: log.clone() })
}

struct FnTask<F>(F);

impl<F: Fn() -> Result<(), RenderTaskError> + Send + Sync> RenderTask for FnTask<F> {
    fn render(&self) -> Result<(), RenderTaskError> {
        (self.0)()
    }
}

#[test]
fn test_tasks_run_in_insertion_order() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));

    render_loop.add(recording("a", &log)).unwrap();
    render_loop.add(recording("b", &log)).unwrap();
    render_loop.add(recording("c", &log)).unwrap();

    assert!(timer.fire(Duration::from_millis(16)));
    assert!(timer.fire(Duration::from_millis(32)));
    assert_eq!(*log.lock(), vec!["a", "b", "c", "a", "b", "c"]);
    assert_eq!(render_loop.stats().ticks, 2);
    assert_eq!(render_loop.stats().task_runs, 6);
}

#[test]
fn test_timer_subscription_follows_task_count() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));
    assert!(!timer.is_subscribed());

    let a = recording("a", &log);
    let b = recording("b", &log);
    render_loop.add(a.clone()).unwrap();
    render_loop.add(b.clone()).unwrap();
    assert!(timer.is_subscribed());
    assert_eq!(timer.subscription_count(), 1);

    assert!(render_loop.remove(&a).unwrap());
    assert!(timer.is_subscribed());
    assert!(render_loop.remove(&b).unwrap());
    assert!(!timer.is_subscribed());

    // Removing again is a no-op
    assert!(!render_loop.remove(&b).unwrap());

    render_loop.add(a).unwrap();
    assert!(timer.is_subscribed());
    assert_eq!(timer.subscription_count(), 2);
}

#[test]
fn test_adding_registered_task_again_is_ignored() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = recording("a", &log);

    render_loop.add(a.clone()).unwrap();
    render_loop.add(a.clone()).unwrap();
    assert_eq!(render_loop.task_count(), 1);

    timer.fire(Duration::from_millis(16));
    assert_eq!(*log.lock(), vec!["a"]);

    // One removal is enough to unregister it
    assert!(render_loop.remove(&a).unwrap());
    assert!(!timer.is_subscribed());
}

#[test]
fn test_dropping_loop_unsubscribes_timer() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));
    render_loop.add(recording("a", &log)).unwrap();
    assert!(timer.is_subscribed());

    drop(render_loop);
    assert!(!timer.is_subscribed());
    assert!(!timer.fire(Duration::from_millis(16)));
}

#[test]
fn test_reentrant_tick_is_dropped() {
    let (timer, render_loop) = manual_loop();
    let runs = Arc::new(AtomicU32::new(0));
    let observed_in_tick = Arc::new(AtomicU32::new(0));

    let task: Arc<dyn RenderTask> = {
        let timer = timer.clone();
        let runs = runs.clone();
        let observed = observed_in_tick.clone();
        let weak_loop = Arc::downgrade(&render_loop);
        Arc::new(FnTask(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            // Nested tick while this one is running
            timer.fire(Duration::ZERO);
            if weak_loop.upgrade().map_or(false, |l| l.is_in_tick()) {
                observed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }))
    };
    render_loop.add(task).unwrap();

    timer.fire(Duration::from_millis(16));

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    // The dropped tick did not clear the flag of the running one
    assert_eq!(observed_in_tick.load(Ordering::SeqCst), 1);
    assert!(!render_loop.is_in_tick());
    assert_eq!(render_loop.stats().dropped_ticks, 1);
    assert_eq!(render_loop.stats().ticks, 1);
}

#[test]
fn test_overlapping_tick_from_another_thread_is_dropped() {
    let (timer, render_loop) = manual_loop();
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

    let task: Arc<dyn RenderTask> = Arc::new(FnTask(move || {
        let _ = started_tx.try_send(());
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
        Ok(())
    }));
    render_loop.add(task).unwrap();

    let ticking = {
        let timer = timer.clone();
        thread::spawn(move || timer.fire(Duration::from_millis(16)))
    };
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(render_loop.is_in_tick());

    // Returns immediately instead of waiting for the running tick
    assert!(timer.fire(Duration::from_millis(32)));
    assert_eq!(render_loop.stats().dropped_ticks, 1);

    release_tx.send(()).unwrap();
    assert!(ticking.join().unwrap());
    assert!(!render_loop.is_in_tick());
    assert_eq!(render_loop.stats().ticks, 1);
}

#[test]
fn test_failing_and_panicking_tasks_are_isolated() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));

    render_loop
        .add(Arc::new(FnTask(|| Err(RenderTaskError::new("device lost")))))
        .unwrap();
    render_loop.add(Arc::new(FnTask(|| panic!("task exploded")))).unwrap();
    render_loop.add(recording("after", &log)).unwrap();

    timer.fire(Duration::from_millis(16));
    assert!(!render_loop.is_in_tick());
    timer.fire(Duration::from_millis(32));

    assert_eq!(*log.lock(), vec!["after", "after"]);
    let stats = render_loop.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.task_failures, 4);
}

#[test]
fn test_changes_during_tick_apply_next_tick() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));
    let second = recording("second", &log);
    let late = recording("late", &log);

    let first: Arc<dyn RenderTask> = {
        let log = log.clone();
        let weak_loop = Arc::downgrade(&render_loop);
        let second = second.clone();
        let late = late.clone();
        let done = AtomicU32::new(0);
        Arc::new(FnTask(move || {
            log.lock().push("first");
            if done.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(render_loop) = weak_loop.upgrade() {
                    render_loop.remove(&second).map_err(|e| RenderTaskError::from_error("remove", e))?;
                    render_loop.add(late.clone()).map_err(|e| RenderTaskError::from_error("add", e))?;
                }
            }
            Ok(())
        }))
    };
    render_loop.add(first).unwrap();
    render_loop.add(second).unwrap();

    // Removed task still runs this tick; the added one waits for the next
    timer.fire(Duration::from_millis(16));
    assert_eq!(*log.lock(), vec!["first", "second"]);

    timer.fire(Duration::from_millis(32));
    assert_eq!(*log.lock(), vec!["first", "second", "first", "late"]);
}

#[test]
fn test_mutation_from_other_thread_is_rejected() {
    let (timer, render_loop) = manual_loop();
    let log = Arc::new(Mutex::new(Vec::new()));
    let task = recording("a", &log);

    let result = {
        let render_loop = render_loop.clone();
        let task = task.clone();
        thread::spawn(move || render_loop.add(task)).join().unwrap()
    };
    assert!(matches!(result, Err(CompositorError::AccessViolation(_))));
    assert_eq!(render_loop.task_count(), 0);
    assert!(!timer.is_subscribed());
}

#[test]
fn test_thread_timer_drives_loop() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = CompositorConfig::from_toml_str("[compositor]\ntarget_fps = 500").unwrap();
    let timer: Arc<dyn RenderTimer> = Arc::new(config.thread_timer());
    let render_loop = RenderLoop::new(timer, &config);
    assert!(render_loop.runs_in_background());

    let (tx, rx) = crossbeam_channel::unbounded();
    let task: Arc<dyn RenderTask> = Arc::new(FnTask(move || {
        let _ = tx.send(());
        Ok(())
    }));
    render_loop.add(task.clone()).unwrap();
    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert!(render_loop.remove(&task).unwrap());
    assert!(render_loop.stats().ticks >= 3);
}
