//! Render timers
//!
//! A [`RenderTimer`] produces ticks at display refresh rate and hands them
//! to exactly one subscriber, the render loop. The loop subscribes when its
//! first task is added and unsubscribes when the last one is removed, so an
//! idle loop costs no timer resources.

use crate::error::{CompositorError, CompositorResult};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Tick callback. Receives the time elapsed since the timer started.
pub type TickHandler = Arc<dyn Fn(Duration) + Send + Sync>;

/// Source of render ticks
pub trait RenderTimer: Send + Sync {
    /// Start delivering ticks to `handler`, replacing any previous handler
    fn subscribe(&self, handler: TickHandler) -> CompositorResult<()>;

    /// Stop delivering ticks
    fn unsubscribe(&self);

    /// Whether ticks arrive on a thread other than the mutation thread
    fn runs_in_background(&self) -> bool;
}

struct TimerThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Timer that ticks from a dedicated thread at a fixed interval
pub struct ThreadRenderTimer {
    interval: Duration,
    thread_name: String,
    running: Mutex<Option<TimerThread>>,
}

impl ThreadRenderTimer {
    /// Create a timer ticking every `interval`
    pub fn new(interval: Duration) -> Self {
        Self::with_thread_name(interval, "void-render-timer")
    }

    /// Create a timer for a target frame rate (0 = 60 fps)
    pub fn from_fps(fps: u32) -> Self {
        let fps = if fps > 0 { fps } else { 60 };
        Self::new(Duration::from_secs_f64(1.0 / fps as f64))
    }

    /// Create with a custom thread name
    pub fn with_thread_name(interval: Duration, thread_name: impl Into<String>) -> Self {
        Self {
            interval,
            thread_name: thread_name.into(),
            running: Mutex::new(None),
        }
    }

    /// The tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the tick thread is running
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Signal the tick thread to exit, optionally waiting for it
    ///
    /// Unsubscribing never joins: the caller may hold a lock that an
    /// in-flight tick is waiting on. The thread finishes its current tick
    /// and exits.
    fn stop_thread(thread: TimerThread, join: bool) {
        // Dropping the sender would also stop it, sending is just faster
        let _ = thread.stop.try_send(());
        if !join || thread.handle.thread().id() == thread::current().id() {
            return;
        }
        if thread.handle.join().is_err() {
            log::error!("Render timer thread panicked");
        }
    }
}

impl RenderTimer for ThreadRenderTimer {
    fn subscribe(&self, handler: TickHandler) -> CompositorResult<()> {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            Self::stop_thread(previous, false);
        }

        let (stop, stop_rx) = bounded::<()>(1);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let started = Instant::now();
                let mut next = started + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            handler(started.elapsed());
                            next += interval;
                            // Fell behind: skip the missed deadlines instead of bursting
                            let now = Instant::now();
                            if next < now {
                                next = now + interval;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Render timer thread stopped");
            })
            .map_err(|e| CompositorError::Timer(format!("failed to spawn timer thread: {e}")))?;

        log::debug!("Render timer started ({:?} interval)", interval);
        *running = Some(TimerThread { stop, handle });
        Ok(())
    }

    fn unsubscribe(&self) {
        let thread = self.running.lock().take();
        if let Some(thread) = thread {
            Self::stop_thread(thread, false);
        }
    }

    fn runs_in_background(&self) -> bool {
        true
    }
}

impl Drop for ThreadRenderTimer {
    fn drop(&mut self) {
        if let Some(thread) = self.running.get_mut().take() {
            Self::stop_thread(thread, true);
        }
    }
}

/// Timer that ticks only when [`fire`](Self::fire) is called
///
/// For hosts that already have a vsync source, and for tests.
#[derive(Default)]
pub struct ManualRenderTimer {
    handler: Mutex<Option<TickHandler>>,
    subscriptions: Mutex<u64>,
}

impl ManualRenderTimer {
    /// Create an unsubscribed timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick. Returns false if nobody is subscribed.
    pub fn fire(&self, elapsed: Duration) -> bool {
        // Clone out so the handler runs without holding the lock
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler(elapsed);
                true
            }
            None => false,
        }
    }

    /// Whether a handler is subscribed
    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Total number of subscribe calls
    pub fn subscription_count(&self) -> u64 {
        *self.subscriptions.lock()
    }
}

impl RenderTimer for ManualRenderTimer {
    fn subscribe(&self, handler: TickHandler) -> CompositorResult<()> {
        *self.handler.lock() = Some(handler);
        *self.subscriptions.lock() += 1;
        Ok(())
    }

    fn unsubscribe(&self) {
        self.handler.lock().take();
    }

    fn runs_in_background(&self) -> bool {
        false
    }
}
