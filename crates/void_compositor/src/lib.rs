//! # Void Compositor
//!
//! Render loop and frame timing for the Void composition engine.
//!
//! A [`RenderLoop`] owns a set of [`RenderTask`]s (usually one per
//! composition target) and runs them on every tick of a [`RenderTimer`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  UI thread: add/remove tasks                 │
//! ├──────────────────────────────────────────────┤
//! │  RenderLoop (this crate)                     │
//! │  ├─ Non-overlapping ticks, dropped if busy   │
//! │  ├─ Per-tick task snapshot                   │
//! │  └─ Failure and panic isolation per task     │
//! ├──────────────────────────────────────────────┤
//! │  RenderTimer (thread timer, or host vsync)   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod render_loop;
pub mod stats;
pub mod timer;

pub use error::{CompositorError, CompositorResult, RenderTaskError};
pub use render_loop::{RenderLoop, RenderTask};
pub use stats::{RenderLoopStats, TaskTimings};
pub use timer::{ManualRenderTimer, RenderTimer, ThreadRenderTimer, TickHandler};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Compositor configuration
///
/// Usually loaded from the `[compositor]` table of a TOML file:
///
/// ```toml
/// [compositor]
/// target_fps = 120
/// slow_task_threshold_ms = 8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Tick rate of the default thread timer (0 = 60)
    pub target_fps: u32,
    /// Task steps slower than this are logged as warnings
    pub slow_task_threshold_ms: u64,
    /// Log a timing summary every N ticks (0 = never)
    pub report_interval_ticks: u64,
    /// Number of task step durations kept for statistics
    pub timing_history: usize,
    /// Name of the timer thread
    pub timer_thread_name: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            slow_task_threshold_ms: 16,
            report_interval_ticks: 600,
            timing_history: 120,
            timer_thread_name: "void-render-timer".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compositor: CompositorConfig,
}

impl CompositorConfig {
    /// Parse from TOML text containing a `[compositor]` table
    pub fn from_toml_str(text: &str) -> CompositorResult<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        file.compositor.validated()
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> CompositorResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading compositor config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    fn validated(self) -> CompositorResult<Self> {
        if self.target_fps > 1000 {
            return Err(CompositorError::Config(format!(
                "target_fps must be at most 1000, got {}",
                self.target_fps
            )));
        }
        if self.timing_history == 0 {
            return Err(CompositorError::Config("timing_history must be positive".into()));
        }
        Ok(self)
    }

    /// Interval between ticks at `target_fps`
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.target_fps > 0 { self.target_fps } else { 60 };
        Duration::from_secs_f64(1.0 / fps as f64)
    }

    /// Threshold for slow task warnings
    pub fn slow_task_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_task_threshold_ms)
    }

    /// Build the default thread timer for this configuration
    pub fn thread_timer(&self) -> ThreadRenderTimer {
        ThreadRenderTimer::with_thread_name(self.frame_interval(), self.timer_thread_name.clone())
    }
}
