//! Render task for one composition target

use crate::client::Compositor;
use crate::frame::{Frame, SceneRenderer};
use crate::server::ServerCompositor;
use parking_lot::Mutex;
use std::sync::Arc;
use void_compositor::{RenderTask, RenderTaskError};
use void_core::{Clock, TargetId};

/// Drains a target's batches and renders its scene once per tick
///
/// Register with a [`RenderLoop`](void_compositor::RenderLoop). If draining
/// hits a corrupt batch the frame is skipped and counted in the target's
/// resource statistics; rendering resumes on the next tick.
pub struct CompositionTarget {
    name: String,
    server: Arc<ServerCompositor>,
    clock: Arc<dyn Clock>,
    renderer: Mutex<Box<dyn SceneRenderer>>,
    last_frame: Mutex<Option<Frame>>,
}

impl CompositionTarget {
    /// Create a task rendering `compositor`'s scene into `renderer`
    ///
    /// Uses the compositor's clock so animations are evaluated on the same
    /// timeline their commits were stamped on.
    pub fn new(name: impl Into<String>, compositor: &Compositor, renderer: Box<dyn SceneRenderer>) -> Arc<Self> {
        Self::from_parts(name, compositor.server().clone(), compositor.clock().clone(), renderer)
    }

    pub(crate) fn from_parts(
        name: impl Into<String>,
        server: Arc<ServerCompositor>,
        clock: Arc<dyn Clock>,
        renderer: Box<dyn SceneRenderer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            server,
            clock,
            renderer: Mutex::new(renderer),
            last_frame: Mutex::new(None),
        })
    }

    pub fn target(&self) -> TargetId {
        self.server.target()
    }

    pub fn server(&self) -> &Arc<ServerCompositor> {
        &self.server
    }

    /// The most recently rendered frame
    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame.lock().clone()
    }
}

impl RenderTask for CompositionTarget {
    fn render(&self) -> Result<(), RenderTaskError> {
        if let Err(e) = self.server.drain() {
            self.server.stats().frame_skipped();
            log::warn!("Skipping frame of '{}': {}", self.name, e);
            return Ok(());
        }

        let now = self.clock.now();
        let mut renderer = self.renderer.lock();
        let frame = self
            .server
            .render(now, &mut **renderer)
            .map_err(|e| RenderTaskError::from_error(format!("rendering '{}' failed", self.name), e))?;
        *self.last_frame.lock() = Some(frame);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CompositionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionTarget")
            .field("name", &self.name)
            .field("target", &self.target())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Visual;
    use crate::error::{CompositionError, CompositionResult};
    use crate::transport::{self, Batch};
    use void_batch::BatchWriter;
    use void_core::{ManualClock, Timestamp};

    struct Counting(Arc<Mutex<usize>>);

    impl SceneRenderer for Counting {
        fn render_frame(&mut self, _frame: &Frame) -> CompositionResult<()> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    struct Failing;

    impl SceneRenderer for Failing {
        fn render_frame(&mut self, _frame: &Frame) -> CompositionResult<()> {
            Err(CompositionError::Render("device lost".into()))
        }
    }

    #[test]
    fn test_render_drains_then_draws() {
        let clock = Arc::new(ManualClock::new());
        let compositor = Compositor::new(clock.clone());
        let frames = Arc::new(Mutex::new(0));
        let target = CompositionTarget::new("main", &compositor, Box::new(Counting(frames.clone())));

        let visual = Visual::new();
        compositor.set_root(Some(&visual)).unwrap();
        compositor.commit().unwrap();
        clock.set(Timestamp::from_millis(16));

        target.render().unwrap();
        assert_eq!(*frames.lock(), 1);
        let frame = target.last_frame().unwrap();
        assert_eq!(frame.time, Timestamp::from_millis(16));
        assert_eq!(frame.visuals.len(), 1);
        assert_eq!(target.name(), "main");
    }

    #[test]
    fn test_renderer_error_becomes_task_error() {
        let compositor = Compositor::new(Arc::new(ManualClock::new()));
        let target = CompositionTarget::new("broken", &compositor, Box::new(Failing));
        let err = target.render().unwrap_err();
        assert!(err.message().contains("broken"));
        assert!(target.last_frame().is_none());
    }

    #[test]
    fn test_corrupt_batch_skips_frame() {
        let (sender, receiver) = transport::channel();
        let server = Arc::new(ServerCompositor::new(TargetId::new(), receiver));
        let clock = Arc::new(ManualClock::new());
        clock.set(Timestamp::from_millis(16));
        let frames = Arc::new(Mutex::new(0));
        let target = CompositionTarget::from_parts(
            "main",
            server.clone(),
            clock.clone(),
            Box::new(Counting(frames.clone())),
        );

        target.render().unwrap();
        let before = target.last_frame().unwrap();

        // 99 is not a batch op
        let mut writer = BatchWriter::new();
        writer.write_object(&99u8);
        sender
            .send(Batch {
                sequence: 1,
                committed_at: Timestamp::from_millis(16),
                data: writer.finish(),
            })
            .unwrap();
        clock.set(Timestamp::from_millis(32));

        target.render().unwrap();
        assert_eq!(*frames.lock(), 1);
        assert_eq!(server.stats().snapshot().skipped_frames, 1);
        assert_eq!(target.last_frame(), Some(before));
    }
}
