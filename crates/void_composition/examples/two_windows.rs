//! Two Windows Demo
//!
//! Two render targets share one blur effect. The main thread mutates the
//! scene and commits; a thread timer drives the render loop, which drains
//! each target and logs the frame it would draw.
//!
//! Run with:
//! ```
//! RUST_LOG=debug cargo run -p void_composition --example two_windows
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use void_composition::prelude::*;
use void_compositor::{CompositorConfig, RenderLoop};
use void_core::{Clock, SystemClock};

struct LogRenderer {
    name: &'static str,
}

impl SceneRenderer for LogRenderer {
    fn render_frame(&mut self, frame: &Frame) -> CompositionResult<()> {
        for visual in &frame.visuals {
            log::trace!(
                "[{}] {} at ({:.1}, {:.1}) opacity {:.2}{}",
                self.name,
                visual.id,
                visual.offset.x,
                visual.offset.y,
                visual.opacity,
                if visual.effect.is_some() { " +effect" } else { "" }
            );
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();

    println!("Two Windows Demo");
    println!("================\n");

    let config = CompositorConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let render_loop = RenderLoop::new(Arc::new(config.thread_timer()), &config);

    let left = Compositor::new(clock.clone());
    let right = Compositor::new(clock.clone());
    let left_target = CompositionTarget::new("left", &left, Box::new(LogRenderer { name: "left" }));
    let right_target = CompositionTarget::new("right", &right, Box::new(LogRenderer { name: "right" }));

    if let Err(e) = render_loop
        .add(left_target.clone())
        .and_then(|_| render_loop.add(right_target.clone()))
    {
        eprintln!("Failed to start render loop: {}", e);
        return;
    }

    if let Err(e) = run(&left, &right) {
        eprintln!("Scene error: {}", e);
    }

    for (name, compositor) in [("left", &left), ("right", &right)] {
        let stats = compositor.server_stats().snapshot();
        println!(
            "{}: {} created, {} disposed, {} live programs, {} batches",
            name, stats.created, stats.disposed, stats.live_shader_programs, stats.applied_batches
        );
    }
    let stats = render_loop.stats();
    println!(
        "Render loop: {} ticks, {} dropped, avg task {:?}",
        stats.ticks,
        stats.dropped_ticks,
        render_loop.timings().average()
    );
}

fn run(left: &Arc<Compositor>, right: &Arc<Compositor>) -> CompositionResult<()> {
    let blur = ShaderEffect::new("uniform float radius;");
    blur.register_uniform("radius", UniformKind::Float)?;

    let left_root = Visual::new();
    let right_root = Visual::new();
    for (root, compositor) in [(&left_root, left), (&right_root, right)] {
        root.set_size(Vector2::new(800.0, 600.0))?;
        root.set_effect(Some(blur.clone()))?;
        compositor.set_root(Some(root))?;
    }

    let card = Visual::new();
    card.set_size(Vector2::new(200.0, 120.0))?;
    card.set_offset(Vector2::new(40.0, 40.0))?;
    left_root.add_child(&card)?;

    let slide = Timeline::between(
        Vector2::new(40.0, 40.0),
        Vector2::new(560.0, 40.0),
        Duration::from_millis(500),
        Some(Easing::CubicInOut),
    )?;
    card.start_animation(AnimatedProperty::Offset, slide)?;
    commit(left, right)?;

    for step in 1..=5 {
        thread::sleep(Duration::from_millis(100));
        blur.set_uniform("radius", UniformValue::Float(step as f32 * 2.0))?;
        commit(left, right)?;
    }

    // Drop the effect from the left window only
    left_root.set_effect(None)?;
    commit(left, right)?;
    thread::sleep(Duration::from_millis(100));
    Ok(())
}

fn commit(left: &Compositor, right: &Compositor) -> CompositionResult<()> {
    left.commit()?;
    right.commit()?;
    Ok(())
}
