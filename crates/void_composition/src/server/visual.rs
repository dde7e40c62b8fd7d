//! Server side of visuals

use super::{ResourceCell, ResourceKind};
use crate::animation::{AnimatedProperty, Timeline};
use crate::geometry::Vector2;
use crate::transport::VisualSlot;
use std::sync::Arc;
use void_batch::{BatchReader, BatchResult, CorruptStreamError};
use void_core::Timestamp;

/// An animation running on the render thread
#[derive(Debug, Clone)]
struct RunningAnimation {
    timeline: Timeline,
    started_at: Timestamp,
}

/// One decoded slot update
#[derive(Debug)]
pub enum VisualChange {
    Opacity(f64),
    Offset(Vector2),
    Size(Vector2),
    IsVisible(bool),
    Effect(Option<Arc<ResourceCell>>),
    Children(Vec<Arc<ResourceCell>>),
    Animation(AnimatedProperty, Option<Timeline>),
}

/// Property values of a visual at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualState {
    pub opacity: f64,
    pub offset: Vector2,
    pub size: Vector2,
    pub is_visible: bool,
}

impl Default for VisualState {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            offset: Vector2::ZERO,
            size: Vector2::ZERO,
            is_visible: true,
        }
    }
}

/// Render-thread state of a visual
#[derive(Debug, Default)]
pub struct ServerVisual {
    base: VisualState,
    effect: Option<Arc<ResourceCell>>,
    children: Vec<Arc<ResourceCell>>,
    opacity_animation: Option<RunningAnimation>,
    offset_animation: Option<RunningAnimation>,
}

impl ServerVisual {
    /// Create with default property values
    pub fn new() -> Self {
        Self::default()
    }

    /// Property values without running animations
    pub fn base(&self) -> VisualState {
        self.base
    }

    /// Effect resource on this target
    pub fn effect(&self) -> Option<&Arc<ResourceCell>> {
        self.effect.as_ref()
    }

    /// Child visual resources in draw order
    pub fn children(&self) -> &[Arc<ResourceCell>] {
        &self.children
    }

    /// Whether an animation is running on `property`
    pub fn is_animating(&self, property: AnimatedProperty) -> bool {
        match property {
            AnimatedProperty::Opacity => self.opacity_animation.is_some(),
            AnimatedProperty::Offset => self.offset_animation.is_some(),
        }
    }

    /// Property values at `now`
    ///
    /// Completed animations are folded into the base values and dropped.
    pub fn advance(&mut self, now: Timestamp) -> VisualState {
        let mut state = self.base;

        if let Some(running) = &self.opacity_animation {
            let evaluation = running.timeline.evaluate(now - running.started_at);
            if let Some(opacity) = evaluation.value.as_scalar() {
                state.opacity = opacity;
            }
            if evaluation.completed {
                self.base.opacity = state.opacity;
                self.opacity_animation = None;
            }
        }

        if let Some(running) = &self.offset_animation {
            let evaluation = running.timeline.evaluate(now - running.started_at);
            if let Some(offset) = evaluation.value.as_vector2() {
                state.offset = offset;
            }
            if evaluation.completed {
                self.base.offset = state.offset;
                self.offset_animation = None;
            }
        }

        state
    }

    fn decode_animation(
        reader: &mut BatchReader<'_>,
        property: AnimatedProperty,
    ) -> BatchResult<Option<Timeline>> {
        let offset = reader.position();
        let timeline: Option<Timeline> = reader.read_serialized()?;
        match &timeline {
            Some(t) if t.value_kind() != property.value_kind() => Err(CorruptStreamError::Invalid {
                offset,
                message: format!("{:?} timeline for {}", t.value_kind(), property.name()),
            }),
            _ => Ok(timeline),
        }
    }
}

impl ResourceKind for ServerVisual {
    type Changes = Vec<VisualChange>;

    fn decode(&self, reader: &mut BatchReader<'_>) -> BatchResult<Vec<VisualChange>> {
        let count = reader.read_object::<u32>()? as usize;
        let mut changes = Vec::with_capacity(count.min(VisualSlot::ALL.len()));

        for _ in 0..count {
            let offset = reader.position();
            let byte = reader.read_object::<u8>()?;
            let slot = VisualSlot::from_byte(byte).ok_or_else(|| CorruptStreamError::Invalid {
                offset,
                message: format!("unknown visual slot {byte}"),
            })?;

            let change = match slot {
                VisualSlot::Opacity => VisualChange::Opacity(reader.read_object()?),
                VisualSlot::Offset => VisualChange::Offset(reader.read_object()?),
                VisualSlot::Size => VisualChange::Size(reader.read_object()?),
                VisualSlot::IsVisible => VisualChange::IsVisible(reader.read_object()?),
                VisualSlot::Effect => {
                    let effect = if reader.read_object::<bool>()? {
                        Some(reader.read_ref::<ResourceCell>()?)
                    } else {
                        None
                    };
                    VisualChange::Effect(effect)
                }
                VisualSlot::Children => {
                    let count = reader.read_object::<u32>()? as usize;
                    let children = (0..count)
                        .map(|_| reader.read_ref::<ResourceCell>())
                        .collect::<BatchResult<Vec<_>>>()?;
                    VisualChange::Children(children)
                }
                VisualSlot::OpacityAnimation => VisualChange::Animation(
                    AnimatedProperty::Opacity,
                    Self::decode_animation(reader, AnimatedProperty::Opacity)?,
                ),
                VisualSlot::OffsetAnimation => VisualChange::Animation(
                    AnimatedProperty::Offset,
                    Self::decode_animation(reader, AnimatedProperty::Offset)?,
                ),
            };
            changes.push(change);
        }
        Ok(changes)
    }

    fn apply(&mut self, changes: Vec<VisualChange>, committed_at: Timestamp) {
        for change in changes {
            match change {
                VisualChange::Opacity(opacity) => self.base.opacity = opacity,
                VisualChange::Offset(offset) => self.base.offset = offset,
                VisualChange::Size(size) => self.base.size = size,
                VisualChange::IsVisible(visible) => self.base.is_visible = visible,
                VisualChange::Effect(effect) => self.effect = effect,
                VisualChange::Children(children) => self.children = children,
                VisualChange::Animation(property, timeline) => {
                    // A new timeline replaces the running one outright
                    let running = timeline.map(|timeline| RunningAnimation {
                        timeline,
                        started_at: committed_at,
                    });
                    match property {
                        AnimatedProperty::Opacity => self.opacity_animation = running,
                        AnimatedProperty::Offset => self.offset_animation = running,
                    }
                }
            }
        }
    }

    fn release(&mut self) {
        self.effect = None;
        self.children.clear();
        self.opacity_animation = None;
        self.offset_animation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{IterationCount, Keyframe};
    use crate::server::{ServerObject, ServerResource};
    use std::time::Duration;
    use void_batch::BatchWriter;
    use void_core::ObjectId;

    fn fade(duration_ms: u64) -> Timeline {
        Timeline::between(1.0, 0.0, Duration::from_millis(duration_ms), None).unwrap()
    }

    fn apply(visual: &mut ServerObject<ServerVisual>, at: Timestamp, write: impl FnOnce(&mut BatchWriter)) {
        let mut writer = BatchWriter::new();
        write(&mut writer);
        let data = writer.finish();
        visual.deserialize_changes(&mut BatchReader::new(&data), at).unwrap();
    }

    #[test]
    fn test_slot_updates() {
        let mut visual = ServerObject::new(ObjectId::new(), ServerVisual::new());
        apply(&mut visual, Timestamp::ZERO, |w| {
            w.write_object(&3u32);
            w.write_object(&(VisualSlot::Opacity as u8));
            w.write_object(&0.5f64);
            w.write_object(&(VisualSlot::Offset as u8));
            w.write_object(&Vector2::new(4.0, 8.0));
            w.write_object(&(VisualSlot::IsVisible as u8));
            w.write_object(&false);
        });

        let base = visual.current().base();
        assert_eq!(base.opacity, 0.5);
        assert_eq!(base.offset, Vector2::new(4.0, 8.0));
        assert!(!base.is_visible);
        assert_eq!(base.size, Vector2::ZERO);
    }

    #[test]
    fn test_animation_runs_from_commit_time_and_folds() {
        let mut visual = ServerObject::new(ObjectId::new(), ServerVisual::new());
        let committed = Timestamp::from_millis(1000);
        apply(&mut visual, committed, |w| {
            w.write_object(&1u32);
            w.write_object(&(VisualSlot::OpacityAnimation as u8));
            w.write_serialized(&Some(fade(100))).unwrap();
        });

        let kind = visual.try_current_mut().unwrap();
        assert_eq!(kind.advance(Timestamp::from_millis(1050)).opacity, 0.5);
        assert!(kind.is_animating(AnimatedProperty::Opacity));

        assert_eq!(kind.advance(Timestamp::from_millis(1200)).opacity, 0.0);
        assert!(!kind.is_animating(AnimatedProperty::Opacity));
        assert_eq!(kind.base().opacity, 0.0);
    }

    #[test]
    fn test_new_animation_replaces_running_one() {
        let mut visual = ServerObject::new(ObjectId::new(), ServerVisual::new());
        apply(&mut visual, Timestamp::ZERO, |w| {
            w.write_object(&1u32);
            w.write_object(&(VisualSlot::OpacityAnimation as u8));
            w.write_serialized(&Some(fade(100))).unwrap();
        });

        let pulse = Timeline::new(
            vec![Keyframe::new(0.0, 0.2), Keyframe::new(1.0, 0.4)],
            Duration::from_millis(100),
            IterationCount::Forever,
        )
        .unwrap();
        apply(&mut visual, Timestamp::from_millis(40), |w| {
            w.write_object(&1u32);
            w.write_object(&(VisualSlot::OpacityAnimation as u8));
            w.write_serialized(&Some(pulse)).unwrap();
        });

        let kind = visual.try_current_mut().unwrap();
        let opacity = kind.advance(Timestamp::from_millis(90)).opacity;
        assert!((opacity - 0.3).abs() < 1e-9);
        assert!(kind.is_animating(AnimatedProperty::Opacity));
    }

    #[test]
    fn test_wrong_timeline_kind_rejected() {
        let mut visual = ServerObject::new(ObjectId::new(), ServerVisual::new());
        let mut writer = BatchWriter::new();
        writer.write_object(&1u32);
        writer.write_object(&(VisualSlot::OffsetAnimation as u8));
        writer.write_serialized(&Some(fade(100))).unwrap();
        let data = writer.finish();

        assert!(visual
            .deserialize_changes(&mut BatchReader::new(&data), Timestamp::ZERO)
            .is_err());
        assert!(!visual.current().is_animating(AnimatedProperty::Offset));
    }

    #[test]
    fn test_unknown_slot_rejected() {
        let mut visual = ServerObject::new(ObjectId::new(), ServerVisual::new());
        let mut writer = BatchWriter::new();
        writer.write_object(&2u32);
        writer.write_object(&(VisualSlot::Opacity as u8));
        writer.write_object(&0.25f64);
        writer.write_object(&42u8);
        let data = writer.finish();

        assert!(visual
            .deserialize_changes(&mut BatchReader::new(&data), Timestamp::ZERO)
            .is_err());
        // Opacity from the same block was not applied either
        assert_eq!(visual.current().base().opacity, 1.0);
    }
}
