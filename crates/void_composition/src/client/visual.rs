//! Client-side visual tree node

use super::{ChangeTracker, CompositionRenderResource, Compositor, CompositorSerializable, ShaderEffect};
use crate::animation::{AnimatedProperty, Timeline};
use crate::error::{CompositionError, CompositionResult};
use crate::geometry::Vector2;
use crate::holder::ResourceHolder;
use crate::server::{ResourceCell, ServerObject, ServerVisual};
use crate::transport::VisualSlot;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use void_batch::BatchWriter;
use void_core::{ObjectId, TargetId, ThreadAffinity};

struct VisualProps {
    opacity: f64,
    offset: Vector2,
    size: Vector2,
    is_visible: bool,
    effect: Option<Arc<ShaderEffect>>,
    children: Vec<Arc<Visual>>,
    parent: Weak<Visual>,
    opacity_animation: Option<Timeline>,
    offset_animation: Option<Timeline>,
}

impl Default for VisualProps {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            offset: Vector2::ZERO,
            size: Vector2::ZERO,
            is_visible: true,
            effect: None,
            children: Vec::new(),
            parent: Weak::new(),
            opacity_animation: None,
            offset_animation: None,
        }
    }
}

/// A node of the visual tree
///
/// Property setters record the new value and mark the slot dirty on every
/// render target the visual is attached to. A visual is attached to a
/// target while it is that target's root or a descendant of an attached
/// visual; attaching recurses into its effect and children.
pub struct Visual {
    id: ObjectId,
    affinity: ThreadAffinity,
    weak_self: Weak<Visual>,
    holder: ResourceHolder,
    tracker: ChangeTracker,
    props: Mutex<VisualProps>,
}

impl Visual {
    /// Create a visual bound to the current thread
    pub fn new() -> Arc<Self> {
        let id = ObjectId::new();
        Arc::new_cyclic(|weak_self| Self {
            id,
            affinity: ThreadAffinity::current(),
            weak_self: weak_self.clone(),
            holder: ResourceHolder::new(id),
            tracker: ChangeTracker::new(VisualSlot::ALL_MASK),
            props: Mutex::new(VisualProps::default()),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Reference count on `target`
    pub fn ref_count(&self, target: TargetId) -> u32 {
        self.holder.ref_count(target)
    }

    pub fn opacity(&self) -> f64 {
        self.props.lock().opacity
    }

    pub fn offset(&self) -> Vector2 {
        self.props.lock().offset
    }

    pub fn size(&self) -> Vector2 {
        self.props.lock().size
    }

    pub fn is_visible(&self) -> bool {
        self.props.lock().is_visible
    }

    pub fn effect(&self) -> Option<Arc<ShaderEffect>> {
        self.props.lock().effect.clone()
    }

    /// Children in draw order
    pub fn children(&self) -> Vec<Arc<Visual>> {
        self.props.lock().children.clone()
    }

    pub fn parent(&self) -> Option<Arc<Visual>> {
        self.props.lock().parent.upgrade()
    }

    /// Whether a client-side animation is set on `property`
    ///
    /// This stays true after the render thread finished the animation; it
    /// is cleared by [`stop_animation`](Self::stop_animation) or by setting
    /// the property.
    pub fn is_animating(&self, property: AnimatedProperty) -> bool {
        let props = self.props.lock();
        match property {
            AnimatedProperty::Opacity => props.opacity_animation.is_some(),
            AnimatedProperty::Offset => props.offset_animation.is_some(),
        }
    }

    /// Set opacity, cancelling a running opacity animation
    pub fn set_opacity(&self, opacity: f64) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::set_opacity")?;
        let mut bits = VisualSlot::Opacity.bit();
        {
            let mut props = self.props.lock();
            props.opacity = opacity;
            if props.opacity_animation.take().is_some() {
                bits |= VisualSlot::OpacityAnimation.bit();
            }
        }
        self.invalidate(bits);
        Ok(())
    }

    /// Set offset relative to the parent, cancelling a running offset animation
    pub fn set_offset(&self, offset: Vector2) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::set_offset")?;
        let mut bits = VisualSlot::Offset.bit();
        {
            let mut props = self.props.lock();
            props.offset = offset;
            if props.offset_animation.take().is_some() {
                bits |= VisualSlot::OffsetAnimation.bit();
            }
        }
        self.invalidate(bits);
        Ok(())
    }

    pub fn set_size(&self, size: Vector2) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::set_size")?;
        self.props.lock().size = size;
        self.invalidate(VisualSlot::Size.bit());
        Ok(())
    }

    /// Show or hide this visual and its subtree
    pub fn set_visible(&self, visible: bool) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::set_visible")?;
        self.props.lock().is_visible = visible;
        self.invalidate(VisualSlot::IsVisible.bit());
        Ok(())
    }

    /// Replace the effect
    ///
    /// The new effect is attached to every target of this visual before the
    /// old one is released.
    pub fn set_effect(&self, effect: Option<Arc<ShaderEffect>>) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::set_effect")?;
        let previous = {
            let mut props = self.props.lock();
            let same = match (&props.effect, &effect) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return Ok(());
            }
            std::mem::replace(&mut props.effect, effect.clone())
        };

        for compositor in self.holder.attached_compositors() {
            if let Some(effect) = &effect {
                effect.add_ref_on_compositor(&compositor)?;
            }
            if let Some(previous) = &previous {
                previous.release_on_compositor(&compositor)?;
            }
        }
        self.invalidate(VisualSlot::Effect.bit());
        Ok(())
    }

    /// Append `child` to the children
    ///
    /// Fails if `child` already has a parent or is this visual or one of
    /// its ancestors.
    pub fn add_child(&self, child: &Arc<Visual>) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::add_child")?;
        if child.id == self.id {
            return Err(CompositionError::VisualTree(format!("{} cannot be its own child", self.id)));
        }
        if let Some(parent) = child.parent() {
            return Err(CompositionError::VisualTree(format!(
                "{} already has parent {}",
                child.id, parent.id
            )));
        }
        let mut ancestor = self.parent();
        while let Some(visual) = ancestor {
            if visual.id == child.id {
                return Err(CompositionError::VisualTree(format!(
                    "adding {} under {} would create a cycle",
                    child.id, self.id
                )));
            }
            ancestor = visual.parent();
        }

        child.props.lock().parent = self.weak_self.clone();
        self.props.lock().children.push(child.clone());

        for compositor in self.holder.attached_compositors() {
            child.add_ref_on_compositor(&compositor)?;
        }
        self.invalidate(VisualSlot::Children.bit());
        Ok(())
    }

    /// Remove `child`; returns false if it was not a child of this visual
    pub fn remove_child(&self, child: &Arc<Visual>) -> CompositionResult<bool> {
        self.affinity.verify_access("Visual::remove_child")?;
        {
            let mut props = self.props.lock();
            let Some(index) = props.children.iter().position(|c| Arc::ptr_eq(c, child)) else {
                return Ok(false);
            };
            props.children.remove(index);
        }
        child.props.lock().parent = Weak::new();

        for compositor in self.holder.attached_compositors() {
            child.release_on_compositor(&compositor)?;
        }
        self.invalidate(VisualSlot::Children.bit());
        Ok(true)
    }

    /// Run `timeline` on `property`, replacing any running animation
    ///
    /// The animation starts on each target at the time of the commit that
    /// carries it.
    pub fn start_animation(&self, property: AnimatedProperty, timeline: Timeline) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::start_animation")?;
        if timeline.value_kind() != property.value_kind() {
            return Err(CompositionError::AnimationType {
                property: property.name(),
                expected: property.value_kind(),
                found: timeline.value_kind(),
            });
        }

        let bit = {
            let mut props = self.props.lock();
            match property {
                AnimatedProperty::Opacity => {
                    props.opacity_animation = Some(timeline);
                    VisualSlot::OpacityAnimation.bit()
                }
                AnimatedProperty::Offset => {
                    props.offset_animation = Some(timeline);
                    VisualSlot::OffsetAnimation.bit()
                }
            }
        };
        log::trace!("Starting {} animation on {}", property.name(), self.id);
        self.invalidate(bit);
        Ok(())
    }

    /// Stop the animation on `property` and restore the last set value
    pub fn stop_animation(&self, property: AnimatedProperty) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::stop_animation")?;
        let stopped = {
            let mut props = self.props.lock();
            match property {
                AnimatedProperty::Opacity => props.opacity_animation.take().is_some(),
                AnimatedProperty::Offset => props.offset_animation.take().is_some(),
            }
        };
        if stopped {
            let bits = match property {
                AnimatedProperty::Opacity => VisualSlot::Opacity.bit() | VisualSlot::OpacityAnimation.bit(),
                AnimatedProperty::Offset => VisualSlot::Offset.bit() | VisualSlot::OffsetAnimation.bit(),
            };
            self.invalidate(bits);
        }
        Ok(())
    }

    fn invalidate(&self, bits: u64) {
        self.tracker.mark(bits);
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        for compositor in self.holder.attached_compositors() {
            compositor.register_for_serialization(this.clone());
        }
    }
}

impl CompositorSerializable for Visual {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn try_get_server(&self, target: TargetId) -> Option<Arc<ResourceCell>> {
        self.holder.try_get_for_compositor(target)
    }

    fn serialize_changes(&self, target: TargetId, writer: &mut BatchWriter) -> CompositionResult<()> {
        let mask = self.tracker.pending(target);
        let props = self.props.lock();
        let slots: Vec<VisualSlot> = VisualSlot::ALL
            .into_iter()
            .filter(|slot| mask & slot.bit() != 0)
            .collect();

        writer.write_object(&(slots.len() as u32));
        for slot in slots {
            writer.write_object(&(slot as u8));
            match slot {
                VisualSlot::Opacity => writer.write_object(&props.opacity),
                VisualSlot::Offset => writer.write_object(&props.offset),
                VisualSlot::Size => writer.write_object(&props.size),
                VisualSlot::IsVisible => writer.write_object(&props.is_visible),
                VisualSlot::Effect => {
                    let cell = match &props.effect {
                        Some(effect) => Some(
                            effect
                                .try_get_server(target)
                                .ok_or(CompositionError::ResourceDisposed(effect.id()))?,
                        ),
                        None => None,
                    };
                    writer.write_object(&cell.is_some());
                    if let Some(cell) = cell {
                        writer.write_ref(cell);
                    }
                }
                VisualSlot::Children => {
                    writer.write_object(&(props.children.len() as u32));
                    for child in &props.children {
                        let cell = child
                            .try_get_server(target)
                            .ok_or(CompositionError::ResourceDisposed(child.id))?;
                        writer.write_ref(cell);
                    }
                }
                VisualSlot::OpacityAnimation => writer.write_serialized(&props.opacity_animation)?,
                VisualSlot::OffsetAnimation => writer.write_serialized(&props.offset_animation)?,
            }
        }

        self.tracker.clear(target, mask);
        Ok(())
    }
}

impl CompositionRenderResource for Visual {
    fn add_ref_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<Arc<ResourceCell>> {
        self.affinity.verify_access("Visual::add_ref_on_compositor")?;
        let (cell, created) = self
            .holder
            .create_or_add_ref(compositor, |_| Box::new(ServerObject::new(self.id, ServerVisual::new())));
        if !created {
            return Ok(cell);
        }

        self.tracker.attach(compositor.id());
        if let Some(this) = self.weak_self.upgrade() {
            compositor.register_for_serialization(this);
        }

        let (effect, children) = {
            let props = self.props.lock();
            (props.effect.clone(), props.children.clone())
        };
        if let Some(effect) = effect {
            effect.add_ref_on_compositor(compositor)?;
        }
        for child in children {
            child.add_ref_on_compositor(compositor)?;
        }
        Ok(cell)
    }

    fn release_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<()> {
        self.affinity.verify_access("Visual::release_on_compositor")?;
        if !self.holder.release(compositor)? {
            return Ok(());
        }

        self.tracker.detach(compositor.id());
        let (effect, children) = {
            let props = self.props.lock();
            (props.effect.clone(), props.children.clone())
        };
        if let Some(effect) = effect {
            effect.release_on_compositor(compositor)?;
        }
        for child in children {
            child.release_on_compositor(compositor)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Visual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visual")
            .field("id", &self.id)
            .field("holder", &self.holder)
            .finish()
    }
}
