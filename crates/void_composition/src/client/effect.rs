//! Client-side shader effect
//!
//! A shader effect can be shared by visuals on several render targets. It
//! keeps one server resource per target through its [`ResourceHolder`] and
//! always ships a full snapshot: any change re-sends the descriptor with
//! every uniform value, the child shader names and the filter inputs.

use super::{ChangeTracker, CompositionRenderResource, Compositor, CompositorSerializable};
use crate::error::{CompositionError, CompositionResult};
use crate::holder::ResourceHolder;
use crate::server::{ResourceCell, ServerObject, ServerShaderEffect};
use crate::shader::{FilterInput, ShaderDescriptor, UniformKind, UniformValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use void_batch::BatchWriter;
use void_core::{ObjectId, TargetId, ThreadAffinity};

const SNAPSHOT: u64 = 1;

struct EffectState {
    descriptor: ShaderDescriptor,
    kinds: BTreeMap<String, UniformKind>,
    values: BTreeMap<String, UniformValue>,
    child_shader_names: Vec<String>,
    inputs: Vec<Option<FilterInput>>,
}

/// Shader effect applied to visuals
pub struct ShaderEffect {
    id: ObjectId,
    affinity: ThreadAffinity,
    weak_self: Weak<ShaderEffect>,
    holder: ResourceHolder,
    tracker: ChangeTracker,
    state: Mutex<EffectState>,
}

impl ShaderEffect {
    /// Create an effect from shader source, bound to the current thread
    pub fn new(source: impl Into<String>) -> Arc<Self> {
        let id = ObjectId::new();
        Arc::new_cyclic(|weak_self| Self {
            id,
            affinity: ThreadAffinity::current(),
            weak_self: weak_self.clone(),
            holder: ResourceHolder::new(id),
            tracker: ChangeTracker::new(SNAPSHOT),
            state: Mutex::new(EffectState {
                descriptor: ShaderDescriptor::new(source),
                kinds: BTreeMap::new(),
                values: BTreeMap::new(),
                child_shader_names: Vec::new(),
                inputs: Vec::new(),
            }),
        })
    }

    /// Object id
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Shader source
    pub fn source(&self) -> String {
        self.state.lock().descriptor.source.clone()
    }

    /// Replace the shader source; uniform declarations and values are kept
    pub fn set_source(&self, source: impl Into<String>) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::set_source")?;
        let source = source.into();
        {
            let mut state = self.state.lock();
            if state.descriptor.source == source {
                return Ok(());
            }
            state.descriptor.source = source;
        }
        self.invalidate();
        Ok(())
    }

    /// Reference count on `target`
    pub fn ref_count(&self, target: TargetId) -> u32 {
        self.holder.ref_count(target)
    }

    /// Declare a uniform; its value starts at zero
    ///
    /// Re-registering with a different kind resets the value.
    pub fn register_uniform(&self, name: impl Into<String>, kind: UniformKind) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::register_uniform")?;
        let name = name.into();
        {
            let mut state = self.state.lock();
            if state.kinds.insert(name.clone(), kind) == Some(kind) {
                return Ok(());
            }
            state.values.insert(name, UniformValue::zero(kind));
        }
        self.invalidate();
        Ok(())
    }

    /// Set a registered uniform
    pub fn set_uniform(&self, name: &str, value: UniformValue) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::set_uniform")?;
        {
            let mut state = self.state.lock();
            let expected = *state
                .kinds
                .get(name)
                .ok_or_else(|| CompositionError::UnknownUniform(name.to_string()))?;
            if value.kind() != expected {
                return Err(CompositionError::UniformKindMismatch {
                    name: name.to_string(),
                    expected,
                    found: value.kind(),
                });
            }
            if state.values.get(name) == Some(&value) {
                return Ok(());
            }
            state.values.insert(name.to_string(), value);
        }
        self.invalidate();
        Ok(())
    }

    /// Current value of a uniform
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.state.lock().values.get(name).copied()
    }

    /// Set the names of the child shader slots
    pub fn set_child_shader_names(&self, names: Vec<String>) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::set_child_shader_names")?;
        self.state.lock().child_shader_names = names;
        self.invalidate();
        Ok(())
    }

    /// Bind inputs to the child shader slots
    pub fn set_inputs(&self, inputs: Vec<Option<FilterInput>>) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::set_inputs")?;
        self.state.lock().inputs = inputs;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        self.tracker.mark(SNAPSHOT);
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        for compositor in self.holder.attached_compositors() {
            compositor.register_for_serialization(this.clone());
        }
    }
}

impl CompositorSerializable for ShaderEffect {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn try_get_server(&self, target: TargetId) -> Option<Arc<ResourceCell>> {
        self.holder.try_get_for_compositor(target)
    }

    fn serialize_changes(&self, target: TargetId, writer: &mut BatchWriter) -> CompositionResult<()> {
        let state = self.state.lock();
        // Uniform values go into a copy, the client descriptor keeps only the source
        let mut descriptor = state.descriptor.clone();
        descriptor.uniforms = state.values.clone();

        writer.write_serialized(&descriptor)?;
        writer.write_object(&state.child_shader_names);
        writer.write_serialized(&state.inputs)?;
        self.tracker.clear(target, SNAPSHOT);
        Ok(())
    }
}

impl CompositionRenderResource for ShaderEffect {
    fn add_ref_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<Arc<ResourceCell>> {
        self.affinity.verify_access("ShaderEffect::add_ref_on_compositor")?;
        let (cell, created) = self.holder.create_or_add_ref(compositor, |c| {
            Box::new(ServerObject::new(self.id, ServerShaderEffect::new(c.server_stats().clone())))
        });
        if created {
            self.tracker.attach(compositor.id());
            if let Some(this) = self.weak_self.upgrade() {
                compositor.register_for_serialization(this);
            }
        }
        Ok(cell)
    }

    fn release_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<()> {
        self.affinity.verify_access("ShaderEffect::release_on_compositor")?;
        if self.holder.release(compositor)? {
            self.tracker.detach(compositor.id());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShaderEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderEffect")
            .field("id", &self.id)
            .field("holder", &self.holder)
            .finish()
    }
}
