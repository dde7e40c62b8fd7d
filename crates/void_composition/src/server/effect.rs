//! Server side of shader effects

use super::{Disposable, ResourceKind, ResourceStats};
use crate::shader::{FilterInput, ShaderDescriptor, UniformValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use void_batch::{BatchReader, BatchResult};
use void_core::Timestamp;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// A built shader program
///
/// Stands in for the GPU object a backend would create from the
/// descriptor. Live programs are counted per target so leaks show up in
/// [`ResourceStats`].
pub struct ShaderProgram {
    id: u64,
    descriptor: ShaderDescriptor,
    stats: Arc<ResourceStats>,
    disposed: bool,
}

impl ShaderProgram {
    /// Build a program from a descriptor
    pub fn build(descriptor: ShaderDescriptor, stats: Arc<ResourceStats>) -> Self {
        let id = NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed);
        stats.program_created();
        log::trace!("Built shader program {} ({} uniforms)", id, descriptor.uniforms.len());
        Self {
            id,
            descriptor,
            stats,
            disposed: false,
        }
    }

    /// Process-unique program id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shader source
    pub fn source(&self) -> &str {
        &self.descriptor.source
    }

    /// Uniform values baked into this program
    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.descriptor.uniforms
    }

    /// Whether [`dispose`](Disposable::dispose) ran
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Disposable for ShaderProgram {
    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.stats.program_disposed();
            log::trace!("Disposed shader program {}", self.id);
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Decoded shader effect change block (always a full snapshot)
#[derive(Debug)]
pub struct ShaderEffectChanges {
    descriptor: ShaderDescriptor,
    child_shader_names: Vec<String>,
    inputs: Vec<Option<FilterInput>>,
}

/// Render-thread state of a shader effect
pub struct ServerShaderEffect {
    program: Option<ShaderProgram>,
    child_shader_names: Vec<String>,
    inputs: Vec<Option<FilterInput>>,
    stats: Arc<ResourceStats>,
}

impl ServerShaderEffect {
    /// Create with no program
    pub fn new(stats: Arc<ResourceStats>) -> Self {
        Self {
            program: None,
            child_shader_names: Vec::new(),
            inputs: Vec::new(),
            stats,
        }
    }

    /// Current program
    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    /// Names of the child shader slots
    pub fn child_shader_names(&self) -> &[String] {
        &self.child_shader_names
    }

    /// Inputs bound to the child shader slots
    pub fn inputs(&self) -> &[Option<FilterInput>] {
        &self.inputs
    }
}

impl ResourceKind for ServerShaderEffect {
    type Changes = ShaderEffectChanges;

    fn decode(&self, reader: &mut BatchReader<'_>) -> BatchResult<ShaderEffectChanges> {
        Ok(ShaderEffectChanges {
            descriptor: reader.read_serialized()?,
            child_shader_names: reader.read_object()?,
            inputs: reader.read_serialized()?,
        })
    }

    fn apply(&mut self, changes: ShaderEffectChanges, _committed_at: Timestamp) {
        // Old program goes before the new one is built
        if let Some(mut old) = self.program.take() {
            old.dispose();
        }
        self.program = Some(ShaderProgram::build(changes.descriptor, self.stats.clone()));
        self.child_shader_names = changes.child_shader_names;
        self.inputs = changes.inputs;
    }

    fn release(&mut self) {
        if let Some(mut program) = self.program.take() {
            program.dispose();
        }
        self.child_shader_names.clear();
        self.inputs.clear();
    }
}
