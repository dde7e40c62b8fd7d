//! Mutation-thread composition objects
//!
//! Client objects hold the authoritative property values. Every change
//! marks dirty slots for each attached target and registers the object
//! with that target's [`Compositor`]; the next [`Compositor::commit`]
//! serializes the dirty slots into a batch for the render thread.

pub mod compositor;
pub mod effect;
pub mod visual;

pub use compositor::Compositor;
pub use effect::ShaderEffect;
pub use visual::Visual;

use crate::error::CompositionResult;
use crate::server::ResourceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use void_batch::BatchWriter;
use void_core::{ObjectId, TargetId};

/// Object that writes its changes into batches
pub trait CompositorSerializable: Send + Sync {
    /// Stable object id
    fn object_id(&self) -> ObjectId;

    /// Server resource on `target`, if attached there
    fn try_get_server(&self, target: TargetId) -> Option<Arc<ResourceCell>>;

    /// Write pending changes for `target` into a change block
    ///
    /// Pending changes are only cleared once writing succeeded.
    fn serialize_changes(&self, target: TargetId, writer: &mut BatchWriter) -> CompositionResult<()>;
}

/// Object whose server resource is reference counted per compositor
pub trait CompositionRenderResource {
    /// Add a reference on `compositor`, creating the server resource on first use
    fn add_ref_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<Arc<ResourceCell>>;

    /// Drop a reference on `compositor`
    fn release_on_compositor(&self, compositor: &Arc<Compositor>) -> CompositionResult<()>;
}

/// Dirty slot masks per target
#[derive(Debug)]
pub(crate) struct ChangeTracker {
    all: u64,
    dirty: Mutex<HashMap<TargetId, u64>>,
}

impl ChangeTracker {
    pub(crate) fn new(all: u64) -> Self {
        Self {
            all,
            dirty: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking `target` with every slot dirty
    pub(crate) fn attach(&self, target: TargetId) {
        self.dirty.lock().insert(target, self.all);
    }

    pub(crate) fn detach(&self, target: TargetId) {
        self.dirty.lock().remove(&target);
    }

    /// Mark slots dirty on every tracked target
    pub(crate) fn mark(&self, bits: u64) {
        for mask in self.dirty.lock().values_mut() {
            *mask |= bits;
        }
    }

    pub(crate) fn pending(&self, target: TargetId) -> u64 {
        self.dirty.lock().get(&target).copied().unwrap_or(0)
    }

    /// Clear slots after they were written
    pub(crate) fn clear(&self, target: TargetId, bits: u64) {
        if let Some(mask) = self.dirty.lock().get_mut(&target) {
            *mask &= !bits;
        }
    }
}
