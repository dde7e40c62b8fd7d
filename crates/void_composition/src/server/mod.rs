//! Render-thread mirrors of client composition objects
//!
//! Every client object attached to a render target has one server resource
//! on that target. Resources are only mutated by the render thread, while
//! it drains batches, and are reached through a [`ResourceCell`] that the
//! batch carries by reference.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──apply──▶ Active ──apply──▶ Active
//!        │                    │
//!        └──────dispose───────┴──────▶ Disposed
//! ```

pub mod compositor;
pub mod effect;
pub mod visual;

pub use compositor::{DrainReport, ServerCompositor};
pub use effect::{ServerShaderEffect, ShaderProgram};
pub use visual::{ServerVisual, VisualState};

use crate::error::{CompositionError, CompositionResult};
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use void_batch::{BatchReader, BatchResult};
use void_core::{ObjectId, TargetId, Timestamp};

/// Lifecycle state of a server resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Created, no changes applied yet
    Uninitialized,
    /// At least one change block applied
    Active,
    /// Released; no further changes are accepted
    Disposed,
}

/// Something holding render-side resources that must be released explicitly
pub trait Disposable {
    /// Release held resources. Calling again has no effect.
    fn dispose(&mut self);
}

/// Object-safe interface the server compositor drives resources through
pub trait ServerResource: Send + 'static {
    /// Id of the client object this resource mirrors
    fn owner(&self) -> ObjectId;

    /// Current lifecycle state
    fn state(&self) -> ResourceState;

    /// Commit time of the last applied change block
    fn committed_at(&self) -> Option<Timestamp>;

    /// Decode one change block and apply it
    ///
    /// Either the whole block is applied or, on error, nothing is.
    fn deserialize_changes(
        &mut self,
        reader: &mut BatchReader<'_>,
        committed_at: Timestamp,
    ) -> CompositionResult<()>;

    /// Release held resources and move to [`ResourceState::Disposed`]
    fn dispose(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Behavior of one concrete kind of server resource
pub trait ResourceKind: Send + 'static {
    /// Decoded, not yet applied, change block
    type Changes;

    /// Decode a change block without touching current state
    fn decode(&self, reader: &mut BatchReader<'_>) -> BatchResult<Self::Changes>;

    /// Apply decoded changes
    fn apply(&mut self, changes: Self::Changes, committed_at: Timestamp);

    /// Release held resources; called exactly once
    fn release(&mut self);
}

/// Generic [`ServerResource`] implementation around a [`ResourceKind`]
pub struct ServerObject<K> {
    owner: ObjectId,
    kind: K,
    state: ResourceState,
    committed_at: Option<Timestamp>,
}

impl<K: ResourceKind> ServerObject<K> {
    /// Create an uninitialized resource
    pub fn new(owner: ObjectId, kind: K) -> Self {
        Self {
            owner,
            kind,
            state: ResourceState::Uninitialized,
            committed_at: None,
        }
    }

    /// The resource's current value
    ///
    /// # Panics
    ///
    /// Panics if the resource was disposed.
    pub fn current(&self) -> &K {
        assert!(
            self.state != ResourceState::Disposed,
            "server resource of {} used after dispose",
            self.owner
        );
        &self.kind
    }

    /// The resource's current value, unless disposed
    pub fn try_current(&self) -> Option<&K> {
        (self.state != ResourceState::Disposed).then_some(&self.kind)
    }

    /// Mutable access to the current value, unless disposed
    pub fn try_current_mut(&mut self) -> Option<&mut K> {
        (self.state != ResourceState::Disposed).then_some(&mut self.kind)
    }
}

impl<K: ResourceKind> ServerResource for ServerObject<K> {
    fn owner(&self) -> ObjectId {
        self.owner
    }

    fn state(&self) -> ResourceState {
        self.state
    }

    fn committed_at(&self) -> Option<Timestamp> {
        self.committed_at
    }

    fn deserialize_changes(
        &mut self,
        reader: &mut BatchReader<'_>,
        committed_at: Timestamp,
    ) -> CompositionResult<()> {
        if self.state == ResourceState::Disposed {
            return Err(CompositionError::ResourceDisposed(self.owner));
        }

        let changes = self.kind.decode(reader)?;
        reader.expect_end()?;

        self.kind.apply(changes, committed_at);
        self.state = ResourceState::Active;
        self.committed_at = Some(committed_at);
        Ok(())
    }

    fn dispose(&mut self) {
        if self.state != ResourceState::Disposed {
            self.kind.release();
            self.state = ResourceState::Disposed;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<K> fmt::Debug for ServerObject<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerObject")
            .field("owner", &self.owner)
            .field("kind", &std::any::type_name::<K>())
            .field("state", &self.state)
            .finish()
    }
}

/// Shared slot holding one server resource
///
/// Batches reference cells through their object pool; the render thread
/// locks a cell to apply changes or read state for a frame.
pub struct ResourceCell {
    owner: ObjectId,
    target: TargetId,
    resource: Mutex<Box<dyn ServerResource>>,
}

impl ResourceCell {
    /// Wrap a resource for `target`
    pub fn new(target: TargetId, resource: Box<dyn ServerResource>) -> Self {
        Self {
            owner: resource.owner(),
            target,
            resource: Mutex::new(resource),
        }
    }

    /// Owner object id
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Render target this resource belongs to
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Lock the resource
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn ServerResource>> {
        self.resource.lock()
    }

    /// Lifecycle state
    pub fn state(&self) -> ResourceState {
        self.resource.lock().state()
    }

    /// Run `f` on the resource if it is a `ServerObject<K>`
    pub fn with<K: ResourceKind, R>(&self, f: impl FnOnce(&ServerObject<K>) -> R) -> Option<R> {
        let guard = self.resource.lock();
        guard.as_any().downcast_ref::<ServerObject<K>>().map(f)
    }

    /// Run `f` on the resource mutably if it is a `ServerObject<K>`
    pub fn with_mut<K: ResourceKind, R>(
        &self,
        f: impl FnOnce(&mut ServerObject<K>) -> R,
    ) -> Option<R> {
        let mut guard = self.resource.lock();
        guard.as_any_mut().downcast_mut::<ServerObject<K>>().map(f)
    }
}

impl fmt::Debug for ResourceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCell")
            .field("owner", &self.owner)
            .field("target", &self.target)
            .finish()
    }
}

/// Snapshot of [`ResourceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStatsSnapshot {
    pub created: u64,
    pub disposed: u64,
    pub live_shader_programs: u64,
    pub failed_updates: u64,
    pub applied_batches: u64,
    pub skipped_frames: u64,
}

/// Resource counters for one render target
#[derive(Debug, Default)]
pub struct ResourceStats {
    created: AtomicU64,
    disposed: AtomicU64,
    live_shader_programs: AtomicU64,
    failed_updates: AtomicU64,
    applied_batches: AtomicU64,
    skipped_frames: AtomicU64,
}

impl ResourceStats {
    pub(crate) fn resource_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn resource_disposed(&self) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn program_created(&self) {
        self.live_shader_programs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn program_disposed(&self) {
        self.live_shader_programs.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn update_failed(&self) {
        self.failed_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_applied(&self) {
        self.applied_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_skipped(&self) {
        self.skipped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> ResourceStatsSnapshot {
        ResourceStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            disposed: self.disposed.load(Ordering::Relaxed),
            live_shader_programs: self.live_shader_programs.load(Ordering::Relaxed),
            failed_updates: self.failed_updates.load(Ordering::Relaxed),
            applied_batches: self.applied_batches.load(Ordering::Relaxed),
            skipped_frames: self.skipped_frames.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_batch::BatchWriter;

    /// Counter that adds the u32 values of each block
    #[derive(Default)]
    struct Sum {
        total: u32,
        released: u32,
    }

    impl ResourceKind for Sum {
        type Changes = Vec<u32>;

        fn decode(&self, reader: &mut BatchReader<'_>) -> BatchResult<Vec<u32>> {
            let count = reader.read_object::<u32>()?;
            (0..count).map(|_| reader.read_object::<u32>()).collect()
        }

        fn apply(&mut self, changes: Vec<u32>, _committed_at: Timestamp) {
            self.total += changes.iter().sum::<u32>();
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    fn block(values: &[u32]) -> void_batch::BatchData {
        let mut writer = BatchWriter::new();
        writer.write_object(&(values.len() as u32));
        for value in values {
            writer.write_object(value);
        }
        writer.finish()
    }

    #[test]
    fn test_state_machine() {
        let mut object = ServerObject::new(ObjectId::new(), Sum::default());
        assert_eq!(object.state(), ResourceState::Uninitialized);
        assert_eq!(object.committed_at(), None);

        let data = block(&[1, 2]);
        object
            .deserialize_changes(&mut BatchReader::new(&data), Timestamp::from_millis(5))
            .unwrap();
        assert_eq!(object.state(), ResourceState::Active);
        assert_eq!(object.committed_at(), Some(Timestamp::from_millis(5)));
        assert_eq!(object.current().total, 3);

        object.dispose();
        object.dispose();
        assert_eq!(object.state(), ResourceState::Disposed);
        assert!(object.try_current().is_none());
        assert!(matches!(
            object.deserialize_changes(&mut BatchReader::new(&data), Timestamp::from_millis(6)),
            Err(CompositionError::ResourceDisposed(_))
        ));
        assert_eq!(object.kind.released, 1);
    }

    #[test]
    fn test_truncated_block_applies_nothing() {
        let mut object = ServerObject::new(ObjectId::new(), Sum::default());
        let data = block(&[4, 5]);
        let truncated = &data.bytes()[..data.len() - 9];

        let mut reader = BatchReader::from_parts(truncated, &[]);
        assert!(object.deserialize_changes(&mut reader, Timestamp::ZERO).is_err());
        assert_eq!(object.state(), ResourceState::Uninitialized);
        assert_eq!(object.current().total, 0);
    }

    #[test]
    fn test_trailing_entries_rejected() {
        let mut object = ServerObject::new(ObjectId::new(), Sum::default());
        let mut writer = BatchWriter::new();
        writer.write_object(&1u32);
        writer.write_object(&7u32);
        writer.write_object(&"extra");
        let data = writer.finish();

        assert!(matches!(
            object.deserialize_changes(&mut BatchReader::new(&data), Timestamp::ZERO),
            Err(CompositionError::CorruptStream(_))
        ));
        assert_eq!(object.current().total, 0);
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn test_current_after_dispose_panics() {
        let mut object = ServerObject::new(ObjectId::new(), Sum::default());
        object.dispose();
        let _ = object.current();
    }

    #[test]
    fn test_cell_downcast() {
        let owner = ObjectId::new();
        let cell = ResourceCell::new(TargetId::new(), Box::new(ServerObject::new(owner, Sum::default())));
        assert_eq!(cell.owner(), owner);
        assert_eq!(cell.with::<Sum, _>(|o| o.current().total), Some(0));
        assert_eq!(cell.with::<ServerVisual, _>(|_| ()), None);
    }
}
