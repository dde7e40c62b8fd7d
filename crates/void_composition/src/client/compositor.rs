//! Client compositor: collects pending changes for one render target

use super::{CompositionRenderResource, CompositorSerializable, Visual};
use crate::error::{CompositionError, CompositionResult};
use crate::server::{ResourceCell, ResourceStats, ServerCompositor};
use crate::transport::{self, Batch, BatchOp};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use void_batch::BatchWriter;
use void_core::{Clock, ObjectId, TargetId, ThreadAffinity};

#[derive(Default)]
struct PendingState {
    objects: Vec<Arc<dyn CompositorSerializable>>,
    queued: HashSet<ObjectId>,
    disposals: Vec<Arc<ResourceCell>>,
    root: Option<Option<Arc<ResourceCell>>>,
}

/// Mutation-thread half of a render target
///
/// Created together with its [`ServerCompositor`]; batches flow from one
/// to the other over an unbounded channel.
pub struct Compositor {
    id: TargetId,
    affinity: ThreadAffinity,
    clock: Arc<dyn Clock>,
    server: Arc<ServerCompositor>,
    sender: Sender<Batch>,
    pending: Mutex<PendingState>,
    root: Mutex<Option<Arc<Visual>>>,
    sequence: AtomicU64,
    weak_self: Weak<Compositor>,
}

impl Compositor {
    /// Create a compositor bound to the current thread
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_affinity(clock, ThreadAffinity::current())
    }

    /// Create a compositor bound to `affinity`
    pub fn with_affinity(clock: Arc<dyn Clock>, affinity: ThreadAffinity) -> Arc<Self> {
        let id = TargetId::new();
        let (sender, receiver) = transport::channel();
        log::debug!("Created compositor {}", id);
        Arc::new_cyclic(|weak_self| Self {
            id,
            affinity,
            clock,
            server: Arc::new(ServerCompositor::new(id, receiver)),
            sender,
            pending: Mutex::new(PendingState::default()),
            root: Mutex::new(None),
            sequence: AtomicU64::new(0),
            weak_self: weak_self.clone(),
        })
    }

    /// Render target id
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Render-thread half
    pub fn server(&self) -> &Arc<ServerCompositor> {
        &self.server
    }

    /// Resource counters of the render-thread half
    pub fn server_stats(&self) -> &Arc<ResourceStats> {
        self.server.stats()
    }

    /// Clock used to stamp commits
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Mutation thread of this compositor
    pub fn affinity(&self) -> &ThreadAffinity {
        &self.affinity
    }

    /// Sequence number of the last committed batch (0 before the first)
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Queue `object` for the next commit; repeated calls are coalesced
    pub fn register_for_serialization(&self, object: Arc<dyn CompositorSerializable>) {
        let mut pending = self.pending.lock();
        if pending.queued.insert(object.object_id()) {
            pending.objects.push(object);
        }
    }

    /// Queue a server resource for disposal with the next commit
    pub fn dispose_on_next_batch(&self, cell: Arc<ResourceCell>) {
        self.pending.lock().disposals.push(cell);
    }

    /// Whether the next commit has anything to send
    pub fn has_pending(&self) -> bool {
        let pending = self.pending.lock();
        !pending.objects.is_empty() || !pending.disposals.is_empty() || pending.root.is_some()
    }

    /// Current root visual
    pub fn root(&self) -> Option<Arc<Visual>> {
        self.root.lock().clone()
    }

    /// Replace the root visual
    ///
    /// The new root is attached to this compositor before the old one is
    /// released, so a subtree shared by both keeps its server resources.
    pub fn set_root(&self, visual: Option<&Arc<Visual>>) -> CompositionResult<()> {
        self.affinity.verify_access("Compositor::set_root")?;
        let this = self.weak_self.upgrade().ok_or(CompositionError::CompositorClosed(self.id))?;

        let previous = self.root.lock().clone();
        if previous.as_ref().map(Arc::as_ptr) == visual.map(Arc::as_ptr) {
            return Ok(());
        }

        let cell = match visual {
            Some(visual) => Some(visual.add_ref_on_compositor(&this)?),
            None => None,
        };
        if let Some(previous) = &previous {
            previous.release_on_compositor(&this)?;
        }

        *self.root.lock() = visual.cloned();
        self.pending.lock().root = Some(cell);
        Ok(())
    }

    /// Send every pending change to the render thread as one batch
    ///
    /// Returns the batch sequence number, or `None` if nothing was pending.
    pub fn commit(&self) -> CompositionResult<Option<u64>> {
        self.affinity.verify_access("Compositor::commit")?;

        let (objects, disposals, root) = {
            let mut pending = self.pending.lock();
            pending.queued.clear();
            (
                mem::take(&mut pending.objects),
                mem::take(&mut pending.disposals),
                pending.root.take(),
            )
        };

        let mut writer = BatchWriter::new();
        let mut failed = Vec::new();
        for object in objects {
            let Some(cell) = object.try_get_server(self.id) else {
                continue;
            };
            let written = writer.write_atomic(|w| {
                w.write_object(&(BatchOp::Changes as u8));
                w.write_ref(cell);
                w.write_block(|block| object.serialize_changes(self.id, block))
            });
            if let Err(e) = written {
                log::error!("Failed to serialize {} for {}: {}", object.object_id(), self.id, e);
                failed.push(object);
            }
        }

        if let Some(root) = root {
            writer.write_object(&(BatchOp::SetRoot as u8));
            writer.write_object(&root.is_some());
            if let Some(cell) = root {
                writer.write_ref(cell);
            }
        }

        for cell in disposals {
            writer.write_object(&(BatchOp::Dispose as u8));
            writer.write_ref(cell);
        }

        // Objects that failed keep their dirty slots and retry next commit
        for object in failed {
            self.register_for_serialization(object);
        }

        if writer.is_empty() {
            return Ok(None);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let batch = Batch {
            sequence,
            committed_at: self.clock.now(),
            data: writer.finish(),
        };
        log::trace!(
            "Committing batch {} for {} ({} bytes, {} refs)",
            sequence,
            self.id,
            batch.data.len(),
            batch.data.object_count()
        );
        self.sender
            .send(batch)
            .map_err(|_| CompositionError::CompositorClosed(self.id))?;
        Ok(Some(sequence))
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("id", &self.id)
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}
