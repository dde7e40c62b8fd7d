//! Per-target server resource lifetimes
//!
//! A client object attached to several render targets owns one
//! [`ResourceHolder`]. The holder keeps, per target, the object's server
//! resource and a reference count of how many attachments on that target
//! use it. The resource is created lazily on the first attachment and
//! queued for disposal on the target's next batch when the count drops to
//! zero.

use crate::client::Compositor;
use crate::error::{CompositionError, CompositionResult};
use crate::server::{ResourceCell, ServerResource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use void_core::{ObjectId, TargetId};

struct HolderEntry {
    compositor: Weak<Compositor>,
    cell: Arc<ResourceCell>,
    count: u32,
}

/// Reference-counted server resources of one client object, keyed by target
pub struct ResourceHolder {
    owner: ObjectId,
    entries: Mutex<HashMap<TargetId, HolderEntry>>,
}

impl ResourceHolder {
    /// Create an empty holder for `owner`
    pub fn new(owner: ObjectId) -> Self {
        Self {
            owner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Owner object id
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Add a reference on `compositor`, creating the resource on first use
    ///
    /// Returns the resource and whether it was created by this call.
    pub fn create_or_add_ref<F>(
        &self,
        compositor: &Arc<Compositor>,
        factory: F,
    ) -> (Arc<ResourceCell>, bool)
    where
        F: FnOnce(&Compositor) -> Box<dyn ServerResource>,
    {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&compositor.id()) {
            entry.count += 1;
            return (entry.cell.clone(), false);
        }

        let cell = Arc::new(ResourceCell::new(compositor.id(), factory(compositor)));
        compositor.server().stats().resource_created();
        log::trace!("Created server resource for {} on {}", self.owner, compositor.id());
        entries.insert(
            compositor.id(),
            HolderEntry {
                compositor: Arc::downgrade(compositor),
                cell: cell.clone(),
                count: 1,
            },
        );
        (cell, true)
    }

    /// Drop a reference on `compositor`
    ///
    /// Returns true if this released the last reference, in which case the
    /// resource is removed and disposed with the target's next batch.
    pub fn release(&self, compositor: &Compositor) -> CompositionResult<bool> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&compositor.id()) else {
            log::error!("Unbalanced release of {} on {}", self.owner, compositor.id());
            return Err(CompositionError::UnbalancedReference {
                owner: self.owner,
                target: compositor.id(),
            });
        };

        entry.count -= 1;
        if entry.count > 0 {
            return Ok(false);
        }

        if let Some(entry) = entries.remove(&compositor.id()) {
            compositor.dispose_on_next_batch(entry.cell);
        }
        Ok(true)
    }

    /// The resource on `target`, without touching the count
    pub fn try_get_for_compositor(&self, target: TargetId) -> Option<Arc<ResourceCell>> {
        self.entries.lock().get(&target).map(|entry| entry.cell.clone())
    }

    /// Current reference count on `target`
    pub fn ref_count(&self, target: TargetId) -> u32 {
        self.entries.lock().get(&target).map_or(0, |entry| entry.count)
    }

    /// Compositors holding a reference, in no particular order
    pub fn attached_compositors(&self) -> Vec<Arc<Compositor>> {
        self.entries
            .lock()
            .values()
            .filter_map(|entry| entry.compositor.upgrade())
            .collect()
    }

    /// Whether no target holds a reference
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for ResourceHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        let mut counts: Vec<_> = entries.iter().map(|(target, e)| (*target, e.count)).collect();
        counts.sort();
        f.debug_struct("ResourceHolder")
            .field("owner", &self.owner)
            .field("counts", &counts)
            .finish()
    }
}
