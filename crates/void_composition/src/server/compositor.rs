//! Server compositor: applies batches and builds frames for one target

use super::effect::ServerShaderEffect;
use super::visual::ServerVisual;
use super::{ResourceCell, ResourceState, ResourceStats, ServerResource};
use crate::error::CompositionResult;
use crate::frame::{EffectFrame, Frame, SceneRenderer, VisualFrame};
use crate::geometry::Vector2;
use crate::transport::{Batch, BatchOp};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use void_batch::{BatchReader, CorruptStreamError};
use void_core::{ObjectId, TargetId, Timestamp};

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Batches fully read
    pub batches: usize,
    /// Change blocks applied
    pub applied: usize,
    /// Change blocks rejected
    pub failed: usize,
    /// Resources disposed
    pub disposed: usize,
    /// Sequence number of the last batch read
    pub last_sequence: Option<u64>,
}

/// Render-thread half of a compositor
pub struct ServerCompositor {
    target: TargetId,
    receiver: Receiver<Batch>,
    root: Mutex<Option<Arc<ResourceCell>>>,
    stats: Arc<ResourceStats>,
}

impl ServerCompositor {
    pub(crate) fn new(target: TargetId, receiver: Receiver<Batch>) -> Self {
        Self {
            target,
            receiver,
            root: Mutex::new(None),
            stats: Arc::new(ResourceStats::default()),
        }
    }

    /// Render target id
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Resource counters for this target
    pub fn stats(&self) -> &Arc<ResourceStats> {
        &self.stats
    }

    /// Root visual resource
    pub fn root(&self) -> Option<Arc<ResourceCell>> {
        self.root.lock().clone()
    }

    /// Batches waiting to be drained
    pub fn pending_batches(&self) -> usize {
        self.receiver.len()
    }

    /// Apply every batch received so far, in commit order
    ///
    /// A change block that fails to decode is skipped and counted; the rest
    /// of its batch still applies. A corrupt batch structure stops the pass
    /// with an error: the remainder of that batch is dropped, later batches
    /// stay queued for the next pass.
    pub fn drain(&self) -> CompositionResult<DrainReport> {
        let mut report = DrainReport::default();
        while let Ok(batch) = self.receiver.try_recv() {
            report.last_sequence = Some(batch.sequence);
            if let Err(e) = self.apply_batch(&batch, &mut report) {
                log::error!(
                    "Batch {} for {} is corrupt, dropping the rest of it: {}",
                    batch.sequence,
                    self.target,
                    e
                );
                return Err(e);
            }
            report.batches += 1;
            self.stats.batch_applied();
        }
        Ok(report)
    }

    fn apply_batch(&self, batch: &Batch, report: &mut DrainReport) -> CompositionResult<()> {
        let mut reader = BatchReader::new(&batch.data);
        while !reader.is_empty() {
            let offset = reader.position();
            let byte = reader.read_object::<u8>()?;
            let op = BatchOp::from_byte(byte).ok_or_else(|| CorruptStreamError::Invalid {
                offset,
                message: format!("unknown batch op {byte}"),
            })?;

            match op {
                BatchOp::Changes => {
                    let cell = reader.read_ref::<ResourceCell>()?;
                    let mut block = reader.read_block()?;
                    let result = cell.lock().deserialize_changes(&mut block, batch.committed_at);
                    match result {
                        Ok(()) => report.applied += 1,
                        Err(e) => {
                            report.failed += 1;
                            self.stats.update_failed();
                            log::warn!("Failed to apply changes to {} on {}: {}", cell.owner(), self.target, e);
                        }
                    }
                }
                BatchOp::Dispose => {
                    let cell = reader.read_ref::<ResourceCell>()?;
                    cell.lock().dispose();
                    self.stats.resource_disposed();
                    report.disposed += 1;
                    log::trace!("Disposed {} on {}", cell.owner(), self.target);
                }
                BatchOp::SetRoot => {
                    let root = if reader.read_object::<bool>()? {
                        Some(reader.read_ref::<ResourceCell>()?)
                    } else {
                        None
                    };
                    *self.root.lock() = root;
                }
            }
        }
        Ok(())
    }

    /// Flatten the visual tree at `now`
    pub fn build_frame(&self, now: Timestamp) -> Frame {
        let mut visuals = Vec::new();
        if let Some(root) = self.root() {
            let mut visited = HashSet::new();
            self.collect(&root, Vector2::ZERO, 1.0, now, &mut visited, &mut visuals);
        }
        Frame {
            target: self.target,
            time: now,
            visuals,
        }
    }

    /// Build the frame at `now` and hand it to `renderer`
    pub fn render(&self, now: Timestamp, renderer: &mut dyn SceneRenderer) -> CompositionResult<Frame> {
        let frame = self.build_frame(now);
        renderer.render_frame(&frame)?;
        Ok(frame)
    }

    fn collect(
        &self,
        cell: &Arc<ResourceCell>,
        parent_offset: Vector2,
        parent_opacity: f64,
        now: Timestamp,
        visited: &mut HashSet<ObjectId>,
        out: &mut Vec<VisualFrame>,
    ) {
        // Checked before locking, a cycle would otherwise deadlock
        if !visited.insert(cell.owner()) {
            log::warn!("Visual {} reached twice on {}, skipping", cell.owner(), self.target);
            return;
        }

        let drawn = cell.with_mut::<ServerVisual, _>(|object| {
            if object.state() != ResourceState::Active {
                return None;
            }
            let visual = object.try_current_mut()?;
            let state = visual.advance(now);
            Some((state, visual.effect().cloned(), visual.children().to_vec()))
        });

        let Some(drawn) = drawn else {
            log::warn!("Resource {} on {} is not a visual", cell.owner(), self.target);
            return;
        };
        let Some((state, effect, children)) = drawn else {
            return;
        };
        if !state.is_visible {
            return;
        }

        let offset = parent_offset + state.offset;
        let opacity = parent_opacity * state.opacity;
        out.push(VisualFrame {
            id: cell.owner(),
            offset,
            size: state.size,
            opacity,
            effect: effect.as_ref().and_then(Self::effect_frame),
        });

        for child in &children {
            self.collect(child, offset, opacity, now, visited, out);
        }
    }

    fn effect_frame(cell: &Arc<ResourceCell>) -> Option<EffectFrame> {
        cell.with::<ServerShaderEffect, _>(|object| {
            let effect = object.try_current()?;
            let program = effect.program()?;
            Some(EffectFrame {
                id: cell.owner(),
                program_id: program.id(),
                source: program.source().to_string(),
                uniforms: program.uniforms().clone(),
                child_shader_names: effect.child_shader_names().to_vec(),
                inputs: effect.inputs().to_vec(),
            })
        })
        .flatten()
    }
}

impl std::fmt::Debug for ServerCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCompositor")
            .field("target", &self.target)
            .field("pending_batches", &self.pending_batches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerObject;
    use crate::transport::{self, VisualSlot};
    use void_batch::BatchWriter;

    fn visual_cell(target: TargetId) -> Arc<ResourceCell> {
        Arc::new(ResourceCell::new(
            target,
            Box::new(ServerObject::new(ObjectId::new(), ServerVisual::new())),
        ))
    }

    fn write_opacity(writer: &mut BatchWriter, cell: &Arc<ResourceCell>, opacity: f64) {
        writer.write_object(&(BatchOp::Changes as u8));
        writer.write_ref(cell.clone());
        writer
            .write_block(|w| {
                w.write_object(&1u32);
                w.write_object(&(VisualSlot::Opacity as u8));
                w.write_object(&opacity);
                Ok::<(), CorruptStreamError>(())
            })
            .unwrap();
    }

    fn send(sender: &crossbeam_channel::Sender<Batch>, sequence: u64, writer: BatchWriter) {
        sender
            .send(Batch {
                sequence,
                committed_at: Timestamp::from_millis(sequence),
                data: writer.finish(),
            })
            .unwrap();
    }

    #[test]
    fn test_drain_applies_in_order_and_sets_root() {
        let target = TargetId::new();
        let (sender, receiver) = transport::channel();
        let server = ServerCompositor::new(target, receiver);
        let root = visual_cell(target);

        let mut first = BatchWriter::new();
        write_opacity(&mut first, &root, 0.25);
        first.write_object(&(BatchOp::SetRoot as u8));
        first.write_object(&true);
        first.write_ref(root.clone());
        send(&sender, 1, first);

        let mut second = BatchWriter::new();
        write_opacity(&mut second, &root, 0.75);
        send(&sender, 2, second);

        let report = server.drain().unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.applied, 2);
        assert_eq!(report.last_sequence, Some(2));

        let frame = server.build_frame(Timestamp::from_millis(3));
        assert_eq!(frame.visuals.len(), 1);
        assert_eq!(frame.visuals[0].opacity, 0.75);
        assert_eq!(root.with::<ServerVisual, _>(|o| o.committed_at()), Some(Some(Timestamp::from_millis(2))));
    }

    #[test]
    fn test_corrupt_op_stops_pass_and_keeps_later_batches() {
        let target = TargetId::new();
        let (sender, receiver) = transport::channel();
        let server = ServerCompositor::new(target, receiver);
        let cell = visual_cell(target);

        let mut bad = BatchWriter::new();
        write_opacity(&mut bad, &cell, 0.5);
        bad.write_object(&99u8);
        write_opacity(&mut bad, &cell, 0.1);
        send(&sender, 1, bad);

        let mut good = BatchWriter::new();
        write_opacity(&mut good, &cell, 0.9);
        send(&sender, 2, good);

        assert!(server.drain().is_err());
        // Entries before the corruption were applied, the rest of the batch dropped
        assert_eq!(cell.with::<ServerVisual, _>(|o| o.current().base().opacity), Some(0.5));
        assert_eq!(server.pending_batches(), 1);

        let report = server.drain().unwrap();
        assert_eq!(report.last_sequence, Some(2));
        assert_eq!(cell.with::<ServerVisual, _>(|o| o.current().base().opacity), Some(0.9));
    }

    #[test]
    fn test_malformed_block_fails_only_its_resource() {
        let target = TargetId::new();
        let (sender, receiver) = transport::channel();
        let server = ServerCompositor::new(target, receiver);
        let broken = visual_cell(target);
        let healthy = visual_cell(target);

        let mut writer = BatchWriter::new();
        writer.write_object(&(BatchOp::Changes as u8));
        writer.write_ref(broken.clone());
        writer
            .write_block(|w| {
                w.write_object(&1u32);
                w.write_object(&(VisualSlot::Opacity as u8));
                // Opacity is an f64, a bool does not decode
                w.write_object(&true);
                Ok::<(), CorruptStreamError>(())
            })
            .unwrap();
        write_opacity(&mut writer, &healthy, 0.25);
        send(&sender, 1, writer);

        let report = server.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.batches, 1);
        assert_eq!(server.stats().snapshot().failed_updates, 1);

        assert_eq!(broken.state(), ResourceState::Uninitialized);
        assert_eq!(healthy.with::<ServerVisual, _>(|o| o.current().base().opacity), Some(0.25));
    }

    #[test]
    fn test_wrong_resource_type_for_root_is_skipped() {
        let target = TargetId::new();
        let (sender, receiver) = transport::channel();
        let server = ServerCompositor::new(target, receiver);
        let effect = Arc::new(ResourceCell::new(
            target,
            Box::new(ServerObject::new(
                ObjectId::new(),
                ServerShaderEffect::new(server.stats().clone()),
            )),
        ));

        let mut writer = BatchWriter::new();
        writer.write_object(&(BatchOp::SetRoot as u8));
        writer.write_object(&true);
        writer.write_ref(effect);
        send(&sender, 1, writer);

        server.drain().unwrap();
        assert!(server.build_frame(Timestamp::ZERO).visuals.is_empty());
    }
}
