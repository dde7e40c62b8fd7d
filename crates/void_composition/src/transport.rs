//! Batch transport between a client compositor and its server
//!
//! Batch layout, one entry group per operation:
//!
//! ```text
//! Changes:  u8 op | ref cell | block { resource-specific changes }
//! Dispose:  u8 op | ref cell
//! SetRoot:  u8 op | bool present | [ref cell]
//! ```
//!
//! Visual change blocks are a `u32` count followed by `(u8 slot, value)`
//! pairs, see [`VisualSlot`].

use crossbeam_channel::{Receiver, Sender};
use void_batch::BatchData;
use void_core::Timestamp;

/// One commit's worth of changes for one target
#[derive(Debug)]
pub struct Batch {
    /// Per-target commit sequence number, starting at 1
    pub sequence: u64,
    /// Time of the commit that produced this batch
    pub committed_at: Timestamp,
    pub data: BatchData,
}

pub(crate) fn channel() -> (Sender<Batch>, Receiver<Batch>) {
    crossbeam_channel::unbounded()
}

/// Operation code at the start of each batch entry group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum BatchOp {
    Changes = 0,
    Dispose = 1,
    SetRoot = 2,
}

impl BatchOp {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Changes),
            1 => Some(Self::Dispose),
            2 => Some(Self::SetRoot),
            _ => None,
        }
    }
}

/// Property slot of a visual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum VisualSlot {
    Opacity = 0,
    Offset = 1,
    Size = 2,
    IsVisible = 3,
    Effect = 4,
    Children = 5,
    OpacityAnimation = 6,
    OffsetAnimation = 7,
}

impl VisualSlot {
    pub(crate) const ALL: [VisualSlot; 8] = [
        Self::Opacity,
        Self::Offset,
        Self::Size,
        Self::IsVisible,
        Self::Effect,
        Self::Children,
        Self::OpacityAnimation,
        Self::OffsetAnimation,
    ];

    /// Mask with every slot set
    pub(crate) const ALL_MASK: u64 = (1 << Self::ALL.len()) - 1;

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    pub(crate) const fn bit(self) -> u64 {
        1 << self as u8
    }
}
