//! # void_core - Void Composition Core
//!
//! Zero-dependency primitives shared by every layer of the composition
//! engine:
//! - **Identity**: stable ids for client objects, render targets and tasks
//! - **Time**: commit timestamps and injectable clocks
//! - **Thread affinity**: the mutation-thread access check
//!
//! Nothing in here knows about batches, resources or render loops. Those
//! live in `void_batch`, `void_composition` and `void_compositor`.

pub mod id;
pub mod thread;
pub mod time;

pub use id::*;
pub use thread::*;
pub use time::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::id::{ObjectId, TargetId};
    pub use crate::thread::{AccessViolation, ThreadAffinity};
    pub use crate::time::{Clock, ManualClock, SystemClock, Timestamp};
}
