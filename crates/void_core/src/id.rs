//! Stable identifiers for composition objects and render targets
//!
//! Ids are process-unique and never reused. They are cheap to copy and hash,
//! and are what the holder maps and log lines key on.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Allocate the next unique id
            pub fn new() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Create from a raw value (tests and diagnostics only)
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw id value
            #[inline]
            pub const fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a client composition object (effect, visual, ...)
    ///
    /// Every server mirror created for the object carries the same id as its
    /// owner token, whichever render target it belongs to.
    ObjectId,
    "object"
);

define_id!(
    /// Identity of one render target (one compositor / window)
    TargetId,
    "target"
);
