//! Thread affinity checks
//!
//! Client composition state and the render loop's task list belong to the
//! mutation thread. [`ThreadAffinity`] remembers which thread that is and
//! rejects calls from anywhere else with an [`AccessViolation`].

use core::fmt;
use std::thread::{self, ThreadId};

/// A call was made from a thread that does not own the object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessViolation {
    /// What was being accessed
    pub operation: &'static str,
    /// The owning thread
    pub owner: ThreadId,
    /// The calling thread
    pub caller: ThreadId,
}

impl fmt::Display for AccessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' called from {:?}, but the object is owned by {:?}",
            self.operation, self.caller, self.owner
        )
    }
}

impl std::error::Error for AccessViolation {}

/// Records the owning thread of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the calling thread
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// Bind to a specific thread
    pub fn for_thread(owner: ThreadId) -> Self {
        Self { owner }
    }

    /// The owning thread
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Whether the calling thread is the owner
    #[inline]
    pub fn check_access(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Fail unless called from the owning thread
    pub fn verify_access(&self, operation: &'static str) -> Result<(), AccessViolation> {
        let caller = thread::current().id();
        if caller == self.owner {
            Ok(())
        } else {
            Err(AccessViolation {
                operation,
                owner: self.owner,
                caller,
            })
        }
    }
}
