//! Composition error types

use crate::animation::{TimelineError, ValueKind};
use crate::shader::UniformKind;
use thiserror::Error;
use void_batch::CorruptStreamError;
use void_core::{AccessViolation, ObjectId, TargetId};

/// Composition errors
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("Corrupt batch stream: {0}")]
    CorruptStream(#[from] CorruptStreamError),

    #[error("Access violation: {0}")]
    AccessViolation(#[from] AccessViolation),

    #[error("Unbalanced release of {owner} on {target}")]
    UnbalancedReference { owner: ObjectId, target: TargetId },

    #[error("Server resource of {0} is disposed")]
    ResourceDisposed(ObjectId),

    #[error("Unknown uniform '{0}'")]
    UnknownUniform(String),

    #[error("Uniform '{name}' is {expected:?}, got {found:?}")]
    UniformKindMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },

    #[error("Cannot animate {property} with a {found:?} timeline, expected {expected:?}")]
    AnimationType {
        property: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Invalid timeline: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Visual tree error: {0}")]
    VisualTree(String),

    #[error("Compositor {0} is closed")]
    CompositorClosed(TargetId),

    #[error("Render error: {0}")]
    Render(String),
}

/// Result type for composition operations
pub type CompositionResult<T> = Result<T, CompositionError>;
