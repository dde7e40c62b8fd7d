//! Keyframe animations evaluated on the render thread
//!
//! Animations are started on the client by handing a [`Timeline`] to a
//! visual property. The timeline travels to the server inside the next
//! batch and is evaluated there against the time elapsed since that batch
//! was committed, so animations keep running without further commits.

pub mod easing;
pub mod timeline;

pub use easing::Easing;
pub use timeline::{
    AnimationValue, Evaluation, IterationCount, Keyframe, Timeline, TimelineError, ValueKind,
};

use serde::{Deserialize, Serialize};

/// Visual property that can be animated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimatedProperty {
    Opacity,
    Offset,
}

impl AnimatedProperty {
    /// Property name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opacity => "opacity",
            Self::Offset => "offset",
        }
    }

    /// Value kind a timeline for this property must produce
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Opacity => ValueKind::Scalar,
            Self::Offset => ValueKind::Vector2,
        }
    }
}
