//! # Void Composition
//!
//! Retained-mode composition objects for the Void engine.
//!
//! Client objects ([`Visual`], [`ShaderEffect`]) live on the mutation
//! thread and record property changes. A [`Compositor`] per render target
//! collects those changes into batches on [`Compositor::commit`]; the
//! matching [`ServerCompositor`] applies them on the render thread and
//! flattens the visual tree into a [`Frame`] for a [`SceneRenderer`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Mutation thread                             │
//! │  Visual / ShaderEffect ─ dirty slots         │
//! │  Compositor::commit ─ Batch (void_batch)     │
//! ├───────────────── channel ────────────────────┤
//! │  Render thread                               │
//! │  ServerCompositor::drain ─ ServerResource    │
//! │  Timeline evaluation ─ Frame ─ SceneRenderer │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! One client object can be attached to several targets at once. Its
//! [`ResourceHolder`] keeps a separate, reference-counted server resource
//! per target, so a shader effect shared by two windows is created and
//! disposed independently on each.

pub mod animation;
pub mod client;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod holder;
pub mod server;
pub mod shader;
pub mod target;
pub mod transition;
pub mod transport;

pub use animation::{AnimatedProperty, AnimationValue, Easing, IterationCount, Keyframe, Timeline};
pub use client::{CompositionRenderResource, Compositor, CompositorSerializable, ShaderEffect, Visual};
pub use error::{CompositionError, CompositionResult};
pub use frame::{EffectFrame, Frame, SceneRenderer, VisualFrame};
pub use geometry::Vector2;
pub use holder::ResourceHolder;
pub use server::{ResourceState, ResourceStatsSnapshot, ServerCompositor};
pub use shader::{FilterInput, ShaderDescriptor, UniformKind, UniformValue};
pub use target::CompositionTarget;
pub use transition::{CrossFade, CrossFadeHandle};

/// Prelude for common imports
pub mod prelude {
    pub use crate::animation::{AnimatedProperty, Easing, IterationCount, Keyframe, Timeline};
    pub use crate::client::{CompositionRenderResource, Compositor, ShaderEffect, Visual};
    pub use crate::error::{CompositionError, CompositionResult};
    pub use crate::frame::{Frame, SceneRenderer};
    pub use crate::geometry::Vector2;
    pub use crate::shader::{UniformKind, UniformValue};
    pub use crate::target::CompositionTarget;
    pub use crate::transition::CrossFade;
}
