//! Flattened frames handed to a scene renderer

use crate::error::CompositionResult;
use crate::geometry::Vector2;
use crate::shader::{FilterInput, UniformValue};
use std::collections::BTreeMap;
use void_core::{ObjectId, TargetId, Timestamp};

/// Shader effect applied to a visual
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFrame {
    pub id: ObjectId,
    pub program_id: u64,
    pub source: String,
    pub uniforms: BTreeMap<String, UniformValue>,
    pub child_shader_names: Vec<String>,
    pub inputs: Vec<Option<FilterInput>>,
}

/// One visual in draw order, in target coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFrame {
    pub id: ObjectId,
    /// Offset accumulated over all ancestors
    pub offset: Vector2,
    pub size: Vector2,
    /// Opacity multiplied over all ancestors
    pub opacity: f64,
    pub effect: Option<EffectFrame>,
}

/// Draw list for one target at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub target: TargetId,
    pub time: Timestamp,
    pub visuals: Vec<VisualFrame>,
}

impl Frame {
    /// Find a visual by id
    pub fn visual(&self, id: ObjectId) -> Option<&VisualFrame> {
        self.visuals.iter().find(|v| v.id == id)
    }
}

/// Consumer of frames, typically a GPU backend
pub trait SceneRenderer: Send {
    /// Draw one frame; called on the render thread
    fn render_frame(&mut self, frame: &Frame) -> CompositionResult<()>;
}
