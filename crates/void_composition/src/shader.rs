//! Shader effect data shared by client and server
//!
//! A [`ShaderDescriptor`] is the complete, self-contained description of a
//! shader program: its source and the current value of every uniform. It
//! crosses the thread boundary as a serialized object graph.

use crate::geometry::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type of a shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformKind {
    Int,
    Float,
    Size,
}

/// Value of a shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Size(Vector2),
}

impl UniformValue {
    /// Kind of this value
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Int(_) => UniformKind::Int,
            Self::Float(_) => UniformKind::Float,
            Self::Size(_) => UniformKind::Size,
        }
    }

    /// Zero value of a kind
    pub fn zero(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Int => Self::Int(0),
            UniformKind::Float => Self::Float(0.0),
            UniformKind::Size => Self::Size(Vector2::ZERO),
        }
    }
}

/// Shader source plus uniform values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderDescriptor {
    pub source: String,
    pub uniforms: BTreeMap<String, UniformValue>,
}

impl ShaderDescriptor {
    /// Create with no uniforms
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            uniforms: BTreeMap::new(),
        }
    }
}

/// Source image bound to a shader's child shader slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterInput {
    /// Gaussian blur of the content underneath
    Blur { radius: f32 },
    /// Content shifted by an offset
    Offset { dx: f32, dy: f32 },
}
