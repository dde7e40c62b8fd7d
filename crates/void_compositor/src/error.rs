//! Compositor error types

use thiserror::Error;
use void_core::AccessViolation;

/// Compositor errors
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Access violation: {0}")]
    AccessViolation(#[from] AccessViolation),

    #[error("Timer error: {0}")]
    Timer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for compositor operations
pub type CompositorResult<T> = Result<T, CompositorError>;

/// A render task failed to produce its frame
///
/// Returned from [`RenderTask::render`](crate::RenderTask::render). The
/// render loop logs it and carries on with the remaining tasks.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderTaskError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RenderTaskError {
    /// Create from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error
    pub fn from_error<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}
