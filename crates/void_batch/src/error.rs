//! Batch stream errors

use crate::tag::Tag;
use thiserror::Error;

/// A batch could not be decoded
///
/// Offsets are absolute byte positions in the stream the failing reader was
/// created from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorruptStreamError {
    #[error("stream exhausted at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("tag mismatch at offset {offset}: expected {expected}, found {found}")]
    TagMismatch {
        offset: usize,
        expected: Tag,
        found: Tag,
    },

    #[error("unknown tag {tag:#04x} at offset {offset}")]
    UnknownTag { offset: usize, tag: u8 },

    #[error("bad length for {tag} entry at offset {offset}: {len} bytes")]
    BadLength { offset: usize, tag: Tag, len: usize },

    #[error("invalid UTF-8 in string entry at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("object reference {index} out of range ({available} objects in pool)")]
    BadReference { index: usize, available: usize },

    #[error("object reference {index} is not a {expected}")]
    ReferenceType { index: usize, expected: &'static str },

    #[error("array length mismatch: expected {expected}, found {found}")]
    ArrayLength { expected: usize, found: usize },

    #[error("serialized object: {0}")]
    Serialization(String),

    #[error("invalid value at offset {offset}: {message}")]
    Invalid { offset: usize, message: String },
}

/// Result type for batch stream operations
pub type BatchResult<T> = Result<T, CorruptStreamError>;
