//! Batch writer

use crate::error::{BatchResult, CorruptStreamError};
use crate::tag::Tag;
use crate::value::BatchEncode;
use crate::ENTRY_HEADER_LEN;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An object carried by reference alongside the encoded bytes
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// A finished batch stream: encoded bytes plus the object pool
#[derive(Clone, Default)]
pub struct BatchData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) objects: Vec<ObjectRef>,
}

impl BatchData {
    /// Build from raw parts
    pub fn from_parts(bytes: Vec<u8>, objects: Vec<ObjectRef>) -> Self {
        Self { bytes, objects }
    }

    /// Encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of pooled objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for BatchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchData")
            .field("bytes", &self.bytes.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}

/// Appends typed, length-prefixed entries to a batch stream
#[derive(Default)]
pub struct BatchWriter {
    bytes: Vec<u8>,
    objects: Vec<ObjectRef>,
}

impl BatchWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a byte capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            objects: Vec::new(),
        }
    }

    /// Append any encodable value
    pub fn write_object<T: BatchEncode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Append a serde object graph, encoded with bincode
    ///
    /// On failure nothing is appended.
    pub fn write_serialized<T: Serialize + ?Sized>(&mut self, value: &T) -> BatchResult<()> {
        let start = self.begin_entry(Tag::Object);
        match bincode::serialize_into(&mut self.bytes, value) {
            Ok(()) => {
                self.end_entry(start);
                Ok(())
            }
            Err(e) => {
                self.bytes.truncate(start);
                Err(CorruptStreamError::Serialization(e.to_string()))
            }
        }
    }

    /// Append a reference to a shared object
    ///
    /// The object itself is moved into the pool, only its index is encoded.
    pub fn write_ref(&mut self, object: ObjectRef) {
        let index = self.objects.len() as u32;
        self.objects.push(object);
        self.write_scalar(Tag::Ref, &index.to_le_bytes());
    }

    /// Append a framed block of entries
    ///
    /// If `f` fails, the writer is rolled back to where the block started
    /// (bytes and pooled objects) and the error is returned.
    pub fn write_block<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Self) -> Result<(), E>,
    {
        let start = self.begin_entry(Tag::Block);
        let pooled = self.objects.len();
        match f(self) {
            Ok(()) => {
                self.end_entry(start);
                Ok(())
            }
            Err(e) => {
                self.bytes.truncate(start);
                self.objects.truncate(pooled);
                Err(e)
            }
        }
    }

    /// Run `f` as an all-or-nothing group of unframed entries
    ///
    /// Like [`write_block`](Self::write_block) without the framing: on
    /// failure everything `f` appended is rolled back.
    pub fn write_atomic<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Self) -> Result<(), E>,
    {
        let start = self.bytes.len();
        let pooled = self.objects.len();
        let result = f(self);
        if result.is_err() {
            self.bytes.truncate(start);
            self.objects.truncate(pooled);
        }
        result
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finish writing
    pub fn finish(self) -> BatchData {
        BatchData {
            bytes: self.bytes,
            objects: self.objects,
        }
    }

    /// Write a fixed-size scalar entry
    pub(crate) fn write_scalar(&mut self, tag: Tag, payload: &[u8]) {
        self.bytes.push(tag as u8);
        self.bytes
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(payload);
    }

    /// Append raw payload bytes inside an open entry
    pub(crate) fn push_raw(&mut self, payload: &[u8]) {
        self.bytes.extend_from_slice(payload);
    }

    /// Open an entry whose length is patched in by [`end_entry`](Self::end_entry)
    pub(crate) fn begin_entry(&mut self, tag: Tag) -> usize {
        let start = self.bytes.len();
        self.bytes.push(tag as u8);
        self.bytes.extend_from_slice(&[0; 4]);
        start
    }

    pub(crate) fn end_entry(&mut self, start: usize) {
        let len = self.bytes.len() - start - ENTRY_HEADER_LEN;
        debug_assert!(len <= u32::MAX as usize, "batch entry larger than 4 GiB");
        self.bytes[start + 1..start + ENTRY_HEADER_LEN].copy_from_slice(&(len as u32).to_le_bytes());
    }
}

impl fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("bytes", &self.bytes.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_layout() {
        let mut writer = BatchWriter::new();
        writer.write_object(&7u32);
        let data = writer.finish();

        assert_eq!(data.bytes(), &[Tag::U32 as u8, 4, 0, 0, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn test_block_rollback() {
        let mut writer = BatchWriter::new();
        writer.write_object(&1u8);
        let before = writer.len();

        let result: Result<(), &str> = writer.write_block(|w| {
            w.write_object("partial");
            w.write_ref(Arc::new(5u32));
            Err("abort")
        });

        assert_eq!(result, Err("abort"));
        assert_eq!(writer.len(), before);
        assert_eq!(writer.finish().object_count(), 0);
    }

    #[test]
    fn test_block_length_patched() {
        let mut writer = BatchWriter::new();
        writer
            .write_block(|w| {
                w.write_object(&true);
                Ok::<(), ()>(())
            })
            .unwrap();
        let data = writer.finish();

        // block header + bool entry (5 + 1)
        assert_eq!(data.bytes()[0], Tag::Block as u8);
        assert_eq!(&data.bytes()[1..5], &6u32.to_le_bytes());
        assert_eq!(data.len(), 11);
    }
}
