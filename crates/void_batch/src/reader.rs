//! Batch reader

use crate::error::{BatchResult, CorruptStreamError};
use crate::tag::Tag;
use crate::value::BatchDecode;
use crate::writer::{BatchData, ObjectRef};
use crate::ENTRY_HEADER_LEN;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The payload of one entry
#[derive(Clone, Copy)]
pub(crate) struct Payload<'a> {
    pub(crate) bytes: &'a [u8],
    /// Absolute offset of the payload's first byte
    pub(crate) offset: usize,
}

/// Consumes entries from a batch stream, in write order
#[derive(Clone)]
pub struct BatchReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Absolute offset of `bytes[0]`
    base: usize,
    objects: &'a [ObjectRef],
}

impl<'a> BatchReader<'a> {
    /// Read a finished batch
    pub fn new(data: &'a BatchData) -> Self {
        Self::from_parts(&data.bytes, &data.objects)
    }

    /// Read raw bytes with an object pool
    pub fn from_parts(bytes: &'a [u8], objects: &'a [ObjectRef]) -> Self {
        Self {
            bytes,
            pos: 0,
            base: 0,
            objects,
        }
    }

    /// Check if every entry has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Unread bytes
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Absolute offset of the cursor
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Tag of the next entry, without consuming it
    pub fn peek_tag(&self) -> BatchResult<Tag> {
        let byte = *self.bytes.get(self.pos).ok_or_else(|| self.unexpected_end(1))?;
        Tag::from_byte(byte).ok_or(CorruptStreamError::UnknownTag {
            offset: self.position(),
            tag: byte,
        })
    }

    /// Decode the next entry as `T`
    pub fn read_object<T: BatchDecode>(&mut self) -> BatchResult<T> {
        T::decode(self)
    }

    /// Decode the next entry as a bincode-encoded serde object graph
    pub fn read_serialized<T: DeserializeOwned>(&mut self) -> BatchResult<T> {
        let payload = self.read_payload(Tag::Object)?;
        bincode::deserialize(payload.bytes)
            .map_err(|e| CorruptStreamError::Serialization(e.to_string()))
    }

    /// Resolve the next entry as a reference into the object pool
    pub fn read_ref<T: Any + Send + Sync>(&mut self) -> BatchResult<Arc<T>> {
        let index = self.read_ref_index()?;
        let object = self
            .objects
            .get(index)
            .ok_or(CorruptStreamError::BadReference {
                index,
                available: self.objects.len(),
            })?;

        Arc::clone(object)
            .downcast::<T>()
            .map_err(|_| CorruptStreamError::ReferenceType {
                index,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Enter the next block
    ///
    /// The returned reader covers only the block's entries. This reader
    /// moves past the whole block immediately, so a failure while decoding
    /// the block does not affect what comes after it.
    pub fn read_block(&mut self) -> BatchResult<BatchReader<'a>> {
        let payload = self.read_payload(Tag::Block)?;
        Ok(self.nested(payload))
    }

    /// Skip the next entry, whatever it is
    pub fn skip_entry(&mut self) -> BatchResult<Tag> {
        let (tag, _) = self.read_any()?;
        Ok(tag)
    }

    /// Fail if unread bytes remain
    pub fn expect_end(&self) -> BatchResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CorruptStreamError::Invalid {
                offset: self.position(),
                message: format!("{} trailing bytes", self.remaining()),
            })
        }
    }

    fn read_ref_index(&mut self) -> BatchResult<usize> {
        let payload = self.read_payload(Tag::Ref)?;
        let raw: [u8; 4] = payload
            .bytes
            .try_into()
            .map_err(|_| CorruptStreamError::BadLength {
                offset: payload.offset,
                tag: Tag::Ref,
                len: payload.bytes.len(),
            })?;
        Ok(u32::from_le_bytes(raw) as usize)
    }

    /// Consume the next entry, which must carry `expected`
    pub(crate) fn read_payload(&mut self, expected: Tag) -> BatchResult<Payload<'a>> {
        let offset = self.position();
        let found = self.peek_tag()?;
        if found != expected {
            return Err(CorruptStreamError::TagMismatch {
                offset,
                expected,
                found,
            });
        }
        let (_, payload) = self.read_any()?;
        Ok(payload)
    }

    /// Consume the next entry, whatever its tag
    pub(crate) fn read_any(&mut self) -> BatchResult<(Tag, Payload<'a>)> {
        let tag = self.peek_tag()?;
        let header = self.take(ENTRY_HEADER_LEN)?;
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let offset = self.position();
        let bytes = self.take(len)?;
        Ok((tag, Payload { bytes, offset }))
    }

    /// Reader over a nested payload
    pub(crate) fn nested(&self, payload: Payload<'a>) -> BatchReader<'a> {
        BatchReader {
            bytes: payload.bytes,
            pos: 0,
            base: payload.offset,
            objects: self.objects,
        }
    }

    fn take(&mut self, len: usize) -> BatchResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.unexpected_end(len));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn unexpected_end(&self, needed: usize) -> CorruptStreamError {
        CorruptStreamError::UnexpectedEnd {
            offset: self.position(),
            needed,
            remaining: self.remaining(),
        }
    }
}

impl fmt::Debug for BatchReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchReader")
            .field("position", &self.position())
            .field("remaining", &self.remaining())
            .field("objects", &self.objects.len())
            .finish()
    }
}
