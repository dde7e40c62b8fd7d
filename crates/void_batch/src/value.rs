//! Typed encoding of values into batch entries
//!
//! [`BatchEncode`] / [`BatchDecode`] are implemented for scalars, strings,
//! variable and fixed-size arrays, and optionals. Arbitrary object graphs
//! go through [`BatchWriter::write_serialized`] instead.

use crate::error::{BatchResult, CorruptStreamError};
use crate::reader::BatchReader;
use crate::tag::Tag;
use crate::writer::BatchWriter;

/// A value that can be appended to a batch stream
pub trait BatchEncode {
    /// Append this value as one entry
    fn encode(&self, writer: &mut BatchWriter);
}

/// A value that can be read back from a batch stream
pub trait BatchDecode: Sized {
    /// Consume one entry and decode it
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self>;
}

macro_rules! scalar {
    ($ty:ty, $tag:expr) => {
        impl BatchEncode for $ty {
            fn encode(&self, writer: &mut BatchWriter) {
                writer.write_scalar($tag, &self.to_le_bytes());
            }
        }

        impl BatchDecode for $ty {
            fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
                let payload = reader.read_payload($tag)?;
                let raw = payload
                    .bytes
                    .try_into()
                    .map_err(|_| CorruptStreamError::BadLength {
                        offset: payload.offset,
                        tag: $tag,
                        len: payload.bytes.len(),
                    })?;
                Ok(<$ty>::from_le_bytes(raw))
            }
        }
    };
}

scalar!(u8, Tag::U8);
scalar!(u32, Tag::U32);
scalar!(u64, Tag::U64);
scalar!(i32, Tag::I32);
scalar!(i64, Tag::I64);
scalar!(f32, Tag::F32);
scalar!(f64, Tag::F64);

impl BatchEncode for bool {
    fn encode(&self, writer: &mut BatchWriter) {
        writer.write_scalar(Tag::Bool, &[u8::from(*self)]);
    }
}

impl BatchDecode for bool {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        let payload = reader.read_payload(Tag::Bool)?;
        match payload.bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(CorruptStreamError::Invalid {
                offset: payload.offset,
                message: format!("bool byte {other}"),
            }),
            bytes => Err(CorruptStreamError::BadLength {
                offset: payload.offset,
                tag: Tag::Bool,
                len: bytes.len(),
            }),
        }
    }
}

impl BatchEncode for str {
    fn encode(&self, writer: &mut BatchWriter) {
        writer.write_scalar(Tag::Str, self.as_bytes());
    }
}

impl BatchEncode for String {
    fn encode(&self, writer: &mut BatchWriter) {
        self.as_str().encode(writer);
    }
}

impl BatchDecode for String {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        let payload = reader.read_payload(Tag::Str)?;
        std::str::from_utf8(payload.bytes)
            .map(str::to_owned)
            .map_err(|_| CorruptStreamError::InvalidUtf8 {
                offset: payload.offset,
            })
    }
}

impl<T: BatchEncode> BatchEncode for [T] {
    fn encode(&self, writer: &mut BatchWriter) {
        let start = writer.begin_entry(Tag::Array);
        writer.push_raw(&(self.len() as u32).to_le_bytes());
        for item in self {
            item.encode(writer);
        }
        writer.end_entry(start);
    }
}

impl<T: BatchEncode> BatchEncode for Vec<T> {
    fn encode(&self, writer: &mut BatchWriter) {
        self.as_slice().encode(writer);
    }
}

impl<T: BatchDecode> BatchDecode for Vec<T> {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        let payload = reader.read_payload(Tag::Array)?;
        if payload.bytes.len() < 4 {
            return Err(CorruptStreamError::BadLength {
                offset: payload.offset,
                tag: Tag::Array,
                len: payload.bytes.len(),
            });
        }
        let (count, items) = payload.bytes.split_at(4);
        let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;

        let mut nested = reader.nested(crate::reader::Payload {
            bytes: items,
            offset: payload.offset + 4,
        });
        // Each element takes at least a header, which bounds the allocation
        let mut values = Vec::with_capacity(count.min(items.len() / crate::ENTRY_HEADER_LEN));
        for _ in 0..count {
            values.push(T::decode(&mut nested)?);
        }
        nested.expect_end()?;
        Ok(values)
    }
}

impl<T: BatchEncode, const N: usize> BatchEncode for [T; N] {
    fn encode(&self, writer: &mut BatchWriter) {
        self.as_slice().encode(writer);
    }
}

impl<T: BatchDecode, const N: usize> BatchDecode for [T; N] {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        let values = Vec::<T>::decode(reader)?;
        let found = values.len();
        values
            .try_into()
            .map_err(|_| CorruptStreamError::ArrayLength { expected: N, found })
    }
}

impl<T: BatchEncode> BatchEncode for Option<T> {
    fn encode(&self, writer: &mut BatchWriter) {
        let start = writer.begin_entry(Tag::Option);
        if let Some(value) = self {
            value.encode(writer);
        }
        writer.end_entry(start);
    }
}

impl<T: BatchDecode> BatchDecode for Option<T> {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        let payload = reader.read_payload(Tag::Option)?;
        if payload.bytes.is_empty() {
            return Ok(None);
        }
        let mut nested = reader.nested(payload);
        let value = T::decode(&mut nested)?;
        nested.expect_end()?;
        Ok(Some(value))
    }
}

impl<T: BatchEncode + ?Sized> BatchEncode for &T {
    fn encode(&self, writer: &mut BatchWriter) {
        (**self).encode(writer);
    }
}
