//! Entry type tags

use core::fmt;

/// Type tag written in front of every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Bool = 1,
    U8 = 2,
    U32 = 3,
    U64 = 4,
    I32 = 5,
    I64 = 6,
    F32 = 7,
    F64 = 8,
    /// UTF-8 string
    Str = 16,
    /// `u32` element count followed by nested entries
    Array = 17,
    /// Empty payload for `None`, one nested entry for `Some`
    Option = 18,
    /// bincode-encoded serde object graph
    Object = 32,
    /// `u32` index into the batch's object pool
    Ref = 33,
    /// Framed group of nested entries
    Block = 34,
}

impl Tag {
    /// Decode a tag byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Self::Bool,
            2 => Self::U8,
            3 => Self::U32,
            4 => Self::U64,
            5 => Self::I32,
            6 => Self::I64,
            7 => Self::F32,
            8 => Self::F64,
            16 => Self::Str,
            17 => Self::Array,
            18 => Self::Option,
            32 => Self::Object,
            33 => Self::Ref,
            34 => Self::Block,
            _ => return None,
        })
    }

    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "string",
            Self::Array => "array",
            Self::Option => "option",
            Self::Object => "object",
            Self::Ref => "ref",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
