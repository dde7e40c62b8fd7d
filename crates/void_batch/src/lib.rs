//! # Void Batch - Binary Batch Stream
//!
//! The transport encoding between the mutation thread and the render
//! thread. A client object serializes its changes into a [`BatchWriter`];
//! the finished [`BatchData`] crosses the thread boundary by value and a
//! [`BatchReader`] on the render side decodes it entry by entry.
//!
//! ## Entry format
//!
//! ```text
//! ┌─────┬────────────┬──────────────────────┐
//! │ tag │ len (u32)  │ payload (len bytes)  │
//! └─────┴────────────┴──────────────────────┘
//! ```
//!
//! Payloads are little-endian scalars, UTF-8 strings, nested entries
//! (arrays, options, blocks), bincode-encoded object graphs, or an index
//! into the object pool that travels alongside the bytes.
//!
//! ## Key Concepts
//!
//! - **Single pass**: cursors only move forward, entries come back in the
//!   order they were written
//! - **Schema-less**: the reader trusts the writer's tags, and any mismatch
//!   is a [`CorruptStreamError`]
//! - **Blocks**: a framed group of entries. A failure inside a block can be
//!   contained to that block, since the outer cursor already moved past it

pub mod error;
pub mod reader;
pub mod tag;
pub mod value;
pub mod writer;

pub use error::{BatchResult, CorruptStreamError};
pub use reader::BatchReader;
pub use tag::Tag;
pub use value::{BatchDecode, BatchEncode};
pub use writer::{BatchData, BatchWriter, ObjectRef};

/// Size of an entry header: one tag byte plus a `u32` payload length
pub const ENTRY_HEADER_LEN: usize = 5;
