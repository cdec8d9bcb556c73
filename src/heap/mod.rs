//! PostgreSQL heap binary format parsing.
//!
//! This module contains types and functions for reading the on-disk
//! structures of PostgreSQL heap relations: page headers and line pointers,
//! heap tuple headers, variable-length datum headers, the per-type value
//! decoders, TOAST chunk reassembly, and the catalog-less drop-scan
//! recovery engine.
//!
//! Start with [`segment::SegmentSet`] to open a relation file, then use
//! [`page::HeapPage`] to inspect individual pages.

pub mod catalog;
pub mod checksum;
pub mod compression;
pub mod constants;
pub mod datetime;
pub mod decode;
pub mod dropscan;
pub mod numeric;
pub mod output;
pub mod page;
pub mod pglz;
pub mod relation;
pub mod segment;
pub mod toast;
pub mod tuple;
pub mod varlena;

use thiserror::Error;

use crate::heap::compression::CompressionMethod;
use crate::PguError;

/// Structural errors raised while walking heap data.
///
/// These are the recoverable, per-page and per-item failure modes. Callers
/// skip the offending page/item (or degrade the affected attribute) and
/// keep going; only [`crate::PguError::Io`] conditions abort an unload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Page header violates the layout invariants.
    #[error("malformed page header")]
    MalformedPage,

    /// Item extends past the page's special space.
    #[error("item overruns page special space")]
    ItemOverrun,

    /// Tuple header offset is out of range or misaligned.
    #[error("bad tuple header offset")]
    BadHoff,

    /// Tuple header itself does not fit in the item.
    #[error("tuple header overruns item")]
    OverrunsItem,

    /// An attribute walk ran past the end of the item.
    #[error("attribute {index} overruns item bounds")]
    AttrOverflow { index: usize },

    /// Variable-length datum header flags collide or the size is absurd.
    #[error("invalid varlena header")]
    BadVarlena,

    /// A compressed payload could not be decompressed.
    #[error("{method} stream invalid")]
    CompressionError { method: CompressionMethod },

    /// No chunks are indexed for the requested TOAST value.
    #[error("toast value {valueid} has no chunks")]
    ToastMissing { valueid: u32 },

    /// Output transcoding hit an unmappable byte.
    #[error("cannot transcode output at byte {offset}")]
    EncodingError { offset: usize },
}

impl From<HeapError> for PguError {
    fn from(e: HeapError) -> Self {
        PguError::Parse(e.to_string())
    }
}
