//! PostgreSQL heap file analysis toolkit.
//!
//! The `pgheap-utils` crate (library name `pgu`) provides Rust types and
//! functions for reading PostgreSQL heap relation files offline: parsing
//! 8 KiB pages, walking line pointers and tuples, decoding attribute values
//! into their canonical text form, reassembling TOASTed values from a
//! sibling relation, and salvaging rows from files the catalog no longer
//! references (dropped or truncated tables).
//!
//! The tool never talks to a running server and never writes into database
//! files. Everything works from the raw segment files of an offline (or
//! crashed) cluster.
//!
//! # CLI Reference
//!
//! The `pgdu` binary exposes the library through subcommands:
//!
//! | Command | Purpose |
//! |---------|---------|
//! | [`pgdu pages`](cli::app::Commands::Pages) | Parse page headers and show a per-page structure summary |
//! | [`pgdu checksum`](cli::app::Commands::Checksum) | Recompute and compare data checksums for every page |
//! | [`pgdu unload`](cli::app::Commands::Unload) | Decode every row of a relation into INSERT or CSV form |
//! | [`pgdu dropscan`](cli::app::Commands::Dropscan) | Salvage rows from a raw file without catalog metadata |
//!
//! All subcommands accept `--color <auto|always|never>` and `--output <file>`.
//! `unload` and `dropscan` write their artifacts under a `restore/` run
//! directory compatible with `COPY ... FROM` re-import.
//!
//! # Library API
//!
//! ```no_run
//! use pgu::heap::segment::SegmentSet;
//! use pgu::heap::page::{HeapPage, OpenedPage};
//! use pgu::heap::relation::TabDescriptor;
//! use pgu::heap::tuple::walk_attributes;
//!
//! let mut seg = SegmentSet::open("base/16384/24576").unwrap();
//! let desc = TabDescriptor::from_types("employee", &["int", "varchar"]).unwrap();
//!
//! let block = seg.read_block(0).unwrap();
//! if let OpenedPage::Heap(page) = HeapPage::open(&block).unwrap() {
//!     for (slot, lp) in page.items() {
//!         if let Ok(item) = page.item_bytes(&lp) {
//!             let walked = walk_attributes(item, &desc).unwrap();
//!             println!("slot {}: {} attributes", slot, walked.attrs.len());
//!         }
//!     }
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`heap::segment`] | Segment file I/O (base file + 1 GiB `.N` continuations) |
//! | [`heap::page`] | Page header validation and line-pointer iteration |
//! | [`heap::checksum`] | FNV-1a data page checksum (32 parallel lanes) |
//! | [`heap::tuple`] | Heap tuple header and attribute walking |
//! | [`heap::varlena`] | Variable-length datum header discipline |
//! | [`heap::decode`] | Per-type value decoders producing canonical text |
//! | [`heap::numeric`] | Arbitrary-precision numeric rendering |
//! | [`heap::datetime`] | Date/time epoch conversion and ISO 8601 rendering |
//! | [`heap::pglz`] | PGLZ (LZ77 family) decompression |
//! | [`heap::compression`] | Compression method dispatch (PGLZ, LZ4) |
//! | [`heap::toast`] | TOAST chunk indexing, grouping, and reassembly |
//! | [`heap::catalog`] | Catalog text dump parsing and version column tables |
//! | [`heap::relation`] | Table descriptors and the per-type storage table |
//! | [`heap::output`] | INSERT/CSV rendering, transcoding, gibberish filter |
//! | [`heap::dropscan`] | Catalog-less recovery scan engine |

#[cfg(feature = "cli")]
pub mod cli;
pub mod heap;
pub mod util;

use thiserror::Error;

/// Errors returned by `pgu` operations.
#[derive(Error, Debug)]
pub enum PguError {
    /// An I/O error occurred (file open, read, seek, or write failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// A parse error occurred (malformed binary data or unexpected values).
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid argument was supplied (unknown type name, bad option, etc.).
    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl From<std::io::Error> for PguError {
    fn from(e: std::io::Error) -> Self {
        PguError::Io(e.to_string())
    }
}
