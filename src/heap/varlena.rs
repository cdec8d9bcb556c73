//! Variable-length datum header discipline.
//!
//! Every varlena value starts with a header byte that encodes how it is
//! stored. The rules, applied in order on the first byte:
//!
//! - `b0 & 1 == 0` — 4-byte header; total size is the little-endian word
//!   shifted right by 2. If additionally `b0 & 3 == 2`, the payload is
//!   compressed in line and a `tcinfo` word (raw size + method) follows.
//! - `b0 == 0x01` — external datum: a tag byte follows, then the
//!   tag-specific payload. Only the on-disk TOAST tag is recoverable
//!   offline.
//! - any other odd `b0` — short inline: total size is `(b0 >> 1) & 0x7F`,
//!   data begins at the next byte.
//!
//! Nothing here materialises structs over the raw bytes; all access is by
//! checked accessor.

use byteorder::{ByteOrder, LittleEndian};

use crate::heap::compression::CompressionMethod;
use crate::heap::constants::*;
use crate::heap::HeapError;

/// A classified varlena value borrowed from an item.
#[derive(Debug, Clone)]
pub enum Varlena<'a> {
    /// 4-byte header, payload stored plain.
    Inline { data: &'a [u8] },
    /// 4-byte header, payload compressed in line.
    Compressed {
        /// Uncompressed payload size (excludes any header).
        rawsize: u32,
        method: CompressionMethod,
        data: &'a [u8],
    },
    /// 1-byte short header, payload stored plain and possibly unaligned.
    Short { data: &'a [u8] },
    /// External pointer; the value lives in the TOAST sibling relation.
    External(ExternalPointer),
}

/// On-disk TOAST pointer (tag 18).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalPointer {
    /// Original datum size including the 4-byte varlena header.
    pub rawsize: i32,
    /// Saved size (low 30 bits) and compression method (high 2 bits).
    pub extinfo: u32,
    /// Value ID within the TOAST relation.
    pub valueid: u32,
    /// OID of the TOAST relation holding the chunks.
    pub toastrelid: u32,
}

impl ExternalPointer {
    /// Bytes stored in the TOAST relation for this value.
    pub fn extsize(&self) -> u32 {
        self.extinfo & VARLENA_EXTSIZE_MASK
    }

    /// True when the stored bytes are compressed.
    pub fn is_compressed(&self) -> bool {
        (self.extsize() as i64) < self.rawsize as i64 - VARHDRSZ as i64
    }

    /// Compression method recorded in the pointer.
    pub fn method(&self) -> Result<CompressionMethod, HeapError> {
        CompressionMethod::from_bits(self.extinfo >> VARLENA_EXTSIZE_BITS)
    }
}

/// Total on-disk size of the varlena starting at `raw[0]`, header included.
///
/// This is what the attribute walker advances the cursor by.
pub fn total_size(raw: &[u8]) -> Result<usize, HeapError> {
    let b0 = *raw.first().ok_or(HeapError::BadVarlena)?;

    if b0 == 0x01 {
        // external: marker byte, tag byte, tag-specific payload
        let tag = *raw.get(1).ok_or(HeapError::BadVarlena)?;
        let payload = match tag {
            VARTAG_ONDISK => SIZE_VARATT_EXTERNAL,
            VARTAG_INDIRECT => std::mem::size_of::<usize>(),
            VARTAG_EXPANDED_RO | VARTAG_EXPANDED_RW => std::mem::size_of::<usize>(),
            _ => return Err(HeapError::BadVarlena),
        };
        return Ok(VARHDRSZ_EXTERNAL + payload);
    }

    if b0 & 0x01 == 0x01 {
        let size = ((b0 >> 1) & 0x7F) as usize;
        if size < VARHDRSZ_SHORT {
            return Err(HeapError::BadVarlena);
        }
        return Ok(size);
    }

    if raw.len() < VARHDRSZ {
        return Err(HeapError::BadVarlena);
    }
    let size = ((LittleEndian::read_u32(raw) >> 2) & VARLENA_EXTSIZE_MASK) as usize;
    if size < VARHDRSZ {
        return Err(HeapError::BadVarlena);
    }
    Ok(size)
}

/// Classify a varlena and borrow its payload.
///
/// `raw` must hold the complete value (the walker guarantees this by
/// checking [`total_size`] against the item bounds first).
pub fn parse(raw: &[u8]) -> Result<Varlena<'_>, HeapError> {
    let b0 = *raw.first().ok_or(HeapError::BadVarlena)?;

    if b0 == 0x01 {
        let tag = *raw.get(1).ok_or(HeapError::BadVarlena)?;
        if tag != VARTAG_ONDISK {
            // Indirect and expanded datums only exist in memory; finding
            // one on disk means the header is garbage.
            return Err(HeapError::BadVarlena);
        }
        if raw.len() < VARHDRSZ_EXTERNAL + SIZE_VARATT_EXTERNAL {
            return Err(HeapError::BadVarlena);
        }
        let p = &raw[VARHDRSZ_EXTERNAL..];
        return Ok(Varlena::External(ExternalPointer {
            rawsize: LittleEndian::read_i32(&p[0..4]),
            extinfo: LittleEndian::read_u32(&p[4..8]),
            valueid: LittleEndian::read_u32(&p[8..12]),
            toastrelid: LittleEndian::read_u32(&p[12..16]),
        }));
    }

    if b0 & 0x01 == 0x01 {
        let size = ((b0 >> 1) & 0x7F) as usize;
        if size < VARHDRSZ_SHORT || size > raw.len() {
            return Err(HeapError::BadVarlena);
        }
        return Ok(Varlena::Short {
            data: &raw[VARHDRSZ_SHORT..size],
        });
    }

    if raw.len() < VARHDRSZ {
        return Err(HeapError::BadVarlena);
    }
    let size = ((LittleEndian::read_u32(raw) >> 2) & VARLENA_EXTSIZE_MASK) as usize;
    if size < VARHDRSZ || size > raw.len() {
        return Err(HeapError::BadVarlena);
    }

    if b0 & 0x03 == 0x02 {
        // compressed in line: tcinfo word precedes the stream
        if size < VARHDRSZ_COMPRESSED {
            return Err(HeapError::BadVarlena);
        }
        let tcinfo = LittleEndian::read_u32(&raw[VARHDRSZ..VARHDRSZ + 4]);
        let method = CompressionMethod::from_bits(tcinfo >> VARLENA_EXTSIZE_BITS)?;
        return Ok(Varlena::Compressed {
            rawsize: tcinfo & VARLENA_EXTSIZE_MASK,
            method,
            data: &raw[VARHDRSZ_COMPRESSED..size],
        });
    }

    Ok(Varlena::Inline {
        data: &raw[VARHDRSZ..size],
    })
}

/// Build a 4-byte varlena header word for `total_len` (test fixtures and
/// round-trip checks).
pub fn set_varsize(total_len: usize) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, (total_len as u32) << 2);
    buf
}
