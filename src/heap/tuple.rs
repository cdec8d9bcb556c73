//! Heap tuple header parsing and attribute walking.
//!
//! Each item on a heap page starts with a 23-byte tuple header followed by
//! an optional null bitmap and the attribute data at `t_hoff`. The walker
//! steps through a [`TabDescriptor`](crate::heap::relation::TabDescriptor)
//! in declaration order, honouring the alignment and length rules each
//! attribute's storage class imposes, and yields one raw slice per
//! attribute. Decoding is a separate concern
//! ([`decode`](crate::heap::decode)).

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::heap::constants::*;
use crate::heap::relation::TabDescriptor;
use crate::heap::varlena;
use crate::heap::HeapError;

/// A `(block, offset)` tuple locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemPointer {
    pub block: u32,
    pub offset: u16,
}

/// Parsed 23-byte tuple header.
#[derive(Debug, Clone, Serialize)]
pub struct TupleHeader {
    /// Inserting transaction ID.
    pub xmin: u32,
    /// Deleting or locking transaction ID.
    pub xmax: u32,
    /// Command ID, or old-style vacuum xid.
    pub cid: u32,
    /// Current TID of this or a newer tuple version.
    pub ctid: ItemPointer,
    /// Attribute count and flags.
    pub infomask2: u16,
    /// Tuple flags.
    pub infomask: u16,
    /// Offset to user data.
    pub hoff: u8,
}

impl TupleHeader {
    /// Parse the fixed header prefix from an item slice.
    pub fn parse(item: &[u8]) -> Result<Self, HeapError> {
        if item.len() < SIZE_TUPLE_HEADER {
            return Err(HeapError::OverrunsItem);
        }
        Ok(TupleHeader {
            xmin: LittleEndian::read_u32(&item[T_XMIN..]),
            xmax: LittleEndian::read_u32(&item[T_XMAX..]),
            cid: LittleEndian::read_u32(&item[T_CID..]),
            ctid: ItemPointer {
                block: (LittleEndian::read_u16(&item[T_CTID..]) as u32) << 16
                    | LittleEndian::read_u16(&item[T_CTID + 2..]) as u32,
                offset: LittleEndian::read_u16(&item[T_CTID + 4..]),
            },
            infomask2: LittleEndian::read_u16(&item[T_INFOMASK2..]),
            infomask: LittleEndian::read_u16(&item[T_INFOMASK..]),
            hoff: item[T_HOFF],
        })
    }

    /// Number of attributes physically present in the tuple.
    pub fn natts(&self) -> usize {
        (self.infomask2 & HEAP_NATTS_MASK) as usize
    }

    /// True when a null bitmap follows the fixed header.
    pub fn has_nulls(&self) -> bool {
        self.infomask & HEAP_HASNULL != 0
    }
}

/// Is attribute `attnum` (0-based) null according to the bitmap?
#[inline]
fn att_isnull(attnum: usize, bits: &[u8]) -> bool {
    bits[attnum >> 3] & (1 << (attnum & 0x07)) == 0
}

/// Result of walking one item against a descriptor.
#[derive(Debug)]
pub struct WalkedTuple<'a> {
    /// Parsed tuple header.
    pub header: TupleHeader,
    /// One entry per descriptor attribute; `None` is NULL.
    pub attrs: Vec<Option<&'a [u8]>>,
    /// Cursor position after the last attribute, relative to the item start.
    pub consumed: usize,
    /// Set when the walk ran past the item bounds at this attribute index;
    /// that attribute and everything after it were reported as NULL.
    pub overflow_at: Option<usize>,
}

impl WalkedTuple<'_> {
    /// True when the walk consumed the item exactly (trailing alignment
    /// padding allowed). This is the drop-scan's primary match criterion.
    pub fn exact_fit(&self, item_len: usize) -> bool {
        self.overflow_at.is_none()
            && (self.consumed == item_len || maxalign(self.consumed) == item_len)
    }
}

/// Walk an item's attributes in declaration order.
///
/// Never reads out of bounds: a header that does not fit is
/// [`HeapError::OverrunsItem`], a bad data offset is [`HeapError::BadHoff`],
/// and an attribute running past the end sets `overflow_at` while the
/// remainder of the row is reported as NULL — callers decide whether a
/// partial row is worth keeping.
pub fn walk_attributes<'a>(
    item: &'a [u8],
    desc: &TabDescriptor,
) -> Result<WalkedTuple<'a>, HeapError> {
    let header = TupleHeader::parse(item)?;
    let natts = header.natts();
    let hoff = header.hoff as usize;

    let bitmap_len = if header.has_nulls() {
        natts.div_ceil(8)
    } else {
        0
    };

    if hoff < SIZE_TUPLE_HEADER + bitmap_len || hoff > item.len() || hoff % MAXIMUM_ALIGNOF != 0 {
        return Err(HeapError::BadHoff);
    }

    let bits = &item[T_BITS..T_BITS + bitmap_len];

    let mut attrs: Vec<Option<&'a [u8]>> = Vec::with_capacity(desc.attrs.len());
    let mut off = hoff;
    let mut overflow_at = None;

    for (i, attr) in desc.attrs.iter().enumerate() {
        // Attributes beyond what the tuple physically stores were added
        // after this row was written; they read as NULL.
        if i >= natts {
            attrs.push(None);
            continue;
        }
        if header.has_nulls() && att_isnull(i, bits) {
            attrs.push(None);
            continue;
        }

        // Alignment: a varlena whose current byte is non-zero starts
        // immediately (it is either a short header or the first byte of an
        // unaligned 4-byte header); a zero byte there is alignment padding.
        if attr.typlen == -1 {
            if off >= item.len() {
                overflow_at = Some(i);
                break;
            }
            if item[off] == 0 {
                off = typealign(alignof_code(attr.typalign), off);
            }
        } else {
            off = typealign(alignof_code(attr.typalign), off);
        }

        if off >= item.len() {
            overflow_at = Some(i);
            break;
        }

        let len = match attr.typlen {
            -1 => match varlena::total_size(&item[off..]) {
                Ok(l) => l,
                Err(_) => {
                    overflow_at = Some(i);
                    break;
                }
            },
            -2 => {
                // C string: bytes up to and including the NUL terminator.
                match item[off..].iter().position(|&b| b == 0) {
                    Some(p) => p + 1,
                    None => {
                        overflow_at = Some(i);
                        break;
                    }
                }
            }
            n if n > 0 => n as usize,
            _ => return Err(HeapError::BadHoff),
        };

        if off + len > item.len() {
            overflow_at = Some(i);
            break;
        }

        attrs.push(Some(&item[off..off + len]));
        off += len;
    }

    // Fill the remainder with best-effort NULLs after an overflow.
    while attrs.len() < desc.attrs.len() {
        attrs.push(None);
    }

    Ok(WalkedTuple {
        header,
        attrs,
        consumed: off,
        overflow_at,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Byte builders for tuple fixtures, shared by the decoder and
    //! drop-scan unit tests.

    use super::*;

    /// Assemble an item: 23-byte header, optional null bitmap, padding to
    /// `hoff`, then each present attribute aligned per the descriptor.
    pub fn build_tuple(desc: &TabDescriptor, values: &[Option<Vec<u8>>]) -> Vec<u8> {
        let natts = values.len();
        let has_nulls = values.iter().any(|v| v.is_none());
        let bitmap_len = if has_nulls { natts.div_ceil(8) } else { 0 };
        let hoff = maxalign(SIZE_TUPLE_HEADER + bitmap_len);

        let mut item = vec![0u8; hoff];
        LittleEndian::write_u32(&mut item[T_XMIN..], 100);
        LittleEndian::write_u16(
            &mut item[T_INFOMASK2..],
            natts as u16 & HEAP_NATTS_MASK,
        );
        let mut infomask = 0u16;
        if has_nulls {
            infomask |= HEAP_HASNULL;
        }
        LittleEndian::write_u16(&mut item[T_INFOMASK..], infomask);
        item[T_HOFF] = hoff as u8;

        if has_nulls {
            for (i, v) in values.iter().enumerate() {
                if v.is_some() {
                    item[T_BITS + (i >> 3)] |= 1 << (i & 0x07);
                }
            }
        }

        for (i, v) in values.iter().enumerate() {
            let Some(bytes) = v else { continue };
            let attr = &desc.attrs[i];
            let unaligned_varlena = attr.typlen == -1 && bytes.first().copied() != Some(0);
            if !unaligned_varlena {
                let target = typealign(alignof_code(attr.typalign), item.len());
                item.resize(target, 0);
            }
            item.extend_from_slice(bytes);
        }
        item
    }

    /// Little-endian i32 bytes.
    pub fn le32(v: i32) -> Vec<u8> {
        let mut b = vec![0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        b
    }

    /// Little-endian i64 bytes.
    pub fn le64(v: i64) -> Vec<u8> {
        let mut b = vec![0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        b
    }

    /// A short-header varlena wrapping `data` (data must stay under 127
    /// total bytes).
    pub fn short_varlena(data: &[u8]) -> Vec<u8> {
        let total = data.len() + 1;
        assert!(total <= 0x7F);
        let mut out = vec![((total as u8) << 1) | 0x01];
        out.extend_from_slice(data);
        out
    }

    /// A 4-byte-header varlena wrapping `data`.
    pub fn inline_varlena(data: &[u8]) -> Vec<u8> {
        let mut out = varlena::set_varsize(data.len() + VARHDRSZ).to_vec();
        out.extend_from_slice(data);
        out
    }
}
