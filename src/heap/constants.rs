//! PostgreSQL page and tuple structure constants.
//!
//! These values are derived from the PostgreSQL source headers:
//! - `bufpage.h` (page header, line pointers)
//! - `htup_details.h` (heap tuple header, infomask bits)
//! - `varatt.h` (variable-length datum headers)

// ── Block layout ────────────────────────────────────────────────────

/// PostgreSQL block size. Fixed at compile time in the server; every
/// supported deployment uses the default.
pub const BLCKSZ: usize = 8192;
/// Size of the fixed page header before the line pointer array.
pub const SIZE_PAGE_HEADER: usize = 24;
/// Size of one line pointer (packed into a single u32).
pub const SIZE_LINE_POINTER: usize = 4;
/// Segment files are capped at 1 GiB; larger relations continue in `.N` files.
pub const SEGMENT_SIZE: u64 = 1 << 30;
/// Blocks per 1 GiB segment.
pub const BLOCKS_PER_SEGMENT: u64 = SEGMENT_SIZE / BLCKSZ as u64;

// ── Page header field offsets ───────────────────────────────────────

/// LSN of the last WAL record touching this page (u32 hi + u32 lo). 8 bytes.
pub const PD_LSN: usize = 0;
/// Data checksum, or zero when checksums are disabled. 2 bytes.
pub const PD_CHECKSUM: usize = 8;
/// Page flag bits. 2 bytes.
pub const PD_FLAGS: usize = 10;
/// Offset to start of free space (end of line pointer array). 2 bytes.
pub const PD_LOWER: usize = 12;
/// Offset to end of free space (start of tuple data). 2 bytes.
pub const PD_UPPER: usize = 14;
/// Offset to start of special space. 2 bytes.
pub const PD_SPECIAL: usize = 16;
/// Page size and layout version packed together. 2 bytes.
pub const PD_PAGESIZE_VERSION: usize = 18;
/// Oldest prunable XID on the page, or zero. 4 bytes.
pub const PD_PRUNE_XID: usize = 20;

/// Valid pd_flags bits.
pub const PD_HAS_FREE_LINES: u16 = 0x0001;
pub const PD_PAGE_FULL: u16 = 0x0002;
pub const PD_ALL_VISIBLE: u16 = 0x0004;
pub const PD_VALID_FLAG_BITS: u16 = 0x0007;

// ── Line pointer states ─────────────────────────────────────────────

/// Unused slot (lp_len is always zero).
pub const LP_UNUSED: u8 = 0;
/// Used slot pointing at tuple storage (lp_len > 0).
pub const LP_NORMAL: u8 = 1;
/// HOT redirect to another slot (lp_len = 0).
pub const LP_REDIRECT: u8 = 2;
/// Dead slot, storage may or may not remain.
pub const LP_DEAD: u8 = 3;

// ── Heap tuple header field offsets (23-byte fixed prefix) ──────────

/// Inserting transaction ID. 4 bytes.
pub const T_XMIN: usize = 0;
/// Deleting or locking transaction ID. 4 bytes.
pub const T_XMAX: usize = 4;
/// Command ID, or old-style VACUUM FULL xid. 4 bytes.
pub const T_CID: usize = 8;
/// Current TID of this or newer tuple (block hi u16, block lo u16, posid u16).
pub const T_CTID: usize = 12;
/// Attribute count plus flag bits. 2 bytes.
pub const T_INFOMASK2: usize = 18;
/// Tuple flag bits. 2 bytes.
pub const T_INFOMASK: usize = 20;
/// Offset to user data, includes null bitmap and padding. 1 byte.
pub const T_HOFF: usize = 22;
/// Start of the null bitmap when present.
pub const T_BITS: usize = 23;
/// Size of the fixed tuple header prefix.
pub const SIZE_TUPLE_HEADER: usize = 23;

/// infomask: tuple has null attribute(s), null bitmap follows the header.
pub const HEAP_HASNULL: u16 = 0x0001;
/// infomask2: number of attributes is the low 11 bits.
pub const HEAP_NATTS_MASK: u16 = 0x07FF;
/// infomask: t_xmax is a MultiXactId rather than a plain xid.
pub const HEAP_XMAX_IS_MULTI: u16 = 0x1000;

// ── Alignment ───────────────────────────────────────────────────────

/// Maximum alignment used by the on-disk format.
pub const MAXIMUM_ALIGNOF: usize = 8;

/// Round `len` up to a multiple of `alignval` (power of two).
#[inline]
pub fn typealign(alignval: usize, len: usize) -> usize {
    (len + alignval - 1) & !(alignval - 1)
}

/// Round `len` up to the maximum alignment.
#[inline]
pub fn maxalign(len: usize) -> usize {
    typealign(MAXIMUM_ALIGNOF, len)
}

/// Byte width of a `typalign` code (`c`, `s`, `i`, `d`).
#[inline]
pub fn alignof_code(code: u8) -> usize {
    match code {
        b'c' => 1,
        b's' => 2,
        b'i' => 4,
        b'd' => 8,
        _ => 1,
    }
}

// ── Varlena headers ─────────────────────────────────────────────────

/// 4-byte varlena header size.
pub const VARHDRSZ: usize = 4;
/// 1-byte short varlena header size.
pub const VARHDRSZ_SHORT: usize = 1;
/// External pointer header size (marker byte + tag byte).
pub const VARHDRSZ_EXTERNAL: usize = 2;
/// Compressed inline header size (length word + tcinfo word).
pub const VARHDRSZ_COMPRESSED: usize = 8;
/// Low bits of extinfo/tcinfo hold the external/compressed size.
pub const VARLENA_EXTSIZE_BITS: u32 = 30;
pub const VARLENA_EXTSIZE_MASK: u32 = (1 << VARLENA_EXTSIZE_BITS) - 1;

/// External datum tag values.
pub const VARTAG_INDIRECT: u8 = 1;
pub const VARTAG_EXPANDED_RO: u8 = 2;
pub const VARTAG_EXPANDED_RW: u8 = 3;
pub const VARTAG_ONDISK: u8 = 18;

/// Payload bytes of an on-disk external pointer (rawsize, extinfo,
/// valueid, toastrelid — four 32-bit fields).
pub const SIZE_VARATT_EXTERNAL: usize = 16;

// ── Epoch constants (date/time decoding) ────────────────────────────

/// Julian day number of 2000-01-01, the PostgreSQL epoch.
pub const POSTGRES_EPOCH_JDATE: i64 = 2_451_545;
/// Julian day number of 1970-01-01.
pub const UNIX_EPOCH_JDATE: i64 = 2_440_588;
pub const SECS_PER_DAY: i64 = 86_400;
pub const USECS_PER_DAY: i64 = 86_400_000_000;
pub const USECS_PER_HOUR: i64 = 3_600_000_000;
pub const USECS_PER_MINUTE: i64 = 60_000_000;
pub const USECS_PER_SEC: i64 = 1_000_000;

// ── Recovery heuristics ─────────────────────────────────────────────

/// Pages without a match tolerated before the drop-scan closes its window.
pub const CONSECUTIVE_UNMATCHED_LIMIT: u32 = 20;
/// A run of this many consecutive ASCII zeros marks a row as gibberish.
pub const INVALID_CONSECUTIVE_ZERO: usize = 20;
/// Inputs above this size are worth splitting across worker threads.
pub const MIN_SIZE_FOR_THREADING: u64 = 10 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(maxalign(0), 0);
        assert_eq!(maxalign(1), 8);
        assert_eq!(maxalign(8), 8);
        assert_eq!(maxalign(23), 24);
        assert_eq!(typealign(4, 5), 8);
        assert_eq!(typealign(2, 5), 6);
        assert_eq!(typealign(1, 5), 5);
    }

    #[test]
    fn test_alignof_codes() {
        assert_eq!(alignof_code(b'c'), 1);
        assert_eq!(alignof_code(b's'), 2);
        assert_eq!(alignof_code(b'i'), 4);
        assert_eq!(alignof_code(b'd'), 8);
    }

    #[test]
    fn test_block_geometry() {
        assert_eq!(BLOCKS_PER_SEGMENT, 131072);
        assert_eq!(BLCKSZ % (4 * 32), 0);
    }
}
