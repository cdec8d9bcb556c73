//! PGLZ decompression.
//!
//! PostgreSQL's in-line and TOAST compression is a byte-oriented LZ77
//! variant. The stream is a sequence of control bytes, each governing the
//! next eight items LSB-first: a clear bit means one literal byte, a set
//! bit a back-reference of 2–3 bytes encoding a match into the output
//! produced so far:
//!
//! ```text
//! byte 0: oooo llll   o = offset bits 8..11, l = length - 3 (0..15)
//! byte 1: oooo oooo   offset bits 0..7 (1..4095)
//! byte 2: eeee eeee   only when l == 15: extra length (length = 18 + e)
//! ```
//!
//! Matches may overlap their own output, so the copy is byte-at-a-time.
//! The decompressor is deliberately strict: an offset reaching before the
//! start of the output window, or a stream that does not produce exactly
//! the expected number of bytes, is corrupt.

use crate::heap::compression::CompressionMethod;
use crate::heap::HeapError;

/// Maximum match offset the format can express.
const PGLZ_MAX_OFFSET: usize = 4095;

fn corrupt() -> HeapError {
    HeapError::CompressionError {
        method: CompressionMethod::Pglz,
    }
}

/// Decompress a PGLZ stream into exactly `rawsize` bytes.
pub fn decompress(src: &[u8], rawsize: usize) -> Result<Vec<u8>, HeapError> {
    let mut dst: Vec<u8> = Vec::with_capacity(rawsize);
    let mut sp = 0;

    while sp < src.len() && dst.len() < rawsize {
        let ctrl = src[sp];
        sp += 1;

        let mut bit = 0u8;
        while bit < 8 && sp < src.len() && dst.len() < rawsize {
            if ctrl & (1 << bit) != 0 {
                if sp + 1 >= src.len() {
                    return Err(corrupt());
                }
                let mut len = ((src[sp] & 0x0F) as usize) + 3;
                let off = (((src[sp] & 0xF0) as usize) << 4) | src[sp + 1] as usize;
                sp += 2;
                if len == 18 {
                    if sp >= src.len() {
                        return Err(corrupt());
                    }
                    len += src[sp] as usize;
                    sp += 1;
                }

                if off == 0 || off > PGLZ_MAX_OFFSET || off > dst.len() {
                    return Err(corrupt());
                }

                // The last match may run past rawsize on purpose; clamp.
                let len = len.min(rawsize - dst.len());
                for _ in 0..len {
                    let b = dst[dst.len() - off];
                    dst.push(b);
                }
            } else {
                dst.push(src[sp]);
                sp += 1;
            }
            bit += 1;
        }
    }

    if dst.len() != rawsize {
        return Err(corrupt());
    }
    Ok(dst)
}
