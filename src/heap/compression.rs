//! Compression method detection and decompression dispatch.
//!
//! The database records the codec of a compressed datum in the top two
//! bits of the `tcinfo` word (inline) or the `extinfo` word (TOAST
//! pointer): 0 = PGLZ, 1 = LZ4. PGLZ is decoded by the hand-rolled
//! [`pglz`](crate::heap::pglz) stream reader; LZ4 payloads use the raw
//! block format with a known target size.

use serde::Serialize;

use crate::heap::pglz;
use crate::heap::HeapError;

/// Codec of a compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionMethod {
    Pglz,
    Lz4,
}

impl CompressionMethod {
    /// Decode the two method bits from a tcinfo/extinfo word.
    pub fn from_bits(bits: u32) -> Result<Self, HeapError> {
        match bits {
            0 => Ok(CompressionMethod::Pglz),
            1 => Ok(CompressionMethod::Lz4),
            _ => Err(HeapError::BadVarlena),
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMethod::Pglz => write!(f, "PGLZ"),
            CompressionMethod::Lz4 => write!(f, "LZ4"),
        }
    }
}

/// Decompress `payload` into exactly `rawsize` bytes.
pub fn decompress(
    method: CompressionMethod,
    payload: &[u8],
    rawsize: usize,
) -> Result<Vec<u8>, HeapError> {
    match method {
        CompressionMethod::Pglz => pglz::decompress(payload, rawsize),
        CompressionMethod::Lz4 => {
            let out = lz4_flex::decompress(payload, rawsize)
                .map_err(|_| HeapError::CompressionError { method })?;
            if out.len() != rawsize {
                return Err(HeapError::CompressionError { method });
            }
            Ok(out)
        }
    }
}
