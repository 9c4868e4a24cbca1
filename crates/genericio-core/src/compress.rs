//! Block Compression
//!
//! Data blocks may be written through a single named filter, recorded in the
//! block header's first filter slot. A compressed block is laid out as:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬────────────┐
//! │ CompressHeader (8 B) │ compressor output        │ CRC footer │
//! │ - CRC64 of the       │ (size-prepended LZ4)     │ (8 bytes,  │
//! │   uncompressed bytes │                          │  over the  │
//! │                      │                          │  left part)│
//! └──────────────────────┴──────────────────────────┴────────────┘
//! ```
//!
//! The block header's `Size` covers the CompressHeader plus the compressor
//! output; the trailing CRC footer is accounted separately like every other
//! block. The outer footer protects the compressed bytes in transit; the
//! inner CRC proves the decompressed payload matches what the writer saw.
//!
//! If compression fails or does not shrink the payload, the block is written
//! raw and the filter slots stay zeroed.

use bytes::BytesMut;

use crate::crc::crc64;
use crate::error::{Error, Result};
use crate::records::{CompressHeader, Endianness, COMPRESS_HEADER_SIZE};

/// The single recognized filter name.
pub const FILTER_NAME: &str = "BLOSC";

/// Outcome of decoding a compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerCrc {
    Ok,
    Mismatch,
}

/// Try to compress a payload. Returns `CompressHeader + compressor output`
/// when the result is smaller than the input, `None` otherwise.
pub fn compress_block(e: Endianness, payload: &[u8]) -> Option<Vec<u8>> {
    let compressed = lz4_flex::compress_prepend_size(payload);
    if COMPRESS_HEADER_SIZE + compressed.len() >= payload.len() {
        return None;
    }

    let mut out = BytesMut::with_capacity(COMPRESS_HEADER_SIZE + compressed.len());
    CompressHeader {
        orig_crc: crc64(payload),
    }
    .encode(e, &mut out);
    out.extend_from_slice(&compressed);
    Some(out.to_vec())
}

/// Decode a compressed block (without its trailing CRC footer) into `dst`.
/// Codec failures and size disagreements are hard errors; an inner-CRC
/// mismatch is reported as [`InnerCrc::Mismatch`] so the caller can count it
/// without aborting the variable loop.
pub fn decompress_block(e: Endianness, block: &[u8], dst: &mut [u8]) -> Result<InnerCrc> {
    if block.len() < COMPRESS_HEADER_SIZE {
        return Err(Error::Decompression(
            "compressed block shorter than its header".to_string(),
        ));
    }

    let ch = CompressHeader::decode(e, &block[..COMPRESS_HEADER_SIZE]);
    let payload = lz4_flex::decompress_size_prepended(&block[COMPRESS_HEADER_SIZE..])
        .map_err(|err| Error::Decompression(err.to_string()))?;

    if payload.len() != dst.len() {
        return Err(Error::Decompression(format!(
            "decompressed size {} does not match expected {}",
            payload.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(&payload);

    if crc64(dst) != ch.orig_crc {
        return Ok(InnerCrc::Mismatch);
    }
    Ok(InnerCrc::Ok)
}
