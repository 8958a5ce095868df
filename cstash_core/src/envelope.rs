//! Deflate compression envelope.
//!
//! A thin frame around one opaque buffer: magic, the pre-compression length
//! (so decompression can pre-allocate and verify), then a zlib-framed
//! deflate stream. The zlib adler32 is what lets a flipped byte surface as
//! [`StashError::CorruptCompression`] instead of silently wrong data —
//! bare deflate would pass corruption through stored blocks undetected.
//! Layered below the stash envelope and above the archive.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, StashError};
use crate::format::{DEFLATE_HEADER_SIZE, DEFLATE_MAGIC};

/// Upper bound on the decompression buffer reserved up front. The declared
/// raw_len is attacker-controlled (up to 4 GiB); reservation beyond this cap
/// waits for the decoder to actually produce the bytes. 16 MiB covers a full
/// 1440×1080 stereo archive in one shot.
const PREALLOC_CAP: usize = 16 << 20;

/// Deflate `raw` into a framed envelope.
pub fn compress(raw: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DEFLATE_HEADER_SIZE + raw.len() / 2);
    buf.extend_from_slice(DEFLATE_MAGIC);
    buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    let mut enc = ZlibEncoder::new(buf, Compression::default());
    // Writing into a Vec cannot fail.
    enc.write_all(raw).expect("deflate into Vec");
    enc.finish().expect("deflate into Vec")
}

/// Unwrap a compression envelope, if one is present.
///
/// Returns `Ok(None)` when the magic does not match — the input is not an
/// envelope and the caller should treat it as already-raw bytes. A magic
/// match followed by a failed or short inflate is the one genuine error:
/// the envelope promised compressed data and could not deliver it.
pub fn try_decompress(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    if bytes.len() < DEFLATE_HEADER_SIZE || &bytes[..4] != DEFLATE_MAGIC {
        return Ok(None);
    }
    let raw_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let mut raw = Vec::with_capacity(raw_len.min(PREALLOC_CAP));
    let mut dec = ZlibDecoder::new(&bytes[DEFLATE_HEADER_SIZE..]);
    dec.read_to_end(&mut raw)
        .map_err(|_| StashError::CorruptCompression)?;
    if raw.len() != raw_len {
        return Err(StashError::CorruptCompression);
    }
    Ok(Some(raw))
}
