//! Self-describing stash envelope.
//!
//! A fixed 4096-byte header region carrying a NUL-terminated JSON summary
//! sits in front of the payload (normally a deflated archive). Readers on a
//! slow link fetch only [`stash_header_span`] bytes to answer "what
//! calibration is this?" without transferring the multi-megabyte payload.

use crate::error::{Result, StashError};
use crate::format::{stash_header_span, STASH_HEADER_SIZE, STASH_MAGIC};
use crate::meta::StashSummary;

/// Frame `payload` behind a header region holding `summary` as JSON.
///
/// The header is advisory: a summary too large for the region is truncated
/// byte-wise rather than failing the pack. (In practice the summary is a
/// few hundred bytes; truncation only ever hits hand-edited documents.)
pub fn wrap(payload: &[u8], summary: &StashSummary) -> Vec<u8> {
    let mut json = serde_json::to_vec(summary).unwrap_or_default();
    // Leave room for the terminating NUL.
    json.truncate(STASH_HEADER_SIZE - 1);

    let mut buf = Vec::with_capacity(stash_header_span() + payload.len());
    buf.extend_from_slice(STASH_MAGIC);
    buf.extend_from_slice(&(STASH_HEADER_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&json);
    buf.resize(stash_header_span(), 0);
    buf.extend_from_slice(payload);
    buf
}

/// Split off the stash header, if one is present.
///
/// Returns the payload slice and whether a header was found; bytes that do
/// not start with the stash magic pass through untouched (`had_header =
/// false`) so callers accept pre-envelope files uniformly. A matching magic
/// with a buffer shorter than the declared header span is `Truncated`.
pub fn strip_header(bytes: &[u8]) -> Result<(&[u8], bool)> {
    if bytes.len() < 8 || &bytes[..4] != STASH_MAGIC {
        return Ok((bytes, false));
    }
    let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let span = 8 + header_size;
    if bytes.len() < span {
        return Err(StashError::Truncated { layer: "stash header" });
    }
    Ok((&bytes[span..], true))
}

/// Parse the inline summary from a file prefix.
///
/// `bytes` may be just the first [`stash_header_span`] bytes of the file
/// (e.g. from a `read_head` storage call) — the payload is never touched.
pub fn read_header_only(bytes: &[u8]) -> Result<StashSummary> {
    if bytes.len() < 8 {
        return Err(StashError::Truncated { layer: "stash header" });
    }
    if &bytes[..4] != STASH_MAGIC {
        return Err(StashError::BadMagic { layer: "stash" });
    }
    let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let region = &bytes[8..bytes.len().min(8 + header_size)];
    let json = match region.iter().position(|&b| b == 0) {
        Some(nul) => &region[..nul],
        None => region,
    };
    serde_json::from_slice(json).map_err(|_| StashError::Truncated { layer: "stash summary" })
}
