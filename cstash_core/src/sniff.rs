//! Generation dispatch by magic number.
//!
//! The format grew through three generations (bare archive, compressed +
//! stash envelope, multi-slot container). Rather than threading a version
//! field through every call, each entry point sniffs the leading magic and
//! unwraps whichever layers are present, so callers never need to know
//! which generation produced the bytes.

use std::borrow::Cow;

use log::debug;

use crate::envelope;
use crate::error::{Result, StashError};
use crate::format::{ARCHIVE_MAGIC, DEFLATE_MAGIC, SLOTS_MAGIC, STASH_MAGIC};
use crate::slots;
use crate::stash;

/// The outermost layer a buffer starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    MultiSlot,
    Stash,
    Deflate,
    Archive,
    Unknown,
}

/// Identify the outermost layer by its magic.
pub fn sniff(bytes: &[u8]) -> Layer {
    if bytes.len() >= 8 && &bytes[..8] == ARCHIVE_MAGIC {
        return Layer::Archive;
    }
    if bytes.len() >= 4 {
        match &bytes[..4] {
            m if m == SLOTS_MAGIC => return Layer::MultiSlot,
            m if m == STASH_MAGIC => return Layer::Stash,
            m if m == DEFLATE_MAGIC => return Layer::Deflate,
            _ => {}
        }
    }
    Layer::Unknown
}

/// Unwrap every layer down to bare archive bytes.
///
/// Layering is fixed (multi-slot ⊇ stash ⊇ deflate ⊇ archive), so this is a
/// straight-line peel: a multi-slot base contributes its first occupied
/// slot, a stash header is stripped, a compression envelope is inflated.
/// Borrowed where possible; only decompression allocates.
pub fn peel(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    debug!("peeling {:?} layer", sniff(bytes));

    let inner: &[u8] = if sniff(bytes) == Layer::MultiSlot {
        let index = slots::parse_index(bytes)?;
        let slot = index
            .first_occupied()
            .ok_or(StashError::SlotEmpty(0))?;
        slots::extract_slot(bytes, slot)?
    } else {
        bytes
    };

    let (payload, _had_header) = stash::strip_header(inner)?;

    match envelope::try_decompress(payload)? {
        Some(raw) => Ok(Cow::Owned(raw)),
        None => Ok(Cow::Borrowed(payload)),
    }
}
