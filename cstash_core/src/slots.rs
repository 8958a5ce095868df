//! Multi-slot container: up to three independent stashes in one file.
//!
//! Layout: magic, header_size u32, num_slots u32, a NUL-terminated JSON
//! index zero-padded to `header_size`, then each occupied slot's stash
//! payload packed contiguously in slot order. The index denormalizes each
//! slot's key summary fields so listing never touches payload bytes.
//!
//! There is no incremental mutation. [`build`] is the one mutating
//! operation and always rebuilds the whole file from a parsed logical
//! model: offsets are recomputed every time, so deleting a slot can never
//! leave a gap. Slot count is bounded at three and calibration blobs are
//! small, so O(total occupied bytes) per update is fine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};
use crate::format::{slots_header_span, MAX_SLOTS, SLOTS_HEADER_SIZE, SLOTS_MAGIC, STASH_MAGIC};
use crate::stash;

/// Index record for one occupied slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotEntry {
    /// Absolute byte offset of this slot's stash within the container.
    pub offset: u64,
    /// Byte size of this slot's stash.
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub stereo_rms: f64,
    pub packed_at: String,
}

/// The parsed JSON index: one entry per slot, `None` for empty slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotIndex {
    pub slots: Vec<Option<SlotEntry>>,
}

impl SlotIndex {
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn first_occupied(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_some())
    }
}

/// Parse and validate the container index.
///
/// Rejects a declared `header_size` extending past the buffer and a slot
/// count above [`MAX_SLOTS`]. The returned index always has exactly
/// `MAX_SLOTS` entries.
pub fn parse_index(bytes: &[u8]) -> Result<SlotIndex> {
    if bytes.len() < 12 {
        return Err(StashError::Truncated { layer: "slot header" });
    }
    if &bytes[..4] != SLOTS_MAGIC {
        return Err(StashError::BadMagic { layer: "multi-slot" });
    }
    let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let num_slots = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    if header_size > bytes.len() - 12 {
        return Err(StashError::Truncated { layer: "slot index" });
    }
    if num_slots > MAX_SLOTS {
        return Err(StashError::SlotOutOfRange(num_slots));
    }
    let region = &bytes[12..12 + header_size];
    let json = match region.iter().position(|&b| b == 0) {
        Some(nul) => &region[..nul],
        None => region,
    };
    let mut index: SlotIndex = serde_json::from_slice(json)
        .map_err(|_| StashError::Truncated { layer: "slot index" })?;
    index.slots.truncate(MAX_SLOTS);
    index.slots.resize(MAX_SLOTS, None);
    Ok(index)
}

/// Borrow the stash bytes stored in `slot`.
///
/// A legacy single-stash file (generation two) serves slot 0 only; any
/// other slot is empty by definition. `SlotOverflow` guards an index whose
/// byte range runs past the buffer.
pub fn extract_slot(bytes: &[u8], slot: usize) -> Result<&[u8]> {
    if slot >= MAX_SLOTS {
        return Err(StashError::SlotOutOfRange(slot));
    }
    if bytes.len() >= 4 && &bytes[..4] == STASH_MAGIC {
        return if slot == 0 {
            Ok(bytes)
        } else {
            Err(StashError::SlotEmpty(slot))
        };
    }
    let index = parse_index(bytes)?;
    let entry = index.slots[slot]
        .as_ref()
        .ok_or(StashError::SlotEmpty(slot))?;
    let start = entry.offset as usize;
    let end = start
        .checked_add(entry.size as usize)
        .ok_or(StashError::SlotOverflow)?;
    if start < slots_header_span() || end > bytes.len() {
        return Err(StashError::SlotOverflow);
    }
    Ok(&bytes[start..end])
}

/// Rebuild the container with `target_slot` set to `new_stash` (or cleared
/// when `None`).
///
/// Pure function of "what exists now" and "what the caller wants the slot
/// to become". The base classifies by magic: absent means all slots empty;
/// a legacy single stash migrates into slot 0. Every other slot's content
/// is carried over byte-identically. Returns `Ok(None)` — the delete-file
/// signal — when no slot remains occupied; the caller removes the stored
/// object entirely instead of writing an empty container.
pub fn build(
    existing: Option<&[u8]>,
    target_slot: usize,
    new_stash: Option<&[u8]>,
) -> Result<Option<Vec<u8>>> {
    if target_slot >= MAX_SLOTS {
        return Err(StashError::SlotOutOfRange(target_slot));
    }

    // Parse the base into a logical model: per slot, its index entry plus
    // the payload bytes it currently holds.
    let mut model: Vec<Option<(SlotEntry, &[u8])>> = vec![None; MAX_SLOTS];
    match existing {
        None => {}
        Some(base) if base.len() >= 4 && &base[..4] == STASH_MAGIC => {
            model[0] = Some((entry_for(base), base));
        }
        Some(base) => {
            let index = parse_index(base)?;
            for (slot, entry) in index.slots.iter().enumerate() {
                if let Some(entry) = entry {
                    let payload = extract_slot(base, slot)?;
                    model[slot] = Some((entry.clone(), payload));
                }
            }
        }
    }

    model[target_slot] = new_stash.map(|bytes| (entry_for(bytes), bytes));

    if model.iter().all(|s| s.is_none()) {
        return Ok(None);
    }

    // Recompute contiguous offsets in slot order; never reuse old ones.
    let mut index = SlotIndex { slots: vec![None; MAX_SLOTS] };
    let mut cursor = slots_header_span() as u64;
    for (slot, occupied) in model.iter().enumerate() {
        if let Some((entry, payload)) = occupied {
            let mut entry = entry.clone();
            entry.offset = cursor;
            entry.size = payload.len() as u64;
            cursor += entry.size;
            index.slots[slot] = Some(entry);
        }
    }

    let mut json = serde_json::to_vec(&index).unwrap_or_default();
    // Three entries come to a few hundred bytes; the region fits them with
    // room to spare. Keep the NUL terminator representable regardless.
    json.truncate(SLOTS_HEADER_SIZE - 1);

    let mut buf = Vec::with_capacity(cursor as usize);
    buf.extend_from_slice(SLOTS_MAGIC);
    buf.extend_from_slice(&(SLOTS_HEADER_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&(MAX_SLOTS as u32).to_le_bytes());
    buf.extend_from_slice(&json);
    buf.resize(slots_header_span(), 0);
    for occupied in model.iter().flatten() {
        buf.extend_from_slice(occupied.1);
    }
    Ok(Some(buf))
}

/// Denormalize a stash's inline summary into an index entry. Offsets are
/// filled in by [`build`]; a stash without a readable summary still gets an
/// entry (the index fields are informational, the byte range is not).
fn entry_for(stash_bytes: &[u8]) -> SlotEntry {
    let summary = stash::read_header_only(stash_bytes).unwrap_or_default();
    SlotEntry {
        offset: 0,
        size: stash_bytes.len() as u64,
        width: summary.width,
        height: summary.height,
        stereo_rms: summary.stereo_rms,
        packed_at: summary.packed_at,
    }
}
