//! Named-entry archive container.
//!
//! An ordered list of `(name, bytes)` entries, simply concatenated after a
//! count — no index, no footer. At this scale (three entries) a linear walk
//! is the index.

use log::warn;

use crate::error::{Result, StashError};
use crate::format::{
    ARCHIVE_HEADER_SIZE, ARCHIVE_MAGIC, ENTRY_CALIB_META, ENTRY_REMAP_LEFT, ENTRY_REMAP_RIGHT,
};
use crate::meta::CalibMeta;
use crate::remap::RemapTable;
use crate::sniff;

/// A fully decoded calibration archive.
#[derive(Debug, Clone)]
pub struct UnpackedCalib {
    pub left: RemapTable,
    pub right: RemapTable,
    /// Default-valued when the metadata entry is absent or malformed.
    pub meta: CalibMeta,
}

/// Serialize named blobs into an archive buffer.
///
/// Per entry: name_len u32 (including the terminating NUL), data_len u32,
/// name bytes + NUL, data bytes.
pub fn pack_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let total: usize = entries
        .iter()
        .map(|(name, data)| 8 + name.len() + 1 + data.len())
        .sum();
    let mut buf = Vec::with_capacity(ARCHIVE_HEADER_SIZE + total);
    buf.extend_from_slice(ARCHIVE_MAGIC);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (name, data) in entries {
        buf.extend_from_slice(&((name.len() + 1) as u32).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(data);
    }
    buf
}

/// Walk every archive entry, handing `(name, data)` slices to `visit`.
///
/// This is the single iteration primitive all higher-level readers build
/// on. Each entry's declared lengths are validated against the remaining
/// buffer before any slice is exposed; a truncated entry yields
/// [`StashError::Truncated`] instead of an out-of-bounds read.
pub fn for_each_entry<F>(bytes: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(&str, &[u8]) -> Result<()>,
{
    if bytes.len() < ARCHIVE_HEADER_SIZE {
        return Err(StashError::Truncated { layer: "archive header" });
    }
    if &bytes[..8] != ARCHIVE_MAGIC {
        return Err(StashError::BadMagic { layer: "archive" });
    }
    let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let mut pos = ARCHIVE_HEADER_SIZE;
    for _ in 0..count {
        if bytes.len() - pos < 8 {
            return Err(StashError::Truncated { layer: "archive entry" });
        }
        let name_len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let data_len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        if name_len == 0 || bytes.len() - pos < name_len || bytes.len() - pos - name_len < data_len
        {
            return Err(StashError::Truncated { layer: "archive entry" });
        }
        // name_len includes the terminating NUL
        let name = std::str::from_utf8(&bytes[pos..pos + name_len - 1])
            .map_err(|_| StashError::Truncated { layer: "archive entry name" })?;
        pos += name_len;
        visit(name, &bytes[pos..pos + data_len])?;
        pos += data_len;
    }
    Ok(())
}

/// Decode a calibration archive into its remap tables and metadata.
///
/// Generation-transparent: accepts a bare archive, a compressed archive, a
/// stash envelope, or a multi-slot container (first occupied slot) — every
/// layer is peeled by magic sniffing first. Both remap entries are
/// mandatory and compact bodies are expanded on the way out. The metadata
/// entry is informational: absent or malformed JSON degrades to
/// `CalibMeta::default()`, never an error.
pub fn unpack(bytes: &[u8]) -> Result<UnpackedCalib> {
    let archive = sniff::peel(bytes)?;

    let mut left: Option<RemapTable> = None;
    let mut right: Option<RemapTable> = None;
    let mut meta = CalibMeta::default();

    for_each_entry(&archive, |name, data| {
        match name {
            ENTRY_REMAP_LEFT => left = Some(RemapTable::load(data)?),
            ENTRY_REMAP_RIGHT => right = Some(RemapTable::load(data)?),
            ENTRY_CALIB_META => match CalibMeta::from_json(data) {
                Some(m) => meta = m,
                None => warn!("skipping malformed {}", ENTRY_CALIB_META),
            },
            other => warn!("ignoring unknown archive entry {:?}", other),
        }
        Ok(())
    })?;

    Ok(UnpackedCalib {
        left: left.ok_or(StashError::MissingMandatoryEntry(ENTRY_REMAP_LEFT))?,
        right: right.ok_or(StashError::MissingMandatoryEntry(ENTRY_REMAP_RIGHT))?,
        meta,
    })
}
