//! Packing a calibration session directory into a stash.
//!
//! The solver leaves its results under `<session>/calib_result/`:
//! `remap_left.bin`, `remap_right.bin`, and optionally
//! `calibration_meta.json`. Packing validates the tables, re-encodes them
//! compactly, archives, deflates, and wraps the result in a stash envelope
//! ready for upload.

use std::io::ErrorKind;
use std::path::Path;

use log::debug;

use crate::archive::pack_entries;
use crate::envelope;
use crate::error::{Result, StashError};
use crate::format::{ENTRY_CALIB_META, ENTRY_REMAP_LEFT, ENTRY_REMAP_RIGHT};
use crate::meta::{now_rfc3339, StashSummary};
use crate::remap::RemapTable;
use crate::stash;

/// Results subdirectory the solver writes into.
pub const CALIB_RESULT_DIR: &str = "calib_result";

#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Re-encode remap tables with 3-byte offsets. On by default: the whole
    /// point of the stash is fitting on-device storage.
    pub compact: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { compact: true }
    }
}

fn read_required(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StashError::SourceUnavailable(path.to_path_buf()),
        _ => StashError::Io(e),
    })
}

/// Pack a session directory into stash-envelope bytes.
///
/// Both remap tables are mandatory ([`StashError::SourceUnavailable`] when
/// the results directory or either file is missing); the metadata document
/// is optional. The stash summary merges the metadata fields with the
/// measured table dimensions and a fresh pack timestamp.
pub fn pack_session(session_dir: &Path, opts: &PackOptions) -> Result<Vec<u8>> {
    let result_dir = session_dir.join(CALIB_RESULT_DIR);
    if !result_dir.is_dir() {
        return Err(StashError::SourceUnavailable(result_dir));
    }

    let left_raw = read_required(&result_dir.join(ENTRY_REMAP_LEFT))?;
    let right_raw = read_required(&result_dir.join(ENTRY_REMAP_RIGHT))?;
    let meta_json = std::fs::read(result_dir.join(ENTRY_CALIB_META)).ok();

    // Validate both tables up front; a session with a truncated table must
    // fail at pack time, not on-device.
    let left = RemapTable::load(&left_raw)?;
    let right = RemapTable::load(&right_raw)?;
    debug!(
        "packing session {:?}: {}x{} left, {}x{} right, meta {}",
        session_dir,
        left.width,
        left.height,
        right.width,
        right.height,
        if meta_json.is_some() { "present" } else { "absent" }
    );

    let (left_bytes, right_bytes) = if opts.compact {
        (left.compact().to_bytes(), right.compact().to_bytes())
    } else {
        (left.save(), right.save())
    };

    let mut entries: Vec<(&str, &[u8])> = vec![
        (ENTRY_REMAP_LEFT, &left_bytes),
        (ENTRY_REMAP_RIGHT, &right_bytes),
    ];
    if let Some(meta) = &meta_json {
        entries.push((ENTRY_CALIB_META, meta));
    }

    let archive = pack_entries(&entries);
    let compressed = envelope::compress(&archive);
    let summary =
        StashSummary::from_parts(left.width, left.height, meta_json.as_deref(), now_rfc3339());
    Ok(stash::wrap(&compressed, &summary))
}
