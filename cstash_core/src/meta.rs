//! JSON carriers: the solver metadata record and the stash header summary.
//!
//! The authoritative document is the `calibration_meta.json` archive entry;
//! everything here is derived from it. Parsing is deliberately permissive:
//! older solvers wrote subsets of these keys, so every field defaults.

use serde::{Deserialize, Serialize};

/// The handful of metadata fields the disparity pipeline needs at runtime.
///
/// Derived from the metadata entry; an archive without one unpacks to the
/// default (all zeroes) rather than failing, since the remap tables remain
/// usable on their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibMeta {
    pub min_disparity: i32,
    pub num_disparities: u32,
    pub focal_length_px: f64,
    pub baseline_cm: f64,
}

impl CalibMeta {
    /// Parse the metadata document, tolerating unknown keys.
    pub fn from_json(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// The quick-read summary stored inline in the stash header (and, minus a
/// few fields, denormalized into the multi-slot index).
///
/// Answers "what calibration is this?" without touching the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashSummary {
    pub width: u32,
    pub height: u32,
    pub pairs_used: u32,
    pub stereo_rms: f64,
    pub mean_epipolar_err: f64,
    pub baseline_cm: f64,
    pub focal_length_px: f64,
    pub min_disparity: i32,
    pub num_disparities: u32,
    /// RFC 3339, UTC. Empty for stashes written before timestamps existed.
    pub packed_at: String,
}

impl StashSummary {
    /// Merge the measured table dimensions with whatever the metadata
    /// document carries. Missing or malformed metadata leaves the solver
    /// fields at their defaults.
    pub fn from_parts(width: u32, height: u32, meta_json: Option<&[u8]>, packed_at: String) -> Self {
        let mut summary: StashSummary = meta_json
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
            .unwrap_or_default();
        summary.width = width;
        summary.height = height;
        summary.packed_at = packed_at;
        summary
    }
}

/// Current time as the RFC 3339 pack-timestamp string.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
