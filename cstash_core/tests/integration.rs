/// Integration tests for the layered calibration-stash codec.
///
/// Builds real buffers at every layer (remap table → archive → compression
/// envelope → stash envelope) and proves the format-level properties:
///  - raw and compact remap encodings round-trip losslessly
///  - `unpack` is generation-transparent: bare, compressed, stash-wrapped,
///    and multi-slot inputs all decode identically
///  - every parse path rejects truncated or corrupted bytes with a typed
///    error instead of reading out of bounds
///  - session-directory packing produces a stash that survives the full
///    round trip
use std::path::Path;

use cstash_core::envelope::{compress, try_decompress};
use cstash_core::format::{
    stash_header_span, ENTRY_CALIB_META, ENTRY_REMAP_LEFT, ENTRY_REMAP_RIGHT, REMAP_MAGIC,
    SENTINEL_OFFSET, STASH_MAGIC,
};
use cstash_core::session::{pack_session, PackOptions, CALIB_RESULT_DIR};
use cstash_core::{
    for_each_entry, pack_entries, slots, sniff, stash, unpack, CalibMeta, CompactRemapTable,
    RemapTable, StashError, StashSummary,
};

/// Generate a deterministic remap table using a simple LCG. Every 97th
/// offset is the sentinel, the rest stay below `width * height`.
fn test_table(width: u32, height: u32, seed: u64) -> RemapTable {
    let count = width as usize * height as usize;
    let mut rng = seed;
    let offsets = (0..count)
        .map(|i| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            if i % 97 == 0 {
                SENTINEL_OFFSET
            } else {
                ((rng >> 33) % count as u64) as u32
            }
        })
        .collect();
    RemapTable { width, height, offsets }
}

fn test_meta_json() -> Vec<u8> {
    serde_json::json!({
        "min_disparity": 17,
        "num_disparities": 128,
        "baseline_cm": 4.0677,
        "focal_length_px": 875.24,
        "pairs_used": 34,
        "stereo_rms": 0.3142
    })
    .to_string()
    .into_bytes()
}

/// A complete archive: left + right tables and the metadata document.
fn test_archive(width: u32, height: u32) -> Vec<u8> {
    let left = test_table(width, height, 0xA11CE).save();
    let right = test_table(width, height, 0xB0B).save();
    let meta = test_meta_json();
    pack_entries(&[
        (ENTRY_REMAP_LEFT, &left),
        (ENTRY_REMAP_RIGHT, &right),
        (ENTRY_CALIB_META, &meta),
    ])
}

// ── remap table codec ──────────────────────────────────────────────────────

#[test]
fn test_remap_raw_roundtrip() {
    let table = test_table(64, 48, 0xDEAD_BEEF);
    let bytes = table.save();
    let loaded = RemapTable::load(&bytes).unwrap();
    assert_eq!(loaded, table, "raw save/load should be lossless");
}

#[test]
fn test_remap_compact_roundtrip() {
    let table = test_table(64, 48, 0x5EED);
    let expanded = table.compact().expand();
    assert_eq!(expanded, table, "compact/expand should be lossless, sentinel included");
    // Sentinel survives both directions.
    assert_eq!(expanded.offsets[0], SENTINEL_OFFSET);
}

#[test]
fn test_remap_load_expands_compact_blob_transparently() {
    let table = test_table(32, 24, 0xC0FFEE);
    let compact_bytes = table.compact().to_bytes();
    assert!(
        compact_bytes.len() < table.save().len(),
        "compact encoding should be smaller than raw"
    );
    let loaded = RemapTable::load(&compact_bytes).unwrap();
    assert_eq!(loaded, table, "load should expand a flags=1 body to raw offsets");
}

#[test]
fn test_compact_load_rejects_raw_flags() {
    let raw = test_table(8, 8, 1).save();
    let err = CompactRemapTable::load(&raw).unwrap_err();
    assert!(matches!(err, StashError::BadMagic { .. }), "got {err:?}");
}

#[test]
fn test_remap_rejects_bad_magic_and_truncation() {
    // A 3-byte buffer is Truncated, never an out-of-bounds read.
    let err = RemapTable::load(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");

    let mut bytes = test_table(8, 8, 2).save();
    bytes[0] ^= 0xFF;
    let err = RemapTable::load(&bytes).unwrap_err();
    assert!(matches!(err, StashError::BadMagic { .. }), "got {err:?}");

    // Declared dimensions implying more body than present.
    let mut short = test_table(8, 8, 3).save();
    short.truncate(short.len() - 5);
    let err = RemapTable::load(&short).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");

    // Unknown flags word.
    let mut bad_flags = test_table(8, 8, 4).save();
    bad_flags[12] = 7;
    let err = RemapTable::load(&bad_flags).unwrap_err();
    assert!(matches!(err, StashError::BadMagic { .. }), "got {err:?}");
}

/// A bare 16-byte header declaring absurd dimensions must come back as
/// Truncated; sizing the body from hostile width/height must not wrap.
#[test]
fn test_remap_rejects_huge_declared_dimensions() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(REMAP_MAGIC);
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    let err = RemapTable::load(&bytes).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");

    // Same header with the compact flags word.
    bytes[12] = 1;
    let err = CompactRemapTable::load(&bytes).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
    let err = RemapTable::load(&bytes).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
}

/// Pins the weak invariant: non-sentinel offsets at or above width*height
/// load without complaint. Bounds enforcement belongs to the remap-apply
/// step, not the codec.
#[test]
fn test_out_of_range_offset_loads_permissively() {
    let table = RemapTable {
        width: 4,
        height: 4,
        offsets: vec![999_999; 16],
    };
    let loaded = RemapTable::load(&table.save()).unwrap();
    assert_eq!(loaded.offsets[0], 999_999);
}

// ── compression envelope ───────────────────────────────────────────────────

#[test]
fn test_envelope_roundtrip() {
    let payload = test_archive(16, 12);
    let compressed = compress(&payload);
    assert!(
        compressed.len() < payload.len(),
        "remap data should deflate: {} vs {}",
        compressed.len(),
        payload.len()
    );
    let raw = try_decompress(&compressed).unwrap();
    assert_eq!(raw.as_deref(), Some(payload.as_slice()));
}

#[test]
fn test_envelope_passthrough_on_foreign_magic() {
    // Anything not starting with the envelope magic is "not compressed",
    // which is not an error.
    assert!(try_decompress(b"just some plain bytes").unwrap().is_none());
    assert!(try_decompress(b"").unwrap().is_none());
    assert!(try_decompress(&test_archive(4, 4)).unwrap().is_none());
}

#[test]
fn test_envelope_rejects_corrupt_stream() {
    let mut compressed = compress(&test_archive(16, 12));

    // Flip one byte in the middle of the deflate stream.
    let mid = 8 + (compressed.len() - 8) / 2;
    compressed[mid] ^= 0xFF;
    let err = try_decompress(&compressed).unwrap_err();
    assert!(matches!(err, StashError::CorruptCompression), "got {err:?}");
}

#[test]
fn test_envelope_rejects_length_mismatch() {
    let mut compressed = compress(b"hello calibration world");
    // Lie about the pre-compression length.
    compressed[4..8].copy_from_slice(&9999u32.to_le_bytes());
    let err = try_decompress(&compressed).unwrap_err();
    assert!(matches!(err, StashError::CorruptCompression), "got {err:?}");
}

/// A declared raw_len of 4 GiB over a tiny stream must fail cheaply — the
/// decode buffer is sized by what the stream produces, not by the header.
#[test]
fn test_envelope_rejects_huge_declared_length() {
    let mut compressed = compress(b"tiny");
    compressed[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = try_decompress(&compressed).unwrap_err();
    assert!(matches!(err, StashError::CorruptCompression), "got {err:?}");
}

// ── archive container ──────────────────────────────────────────────────────

/// The reference scenario: 1440×1080 tables plus the four solver values the
/// disparity pipeline needs, recovered exactly after a full pack/unpack.
#[test]
fn test_archive_roundtrip_reference_scenario() {
    let left = test_table(1440, 1080, 0x1EF7);
    let right = test_table(1440, 1080, 0x816);
    let meta = test_meta_json();
    let archive = pack_entries(&[
        (ENTRY_REMAP_LEFT, &left.save()),
        (ENTRY_REMAP_RIGHT, &right.save()),
        (ENTRY_CALIB_META, &meta),
    ]);

    let decoded = unpack(&archive).unwrap();
    assert_eq!(decoded.left, left);
    assert_eq!(decoded.right, right);
    assert_eq!((decoded.left.width, decoded.left.height), (1440, 1080));
    assert_eq!(decoded.meta.min_disparity, 17);
    assert_eq!(decoded.meta.num_disparities, 128);
    assert_eq!(decoded.meta.baseline_cm, 4.0677);
    assert_eq!(decoded.meta.focal_length_px, 875.24);
}

#[test]
fn test_for_each_entry_visits_in_order() {
    let archive = test_archive(8, 6);
    let mut names = Vec::new();
    for_each_entry(&archive, |name, data| {
        names.push((name.to_string(), data.len()));
        Ok(())
    })
    .unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0].0, ENTRY_REMAP_LEFT);
    assert_eq!(names[1].0, ENTRY_REMAP_RIGHT);
    assert_eq!(names[2].0, ENTRY_CALIB_META);
}

#[test]
fn test_for_each_entry_rejects_truncated_entry() {
    let mut archive = test_archive(8, 6);
    archive.truncate(archive.len() - 10);
    let err = for_each_entry(&archive, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
}

#[test]
fn test_unpack_requires_both_remap_entries() {
    let left = test_table(8, 6, 9).save();
    let only_left = pack_entries(&[(ENTRY_REMAP_LEFT, &left)]);
    let err = unpack(&only_left).unwrap_err();
    assert!(
        matches!(err, StashError::MissingMandatoryEntry(ENTRY_REMAP_RIGHT)),
        "got {err:?}"
    );
}

#[test]
fn test_malformed_metadata_is_nonfatal() {
    let left = test_table(8, 6, 10);
    let right = test_table(8, 6, 11);
    let archive = pack_entries(&[
        (ENTRY_REMAP_LEFT, &left.save()),
        (ENTRY_REMAP_RIGHT, &right.save()),
        (ENTRY_CALIB_META, b"{ this is not json"),
    ]);
    let decoded = unpack(&archive).unwrap();
    assert_eq!(decoded.left, left);
    assert_eq!(
        decoded.meta,
        CalibMeta::default(),
        "malformed metadata should degrade to defaults, not fail the unpack"
    );
}

// ── stash envelope ─────────────────────────────────────────────────────────

fn test_summary() -> StashSummary {
    StashSummary {
        width: 1440,
        height: 1080,
        pairs_used: 34,
        stereo_rms: 0.3142,
        mean_epipolar_err: 0.21,
        baseline_cm: 4.0677,
        focal_length_px: 875.24,
        min_disparity: 17,
        num_disparities: 128,
        packed_at: "2026-08-30T12:00:00Z".to_string(),
    }
}

#[test]
fn test_stash_wrap_and_strip() {
    let payload = compress(&test_archive(8, 6));
    let stashed = stash::wrap(&payload, &test_summary());
    assert_eq!(&stashed[..4], STASH_MAGIC);
    assert_eq!(stashed.len(), stash_header_span() + payload.len());

    let (stripped, had_header) = stash::strip_header(&stashed).unwrap();
    assert!(had_header);
    assert_eq!(stripped, payload.as_slice());

    // Bytes without the magic pass through untouched.
    let (passthrough, had_header) = stash::strip_header(&payload).unwrap();
    assert!(!had_header);
    assert_eq!(passthrough, payload.as_slice());
}

/// The cheap-listing path: only the header span of the file is available,
/// as if fetched with a `read_head` storage call over a slow link.
#[test]
fn test_read_header_only_from_prefix() {
    let summary = test_summary();
    let stashed = stash::wrap(&compress(&test_archive(8, 6)), &summary);
    let head = &stashed[..stash_header_span()];
    let parsed = stash::read_header_only(head).unwrap();
    assert_eq!(parsed, summary);
}

#[test]
fn test_oversized_summary_truncates_instead_of_failing() {
    let mut summary = test_summary();
    summary.packed_at = "x".repeat(8000);
    let payload = b"payload".to_vec();
    let stashed = stash::wrap(&payload, &summary);

    // The header is advisory: the payload must still come back intact even
    // though the truncated JSON is no longer parseable.
    let (stripped, had_header) = stash::strip_header(&stashed).unwrap();
    assert!(had_header);
    assert_eq!(stripped, payload.as_slice());
    let err = stash::read_header_only(&stashed).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
}

#[test]
fn test_stash_header_rejections() {
    let err = stash::read_header_only(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");

    let err = stash::read_header_only(b"NOPEnope").unwrap_err();
    assert!(matches!(err, StashError::BadMagic { .. }), "got {err:?}");

    // Magic matches but the declared header region is missing.
    let mut short = Vec::new();
    short.extend_from_slice(STASH_MAGIC);
    short.extend_from_slice(&4096u32.to_le_bytes());
    short.extend_from_slice(b"{}");
    let err = stash::strip_header(&short).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
}

// ── generation transparency ────────────────────────────────────────────────

/// `unpack` must decode identically whether handed a bare archive, a
/// compressed archive, a stash envelope around either, or a multi-slot
/// container — callers never know which generation produced the bytes.
#[test]
fn test_unpack_is_generation_transparent() {
    let bare = test_archive(32, 24);
    let compressed = compress(&bare);
    let stashed = stash::wrap(&compressed, &test_summary());
    let container = slots::build(None, 0, Some(&stashed)).unwrap().unwrap();
    // First occupied slot wins even when slot 0 is empty.
    let sparse = slots::build(None, 2, Some(&stashed)).unwrap().unwrap();

    let reference = unpack(&bare).unwrap();
    for (label, bytes) in [
        ("compressed", &compressed),
        ("stash", &stashed),
        ("multi-slot", &container),
        ("sparse multi-slot", &sparse),
    ] {
        let decoded = unpack(bytes).unwrap();
        assert_eq!(decoded.left, reference.left, "{label} left table diverged");
        assert_eq!(decoded.right, reference.right, "{label} right table diverged");
        assert_eq!(decoded.meta, reference.meta, "{label} metadata diverged");
    }
}

#[test]
fn test_sniff_identifies_every_layer() {
    let bare = test_archive(4, 4);
    let compressed = compress(&bare);
    let stashed = stash::wrap(&compressed, &test_summary());
    let container = slots::build(None, 0, Some(&stashed)).unwrap().unwrap();

    assert_eq!(sniff::sniff(&bare), sniff::Layer::Archive);
    assert_eq!(sniff::sniff(&compressed), sniff::Layer::Deflate);
    assert_eq!(sniff::sniff(&stashed), sniff::Layer::Stash);
    assert_eq!(sniff::sniff(&container), sniff::Layer::MultiSlot);
    assert_eq!(sniff::sniff(b"??"), sniff::Layer::Unknown);
}

/// Corruption inside the stashed payload surfaces as CorruptCompression at
/// unpack time, never as silently wrong tables.
#[test]
fn test_unpack_rejects_corrupted_stash_payload() {
    let stashed = stash::wrap(&compress(&test_archive(16, 12)), &test_summary());
    let mut corrupted = stashed.clone();
    let mid = stash_header_span() + (stashed.len() - stash_header_span()) / 2;
    corrupted[mid] ^= 0xFF;
    let err = unpack(&corrupted).unwrap_err();
    assert!(matches!(err, StashError::CorruptCompression), "got {err:?}");
}

// ── session packing ────────────────────────────────────────────────────────

fn write_session(dir: &Path, with_meta: bool) -> (RemapTable, RemapTable) {
    let result_dir = dir.join(CALIB_RESULT_DIR);
    std::fs::create_dir_all(&result_dir).unwrap();
    let left = test_table(1440, 1080, 0x50DA);
    let right = test_table(1440, 1080, 0xFA2);
    std::fs::write(result_dir.join(ENTRY_REMAP_LEFT), left.save()).unwrap();
    std::fs::write(result_dir.join(ENTRY_REMAP_RIGHT), right.save()).unwrap();
    if with_meta {
        std::fs::write(result_dir.join(ENTRY_CALIB_META), test_meta_json()).unwrap();
    }
    (left, right)
}

#[test]
fn test_pack_session_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (left, right) = write_session(dir.path(), true);

    let stashed = pack_session(dir.path(), &PackOptions::default()).unwrap();
    assert_eq!(&stashed[..4], STASH_MAGIC, "pack output should be a stash envelope");

    // The header summary is readable without the payload and carries both
    // the measured dimensions and the solver metadata.
    let summary = stash::read_header_only(&stashed[..stash_header_span()]).unwrap();
    assert_eq!((summary.width, summary.height), (1440, 1080));
    assert_eq!(summary.min_disparity, 17);
    assert_eq!(summary.baseline_cm, 4.0677);
    assert!(!summary.packed_at.is_empty(), "pack should stamp a timestamp");

    let decoded = unpack(&stashed).unwrap();
    assert_eq!(decoded.left, left);
    assert_eq!(decoded.right, right);
    assert_eq!(decoded.meta.focal_length_px, 875.24);
    assert_eq!(decoded.meta.num_disparities, 128);
}

#[test]
fn test_pack_session_compact_saves_space() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), false);

    let compact = pack_session(dir.path(), &PackOptions { compact: true }).unwrap();
    let raw = pack_session(dir.path(), &PackOptions { compact: false }).unwrap();
    assert!(
        compact.len() < raw.len(),
        "compact packing should shrink the stash: {} vs {}",
        compact.len(),
        raw.len()
    );
    // Both decode to the same tables regardless of the on-wire encoding.
    let a = unpack(&compact).unwrap();
    let b = unpack(&raw).unwrap();
    assert_eq!(a.left, b.left);
    assert_eq!(a.right, b.right);
}

#[test]
fn test_pack_session_missing_sources() {
    let dir = tempfile::tempdir().unwrap();

    // No calib_result/ at all.
    let err = pack_session(dir.path(), &PackOptions::default()).unwrap_err();
    assert!(matches!(err, StashError::SourceUnavailable(_)), "got {err:?}");

    // Directory present but the right table missing.
    let result_dir = dir.path().join(CALIB_RESULT_DIR);
    std::fs::create_dir_all(&result_dir).unwrap();
    let left = test_table(8, 6, 1);
    std::fs::write(result_dir.join(ENTRY_REMAP_LEFT), left.save()).unwrap();
    let err = pack_session(dir.path(), &PackOptions::default()).unwrap_err();
    assert!(matches!(err, StashError::SourceUnavailable(_)), "got {err:?}");
}

#[test]
fn test_pack_session_rejects_truncated_table() {
    let dir = tempfile::tempdir().unwrap();
    let result_dir = dir.path().join(CALIB_RESULT_DIR);
    std::fs::create_dir_all(&result_dir).unwrap();
    let mut left = test_table(8, 6, 1).save();
    left.truncate(left.len() - 4);
    std::fs::write(result_dir.join(ENTRY_REMAP_LEFT), &left).unwrap();
    std::fs::write(result_dir.join(ENTRY_REMAP_RIGHT), test_table(8, 6, 2).save()).unwrap();

    // A broken table must fail at pack time, not on-device.
    let err = pack_session(dir.path(), &PackOptions::default()).unwrap_err();
    assert!(matches!(err, StashError::Truncated { .. }), "got {err:?}");
}

// sanity: the remap magic is what the session files start with
#[test]
fn test_saved_table_starts_with_magic() {
    let bytes = test_table(2, 2, 0).save();
    assert_eq!(&bytes[..4], REMAP_MAGIC);
}
