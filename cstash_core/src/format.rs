/// Magic bytes for remap table blobs (raw and compact share it; the `flags`
/// word in the header tells them apart).
pub const REMAP_MAGIC: &[u8; 4] = b"RMAP";

/// Fixed size of the remap table header in bytes.
///   magic[4] + width:u32 + height:u32 + flags:u32 = 16
pub const REMAP_HEADER_SIZE: usize = 16;

/// `flags` value for the raw (4 bytes per offset) body.
pub const REMAP_FLAG_RAW: u32 = 0;

/// `flags` value for the compact (3 bytes per offset) body.
pub const REMAP_FLAG_COMPACT: u32 = 1;

/// Reserved offset meaning "no valid source pixel" in the raw encoding.
pub const SENTINEL_OFFSET: u32 = 0xFFFF_FFFF;

/// The sentinel as stored in the 24-bit compact encoding.
pub const COMPACT_SENTINEL: u32 = 0x00FF_FFFF;

/// Magic bytes for the named-entry archive container.
pub const ARCHIVE_MAGIC: &[u8; 8] = b"CSARCHV1";

/// Archive prefix: magic[8] + entry_count:u32 = 12.
pub const ARCHIVE_HEADER_SIZE: usize = 12;

/// Magic bytes for the deflate compression envelope.
pub const DEFLATE_MAGIC: &[u8; 4] = b"DFLT";

/// Envelope prefix: magic[4] + raw_len:u32 = 8.
pub const DEFLATE_HEADER_SIZE: usize = 8;

/// Magic bytes for the stash envelope.
pub const STASH_MAGIC: &[u8; 4] = b"STSH";

/// Fixed byte size of the stash header region (NUL-terminated JSON summary,
/// zero-padded). Constant across all files ever written.
pub const STASH_HEADER_SIZE: usize = 4096;

/// Total bytes before the stash payload: magic[4] + header_size:u32 + header
/// region. This is how much a caller must fetch for a header-only read.
pub const fn stash_header_span() -> usize {
    8 + STASH_HEADER_SIZE
}

/// Magic bytes for the multi-slot container.
pub const SLOTS_MAGIC: &[u8; 4] = b"MSLT";

/// Fixed byte size of the multi-slot index region.
pub const SLOTS_HEADER_SIZE: usize = 4096;

/// Maximum number of independently addressable slots per container.
pub const MAX_SLOTS: usize = 3;

/// Total bytes before the first slot payload:
/// magic[4] + header_size:u32 + num_slots:u32 + index region.
pub const fn slots_header_span() -> usize {
    12 + SLOTS_HEADER_SIZE
}

// ── Archive entry names ─────────────────────────────────────────────────────

pub const ENTRY_REMAP_LEFT: &str = "remap_left.bin";
pub const ENTRY_REMAP_RIGHT: &str = "remap_right.bin";
pub const ENTRY_CALIB_META: &str = "calibration_meta.json";
