use crate::error::{Result, StashError};
use crate::format::{
    COMPACT_SENTINEL, REMAP_FLAG_COMPACT, REMAP_FLAG_RAW, REMAP_HEADER_SIZE, REMAP_MAGIC,
    SENTINEL_OFFSET,
};

/// Per-pixel source-offset lookup table for one camera eye.
///
/// `offsets[y * width + x]` indexes into the flat source image that produces
/// destination pixel `(x, y)`. [`SENTINEL_OFFSET`] marks pixels outside the
/// valid rectified region.
///
/// Weak invariant: non-sentinel offsets should be `< width * height`. The
/// codec does NOT enforce the upper bound — tables written by older solvers
/// occasionally carry stray offsets, and rejecting them here would brick
/// devices that have been remapping around them for years. Consumers must
/// bounds-check at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapTable {
    pub width: u32,
    pub height: u32,
    /// Exactly `width * height` entries, row-major.
    pub offsets: Vec<u32>,
}

/// Storage-optimized remap table: 3 bytes per offset instead of 4.
///
/// Realistic offsets fit in 24 bits (a 4096×4096 eye is the ceiling), so the
/// compact body shaves 25% off the dominant payload. The sentinel maps to
/// [`COMPACT_SENTINEL`]. Lossless against the raw encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactRemapTable {
    pub width: u32,
    pub height: u32,
    /// Exactly `width * height * 3` bytes, little-endian triples.
    pub packed: Vec<u8>,
}

fn parse_header(bytes: &[u8]) -> Result<(u32, u32, u32)> {
    if bytes.len() < REMAP_HEADER_SIZE {
        return Err(StashError::Truncated { layer: "remap header" });
    }
    if &bytes[..4] != REMAP_MAGIC {
        return Err(StashError::BadMagic { layer: "remap table" });
    }
    let width = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let height = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let flags = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    Ok((width, height, flags))
}

impl RemapTable {
    /// Parse a remap table blob, raw or compact.
    ///
    /// A compact body (`flags == 1`) is expanded transparently so callers
    /// always get 4-byte offsets. Fails on a bad magic, a buffer shorter
    /// than the 16-byte header, or declared dimensions implying more body
    /// bytes than are present.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let (width, height, flags) = parse_header(bytes)?;
        match flags {
            REMAP_FLAG_RAW => {
                let count = width as usize * height as usize;
                let body = &bytes[REMAP_HEADER_SIZE..];
                // count is attacker-controlled; the multiply must not wrap.
                let body_len = count
                    .checked_mul(4)
                    .filter(|&n| n <= body.len())
                    .ok_or(StashError::Truncated { layer: "remap body" })?;
                let offsets = body[..body_len]
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                Ok(Self { width, height, offsets })
            }
            REMAP_FLAG_COMPACT => Ok(CompactRemapTable::load(bytes)?.expand()),
            _ => Err(StashError::BadMagic { layer: "remap flags" }),
        }
    }

    /// Serialize in the raw encoding (`flags = 0`).
    pub fn save(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REMAP_HEADER_SIZE + self.offsets.len() * 4);
        buf.extend_from_slice(REMAP_MAGIC);
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&REMAP_FLAG_RAW.to_le_bytes());
        for off in &self.offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
        buf
    }

    /// Re-encode with 3-byte offsets.
    ///
    /// Pure arithmetic, never fails: the sentinel maps to the 24-bit
    /// sentinel and every other offset is stored as its low 24 bits (see
    /// the weak invariant on [`RemapTable`]).
    pub fn compact(&self) -> CompactRemapTable {
        let mut packed = Vec::with_capacity(self.offsets.len() * 3);
        for &off in &self.offsets {
            let v = if off == SENTINEL_OFFSET { COMPACT_SENTINEL } else { off & 0x00FF_FFFF };
            let le = v.to_le_bytes();
            packed.extend_from_slice(&le[..3]);
        }
        CompactRemapTable { width: self.width, height: self.height, packed }
    }
}

impl CompactRemapTable {
    /// Parse a compact blob (`flags` must be 1).
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let (width, height, flags) = parse_header(bytes)?;
        if flags != REMAP_FLAG_COMPACT {
            return Err(StashError::BadMagic { layer: "remap flags" });
        }
        let count = width as usize * height as usize;
        let body = &bytes[REMAP_HEADER_SIZE..];
        let body_len = count
            .checked_mul(3)
            .filter(|&n| n <= body.len())
            .ok_or(StashError::Truncated { layer: "remap body" })?;
        Ok(Self {
            width,
            height,
            packed: body[..body_len].to_vec(),
        })
    }

    /// Serialize in the compact encoding (`flags = 1`).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REMAP_HEADER_SIZE + self.packed.len());
        buf.extend_from_slice(REMAP_MAGIC);
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&REMAP_FLAG_COMPACT.to_le_bytes());
        buf.extend_from_slice(&self.packed);
        buf
    }

    /// Widen back to 4-byte offsets, restoring the sentinel.
    pub fn expand(&self) -> RemapTable {
        let offsets = self
            .packed
            .chunks_exact(3)
            .map(|c| {
                let v = u32::from_le_bytes([c[0], c[1], c[2], 0]);
                if v == COMPACT_SENTINEL {
                    SENTINEL_OFFSET
                } else {
                    v
                }
            })
            .collect();
        RemapTable { width: self.width, height: self.height, offsets }
    }
}
