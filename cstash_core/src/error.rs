use std::path::PathBuf;

use thiserror::Error;

use crate::format::MAX_SLOTS;

/// Every way a CSTASH buffer can fail to parse or build.
///
/// All core operations return these instead of panicking: the codec must be
/// safe against bytes read back from flaky storage or an interrupted
/// transfer. The `layer` fields name which framing level rejected the input.
#[derive(Error, Debug)]
pub enum StashError {
    #[error("bad magic at {layer} layer")]
    BadMagic { layer: &'static str },

    #[error("truncated input at {layer} layer: declared length exceeds buffer")]
    Truncated { layer: &'static str },

    #[error("compression envelope matched but the deflate stream is corrupt")]
    CorruptCompression,

    #[error("archive is missing mandatory entry {0:?}")]
    MissingMandatoryEntry(&'static str),

    #[error("slot {0} out of range (container holds {MAX_SLOTS} slots)")]
    SlotOutOfRange(usize),

    #[error("slot index claims a byte range beyond the container buffer")]
    SlotOverflow,

    #[error("slot {0} is empty")]
    SlotEmpty(usize),

    #[error("session source unavailable: {0}")]
    SourceUnavailable(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StashError>;
