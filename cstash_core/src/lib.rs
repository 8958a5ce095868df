pub mod archive;
pub mod envelope;
pub mod error;
pub mod format;
pub mod meta;
pub mod remap;
pub mod session;
pub mod slots;
pub mod sniff;
pub mod stash;

pub use archive::{for_each_entry, pack_entries, unpack, UnpackedCalib};
pub use error::{Result, StashError};
pub use meta::{CalibMeta, StashSummary};
pub use remap::{CompactRemapTable, RemapTable};
pub use slots::{SlotEntry, SlotIndex};
