//! Segment Module
//!
//! One append-only file plus an in-memory index of where each key's most
//! recent record starts.
//!
//! ## Lifecycle
//! ```text
//!   create ──► active ──seal()──► sealed ──compaction──► replaced
//!              (append + read)    (read only)
//! ```
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── segment-0            (oldest)
//!   ├── segment-1
//!   ├── segment-2            (active: highest id)
//!   └── segment-0.compact    (only while a compaction is writing)
//! ```
//! There is no index file: indexes are rebuilt from the records at open.

mod builder;
mod file;
mod recovery;

use std::path::{Path, PathBuf};

pub use builder::SegmentBuilder;
pub use file::{Appended, Segment};
pub use recovery::{replay, RecoveryResult};

/// Key → offset of the key's most recent record in one segment file
pub type SegmentIndex = std::collections::HashMap<String, u64>;

const SEGMENT_PREFIX: &str = "segment-";
const COMPACTION_SUFFIX: &str = "compact";

/// "segment-42"
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{}", SEGMENT_PREFIX, id))
}

/// "segment-42.compact", the merge output before it is renamed into place
pub fn compaction_temp_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{}.{}", SEGMENT_PREFIX, id, COMPACTION_SUFFIX))
}

/// Parse segment ID from filename
/// "segment-42" → Some(42), "segment-42.compact" → None
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let id_str = name.strip_prefix(SEGMENT_PREFIX)?;
    id_str.parse().ok()
}

/// True for a leftover merge output of an interrupted compaction
pub fn is_compaction_temp(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    name.starts_with(SEGMENT_PREFIX) && path.extension().map_or(false, |ext| ext == COMPACTION_SUFFIX)
}
