//! Segment Recovery
//!
//! Rebuilds a segment's index by replaying its records in file order.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::record::{decode, decode_key_unverified, RecordReader};

use super::SegmentIndex;

/// Result of replaying one segment file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records indexed
    pub records_recovered: u64,

    /// Number of complete frames that failed verification
    pub records_corrupted: u64,

    /// Offset of the recovery boundary (end of the last complete frame)
    pub valid_len: u64,

    /// File length on disk before recovery
    pub file_len: u64,

    /// Whether trailing bytes past the boundary were cut off
    pub was_truncated: bool,
}

impl RecoveryResult {
    /// True if the file ends in a partial frame
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Replay a segment file into a fresh index
///
/// This will:
/// 1. Walk every frame from offset 0
/// 2. Index each verified record (later records for a key win)
/// 3. Count complete frames that fail verification; while their key can
///    still be read they stay indexed, so reading that key reports the
///    failure rather than an older value
/// 4. Stop at the first torn frame: that is the recovery boundary
///
/// The file is not modified.
pub fn replay(path: &Path) -> Result<(SegmentIndex, RecoveryResult)> {
    let file_len = fs::metadata(path)?.len();
    let mut reader = RecordReader::open(path)?;
    let mut index = SegmentIndex::new();
    let mut result = RecoveryResult {
        file_len,
        ..RecoveryResult::default()
    };

    loop {
        match reader.next_frame() {
            Ok(Some(frame)) => match decode(&frame.bytes) {
                Ok(record) => {
                    index.insert(record.key, frame.offset);
                    result.records_recovered += 1;
                }
                Err(e) => {
                    result.records_corrupted += 1;
                    match decode_key_unverified(&frame.bytes) {
                        Ok(key) => {
                            warn!(
                                path = %path.display(),
                                offset = frame.offset,
                                key = %key,
                                error = %e,
                                "Indexing record that failed verification"
                            );
                            index.insert(key, frame.offset);
                        }
                        Err(_) => warn!(
                            path = %path.display(),
                            offset = frame.offset,
                            error = %e,
                            "Skipping corrupted record with unreadable key"
                        ),
                    }
                }
            },
            Ok(None) => break,
            Err(e) if e.is_corruption() => {
                warn!(
                    path = %path.display(),
                    offset = reader.position(),
                    error = %e,
                    "Recovery boundary reached"
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }

    result.valid_len = reader.position();
    Ok((index, result))
}
