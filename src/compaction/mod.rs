//! Compaction module for merging sealed segments.
//!
//! Merges every sealed segment into one, keeping only the newest record for
//! each key.
//!
//! ## Compaction Trigger
//!
//! - A rotation that brings the segment count (active one included) to
//!   `Config::compaction_trigger` schedules a background compaction
//! - `Store::compact` runs one on demand
//!
//! ## Process
//!
//! 1. Snapshot the segment list; the merge range is everything but the active segment
//! 2. For each segment, copy its index under the guard, then drop the guard
//! 3. Skip keys that a newer segment in the range also holds (shadowed)
//! 4. Write survivors to `segment-<first>.compact`, fsync, rename over `segment-<first>`
//! 5. Swap `[merged]` in for the range in one list replacement
//! 6. Delete the other range files, oldest first
//!
//! Deleting oldest first means a crash at any point leaves a suffix of the
//! range on disk, and replaying a suffix after the merged file yields the
//! same newest values.

use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{LogKvError, Result};
use crate::segment::{compaction_temp_path, segment_path, Segment, SegmentBuilder};
use crate::store::SegmentSet;

/// Outcome of one compaction cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// ID of the merged segment (the oldest ID in the range)
    pub output_id: u64,
    /// Number of sealed segments merged
    pub merged_segments: usize,
    /// Records copied into the merged segment
    pub records_written: usize,
    /// Index entries dropped because a newer segment shadows them
    pub records_dropped: usize,
    /// Total size of the merged range before compaction
    pub bytes_before: u64,
    /// Size of the merged segment
    pub bytes_after: u64,
}

/// Executes one compaction over a segment set
pub(crate) struct Compactor<'a> {
    set: &'a SegmentSet,
}

impl<'a> Compactor<'a> {
    pub(crate) fn new(set: &'a SegmentSet) -> Self {
        Self { set }
    }

    /// Run the compaction
    ///
    /// Returns `Ok(None)` when there is no sealed segment to merge. On error
    /// the live segment list is left untouched.
    pub(crate) fn run(&self) -> Result<Option<CompactionResult>> {
        let snapshot = self.set.snapshot();
        if snapshot.len() < 2 {
            return Ok(None);
        }

        let range: Vec<Arc<Segment>> = snapshot[..snapshot.len() - 1].to_vec();
        let output_id = range[0].id();
        let temp_path = compaction_temp_path(self.set.dir(), output_id);

        info!(
            segments = range.len(),
            output_id,
            "Starting compaction"
        );

        match self.merge(&range, output_id) {
            Ok(result) => {
                info!(
                    output_id,
                    merged_segments = result.merged_segments,
                    records_written = result.records_written,
                    records_dropped = result.records_dropped,
                    bytes_before = result.bytes_before,
                    bytes_after = result.bytes_after,
                    "Compaction finished"
                );
                Ok(Some(result))
            }
            Err(e) => {
                if temp_path.exists() {
                    if let Err(remove_err) = fs::remove_file(&temp_path) {
                        warn!(path = %temp_path.display(), error = %remove_err, "Failed to remove compaction output");
                    }
                }
                Err(e)
            }
        }
    }

    fn merge(&self, range: &[Arc<Segment>], output_id: u64) -> Result<CompactionResult> {
        let dir = self.set.dir();
        let temp_path = compaction_temp_path(dir, output_id);
        let bytes_before: u64 = range.iter().map(|segment| segment.size()).sum();

        let mut builder = SegmentBuilder::new(&temp_path)?;
        let mut records_dropped = 0;

        for (i, segment) in range.iter().enumerate() {
            let newer = &range[i + 1..];

            for (key, offset) in segment.index_snapshot() {
                if newer.iter().any(|s| s.contains(&key)) {
                    records_dropped += 1;
                    continue;
                }

                let record = segment.read(offset)?;
                if record.key != key {
                    return Err(LogKvError::Corrupted(format!(
                        "segment {} offset {} holds key {:?}, index says {:?}",
                        segment.id(),
                        offset,
                        record.key,
                        key
                    )));
                }
                builder.add(&record.key, &record.value)?;
            }
        }

        let records_written = builder.record_count();
        let (index, bytes_after) = builder.finish()?;

        // From here on the merged data is on disk under its final name
        fs::rename(&temp_path, segment_path(dir, output_id))?;
        let merged = Arc::new(Segment::sealed_with_index(dir, output_id, index)?);
        self.set.replace_prefix(range, merged)?;

        for old in &range[1..] {
            if let Err(e) = fs::remove_file(old.path()) {
                warn!(segment = old.id(), error = %e, "Failed to delete merged segment file");
            }
        }

        Ok(CompactionResult {
            output_id,
            merged_segments: range.len(),
            records_written,
            records_dropped,
            bytes_before,
            bytes_after,
        })
    }
}
