//! Segment set
//!
//! The ordered list of segments shared by the store's workers and the
//! compactor.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::compaction::{CompactionResult, Compactor};
use crate::config::Config;
use crate::error::{LogKvError, Result};
use crate::segment::Segment;

/// Segments ordered oldest → newest; the last one is active
pub(crate) type SegmentList = Arc<Vec<Arc<Segment>>>;

/// Shared store state
///
/// ## Concurrency:
/// - `segments`: RwLock around an `Arc<Vec<_>>`. Readers clone the Arc and
///   drop the lock; rotation and compaction replace the whole list
/// - `next_segment_id`: atomic counter
/// - `compacting`: at most one compaction at a time
pub(crate) struct SegmentSet {
    dir: PathBuf,
    config: Config,
    segments: RwLock<SegmentList>,
    next_segment_id: AtomicU64,
    compacting: AtomicBool,
    compaction_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the `compacting` flag when a compaction finishes, panics included
struct CompactionSlot<'a>(&'a AtomicBool);

impl Drop for CompactionSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SegmentSet {
    pub(crate) fn new(config: Config, segments: Vec<Arc<Segment>>, next_segment_id: u64) -> Self {
        debug_assert!(!segments.is_empty());
        Self {
            dir: config.data_dir.clone(),
            config,
            segments: RwLock::new(Arc::new(segments)),
            next_segment_id: AtomicU64::new(next_segment_id),
            compacting: AtomicBool::new(false),
            compaction_handle: Mutex::new(None),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Current list, consistent as of the call
    pub(crate) fn snapshot(&self) -> SegmentList {
        Arc::clone(&self.segments.read())
    }

    /// The writable segment
    pub(crate) fn active(&self) -> Arc<Segment> {
        let segments = self.segments.read();
        // Never empty: open always installs an active segment
        Arc::clone(&segments[segments.len() - 1])
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_segment_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Append a new active segment; returns the new segment count
    pub(crate) fn push(&self, segment: Arc<Segment>) -> usize {
        let mut segments = self.segments.write();
        let mut next = Vec::with_capacity(segments.len() + 1);
        next.extend(segments.iter().cloned());
        next.push(segment);
        *segments = Arc::new(next);
        segments.len()
    }

    /// Swap `merged` in for the first `replaced.len()` segments
    ///
    /// Segments appended after the compaction snapshot are kept as they are.
    pub(crate) fn replace_prefix(&self, replaced: &[Arc<Segment>], merged: Arc<Segment>) -> Result<()> {
        let mut segments = self.segments.write();

        let prefix_matches = segments.len() > replaced.len()
            && segments
                .iter()
                .zip(replaced)
                .all(|(current, old)| Arc::ptr_eq(current, old));
        if !prefix_matches {
            return Err(LogKvError::Corrupted(
                "segment list changed underneath compaction".to_string(),
            ));
        }

        let mut next = Vec::with_capacity(segments.len() - replaced.len() + 1);
        next.push(merged);
        next.extend(segments[replaced.len()..].iter().cloned());
        *segments = Arc::new(next);
        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Run a compaction on a background thread unless one is already running
    pub(crate) fn schedule_compaction(self: &Arc<Self>) {
        if self.compacting.swap(true, Ordering::AcqRel) {
            debug!("Compaction already running, skipping trigger");
            return;
        }

        let set = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("logkv-compaction".to_string())
            .spawn(move || {
                let _slot = CompactionSlot(&set.compacting);
                match Compactor::new(&set).run() {
                    Ok(Some(result)) => debug!(?result, "Background compaction finished"),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Background compaction failed"),
                }
            });

        match spawned {
            Ok(handle) => {
                // The previous handle belongs to a finished compaction
                if let Some(previous) = self.compaction_handle.lock().replace(handle) {
                    let _ = previous.join();
                }
            }
            Err(e) => {
                self.compacting.store(false, Ordering::Release);
                error!(error = %e, "Failed to spawn compaction thread");
            }
        }
    }

    /// Run a compaction on the calling thread, after any background one
    pub(crate) fn compact_now(&self) -> Result<Option<CompactionResult>> {
        loop {
            self.wait_for_compaction();
            if !self.compacting.swap(true, Ordering::AcqRel) {
                break;
            }
            thread::yield_now();
        }

        let _slot = CompactionSlot(&self.compacting);
        let result = Compactor::new(self).run()?;
        if let Some(result) = &result {
            info!(
                merged_segments = result.merged_segments,
                bytes_before = result.bytes_before,
                bytes_after = result.bytes_after,
                "Manual compaction finished"
            );
        }
        Ok(result)
    }

    /// Block until the last scheduled background compaction has finished
    pub(crate) fn wait_for_compaction(&self) {
        let handle = self.compaction_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Compaction thread panicked");
            }
        }
    }

    pub(crate) fn is_compacting(&self) -> bool {
        self.compacting.load(Ordering::Acquire)
    }
}
