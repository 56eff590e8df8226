//! Store Module
//!
//! The storage engine that coordinates segments, workers and compaction.
//!
//! ## Responsibilities
//! - Recover segment indexes from disk on open
//! - Serialize Puts through the write worker
//! - Serialize index reads and writes through the index worker
//! - Rotate the active segment at the size limit
//! - Trigger background compaction

mod index;
mod segments;
mod writer;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use tracing::{debug, info, warn};

use crate::compaction::CompactionResult;
use crate::config::Config;
use crate::error::{LogKvError, Result};
use crate::segment::{is_compaction_temp, parse_segment_id, RecoveryResult, Segment};

pub use index::KeyPosition;
pub(crate) use segments::SegmentSet;

use index::{IndexOp, IndexWorker};
use writer::{WriteRequest, WriteWorker};

/// What `open` found on disk
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Per-segment replay results, oldest first
    pub segments: Vec<(u64, RecoveryResult)>,

    /// Leftover compaction outputs that were removed
    pub stale_files_removed: usize,
}

impl RecoveryReport {
    pub fn records_recovered(&self) -> u64 {
        self.segments.iter().map(|(_, r)| r.records_recovered).sum()
    }

    pub fn records_corrupted(&self) -> u64 {
        self.segments.iter().map(|(_, r)| r.records_corrupted).sum()
    }

    /// IDs of segments that ended in a torn frame
    pub fn torn_segments(&self) -> Vec<u64> {
        self.segments
            .iter()
            .filter(|(_, r)| r.has_torn_tail())
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Point-in-time store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub segment_count: usize,
    pub active_segment_id: u64,
    /// Distinct keys across all segments
    pub key_count: usize,
    /// Bytes of records on disk, garbage included
    pub total_bytes: u64,
    pub compacting: bool,
}

/// The log-structured key-value store
///
/// ## Concurrency Model: two single-owner workers
///
/// - **Writes** (put): queued to the write worker thread, applied one at a
///   time; the caller blocks until its own Put is done
/// - **Index** (lookups and post-append index writes): queued to the index
///   worker thread, applied one at a time in arrival order
/// - **Value reads**: done on the caller's thread once the index worker has
///   resolved the segment and offset
/// - **Compaction**: background thread; publishes its result with one
///   segment-list swap
///
/// `Store` is `Send + Sync`; share it with `Arc<Store>`.
///
/// Dropping a store runs the same shutdown as `close`, errors aside, so no
/// worker or compaction thread outlives it.
pub struct Store {
    set: Arc<SegmentSet>,
    /// `None` once shut down
    write_tx: Option<Sender<WriteRequest>>,
    index_tx: Option<Sender<IndexOp>>,
    workers: Vec<JoinHandle<()>>,
    recovery: RecoveryReport,
}

impl Store {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Remove leftover compaction outputs
    /// 3. Replay every segment file, oldest first
    /// 4. Make the newest segment active (or create `segment-0`)
    /// 5. Start the index and write workers
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let dir = config.data_dir.clone();
        let mut recovery = RecoveryReport::default();
        let mut ids = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if is_compaction_temp(&path) {
                warn!(path = %path.display(), "Removing leftover compaction output");
                fs::remove_file(&path)?;
                recovery.stale_files_removed += 1;
            } else if let Some(id) = parse_segment_id(&path) {
                ids.push(id);
            }
        }
        ids.sort_unstable();

        let mut segments = Vec::with_capacity(ids.len().max(1));
        for (i, &id) in ids.iter().enumerate() {
            let active = i == ids.len() - 1;
            let (segment, result) = Segment::open(&dir, id, config.sync_strategy, active)?;
            recovery.segments.push((id, result));
            segments.push(Arc::new(segment));
        }

        let next_segment_id = match ids.last() {
            Some(&id) => id + 1,
            None => {
                segments.push(Arc::new(Segment::create(&dir, 0, config.sync_strategy)?));
                1
            }
        };

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            records_recovered = recovery.records_recovered(),
            records_corrupted = recovery.records_corrupted(),
            "Opened store"
        );

        let set = Arc::new(SegmentSet::new(config, segments, next_segment_id));
        let (index_tx, index_rx) = channel::unbounded();
        let (write_tx, write_rx) = channel::unbounded();

        let index_worker = IndexWorker::new(Arc::clone(&set));
        let write_worker = WriteWorker::new(Arc::clone(&set), index_tx.clone());

        let workers = vec![
            thread::Builder::new()
                .name("logkv-index".to_string())
                .spawn(move || index_worker.run(index_rx))?,
            thread::Builder::new()
                .name("logkv-writer".to_string())
                .spawn(move || write_worker.run(write_rx))?,
        ];

        Ok(Self {
            set,
            write_tx: Some(write_tx),
            index_tx: Some(index_tx),
            workers,
            recovery,
        })
    }

    /// Open with a directory and segment size (other settings default)
    pub fn open_path(path: &Path, segment_size_limit: u64) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .segment_size_limit(segment_size_limit)
            .build();
        Self::open(config)
    }

    /// Get the value for a key
    ///
    /// Search order: segments newest → oldest; the first hit wins.
    pub fn get(&self, key: &str) -> Result<String> {
        let index_tx = self.index_tx.as_ref().ok_or(LogKvError::Closed)?;
        let (reply_tx, reply_rx) = channel::bounded(1);
        index_tx
            .send(IndexOp::Lookup {
                key: key.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| LogKvError::Closed)?;

        let position = reply_rx
            .recv()
            .map_err(|_| LogKvError::Closed)?
            .ok_or(LogKvError::KeyNotFound)?;

        let record = position.segment.read(position.offset)?;
        if record.key != key {
            return Err(LogKvError::Corrupted(format!(
                "segment {} offset {} holds key {:?}, expected {:?}",
                position.segment.id(),
                position.offset,
                record.key,
                key
            )));
        }

        Ok(record.value)
    }

    /// Put a key-value pair
    ///
    /// Returns once the record is appended and indexed.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let write_tx = self.write_tx.as_ref().ok_or(LogKvError::Closed)?;
        let (reply_tx, reply_rx) = channel::bounded(1);
        write_tx
            .send(WriteRequest {
                key: key.to_string(),
                value: value.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| LogKvError::Closed)?;

        reply_rx.recv().map_err(|_| LogKvError::Closed)?
    }

    /// Compact all sealed segments now, on the calling thread
    pub fn compact(&self) -> Result<Option<CompactionResult>> {
        self.set.compact_now()
    }

    /// Block until the most recent background compaction has finished
    pub fn wait_for_compaction(&self) {
        self.set.wait_for_compaction();
    }

    /// Close the store gracefully
    ///
    /// Stops both workers, waits for a running compaction, then seals the
    /// active segment (flush + fsync).
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.write_tx.is_none() {
            return Ok(());
        }

        // The write worker holds its own index sender, so the index worker
        // drains after the write worker exits
        self.write_tx = None;
        self.index_tx = None;

        let mut panicked = false;
        for worker in self.workers.drain(..) {
            panicked |= worker.join().is_err();
        }

        self.set.wait_for_compaction();
        self.set.active().seal()?;

        if panicked {
            return Err(LogKvError::Closed);
        }

        debug!(dir = %self.set.dir().display(), "Closed store");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        self.set.dir()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        self.set.config()
    }

    /// Get the number of segments, active one included
    pub fn segment_count(&self) -> usize {
        self.set.len()
    }

    /// Segment file paths, oldest first
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.set
            .snapshot()
            .iter()
            .map(|segment| segment.path().to_path_buf())
            .collect()
    }

    /// Get what recovery found when the store was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn stats(&self) -> StoreStats {
        let segments = self.set.snapshot();
        let mut keys = HashSet::new();
        for segment in segments.iter() {
            keys.extend(segment.index_snapshot().into_iter().map(|(key, _)| key));
        }

        StoreStats {
            segment_count: segments.len(),
            active_segment_id: segments[segments.len() - 1].id(),
            key_count: keys.len(),
            total_bytes: segments.iter().map(|segment| segment.size()).sum(),
            compacting: self.set.is_compacting(),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(dir = %self.set.dir().display(), error = %e, "Error closing store on drop");
        }
    }
}
