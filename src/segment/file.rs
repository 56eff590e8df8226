//! Segment file
//!
//! An append-only file with its key → offset index.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::error::{LogKvError, Result};
use crate::record::{decode, read_framed, Record};

use super::recovery::{replay, RecoveryResult};
use super::{segment_path, SegmentIndex};

/// Where an appended frame landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Offset of the first byte of the frame
    pub offset: u64,
    /// Number of bytes written
    pub len: u64,
}

/// Write side of the active segment
struct SegmentWriter {
    file: File,
    sync_strategy: SyncStrategy,
    /// Appends since the last fsync
    unsynced: usize,
}

impl SegmentWriter {
    /// Counts the append just written and fsyncs when the strategy says so.
    /// On error the count is left as it was.
    fn sync_if_needed(&mut self) -> Result<()> {
        let pending = self.unsynced + 1;
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => pending >= count,
        };
        if due {
            self.file.sync_data()?;
            self.unsynced = 0;
        } else {
            self.unsynced = pending;
        }
        Ok(())
    }

    /// Cut the file back to `offset` and continue writing from there
    fn rollback(&mut self, segment: u64, offset: u64) {
        let result = self
            .file
            .set_len(offset)
            .and_then(|_| self.file.seek(SeekFrom::Start(offset)).map(|_| ()));
        if let Err(e) = result {
            warn!(segment, error = %e, "Failed to roll back partial append");
        }
    }
}

/// One segment: file + index
///
/// ## Concurrency:
/// - `index`: RwLock, written by the store's index worker and read by
///   lookups and the compactor
/// - `writer`: Mutex, `Some` while the segment is active. Appends hold it;
///   reads of the active segment take it too so they never see a frame
///   that is still being written
/// - `reader`: Mutex around a dedicated read handle. The handle stays valid
///   after compaction renames or deletes the file, so offsets resolved
///   before a compaction swap still read the old bytes
pub struct Segment {
    id: u64,
    path: PathBuf,
    index: RwLock<SegmentIndex>,
    reader: Mutex<File>,
    writer: Mutex<Option<SegmentWriter>>,
    /// Bytes of valid records in the file (next append offset while active)
    size: AtomicU64,
    active: AtomicBool,
}

impl Segment {
    /// Create a new, empty, active segment
    pub fn create(dir: &Path, id: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let reader = File::open(&path)?;

        debug!(segment = id, path = %path.display(), "Created segment");

        Ok(Self {
            id,
            path,
            index: RwLock::new(SegmentIndex::new()),
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(SegmentWriter {
                file,
                sync_strategy,
                unsynced: 0,
            })),
            size: AtomicU64::new(0),
            active: AtomicBool::new(true),
        })
    }

    /// Open an existing segment file and rebuild its index
    ///
    /// An active segment is truncated back to its recovery boundary so the
    /// next append lands right after the last valid record.
    pub fn open(
        dir: &Path,
        id: u64,
        sync_strategy: SyncStrategy,
        active: bool,
    ) -> Result<(Self, RecoveryResult)> {
        let path = segment_path(dir, id);
        let (index, mut result) = replay(&path)?;

        let writer = if active {
            let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
            if result.valid_len < result.file_len {
                warn!(
                    segment = id,
                    valid_len = result.valid_len,
                    file_len = result.file_len,
                    "Truncating torn tail of active segment"
                );
                file.set_len(result.valid_len)?;
                file.sync_all()?;
                result.was_truncated = true;
            }
            file.seek(SeekFrom::Start(result.valid_len))?;
            Some(SegmentWriter {
                file,
                sync_strategy,
                unsynced: 0,
            })
        } else {
            if result.valid_len < result.file_len {
                warn!(
                    segment = id,
                    valid_len = result.valid_len,
                    file_len = result.file_len,
                    "Sealed segment has unreadable trailing bytes"
                );
            }
            None
        };

        let reader = File::open(&path)?;
        let size = if active { result.valid_len } else { result.file_len };

        Ok((
            Self {
                id,
                path,
                index: RwLock::new(index),
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                size: AtomicU64::new(size),
                active: AtomicBool::new(active),
            },
            result,
        ))
    }

    /// Wrap an already written, sealed file whose index is known
    /// (the output of a compaction)
    pub fn sealed_with_index(dir: &Path, id: u64, index: SegmentIndex) -> Result<Self> {
        let path = segment_path(dir, id);
        let reader = File::open(&path)?;
        let size = reader.metadata()?.len();

        Ok(Self {
            id,
            path,
            index: RwLock::new(index),
            reader: Mutex::new(reader),
            writer: Mutex::new(None),
            size: AtomicU64::new(size),
            active: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // File Operations
    // =========================================================================

    /// Append an encoded frame at the end of the file
    ///
    /// If the write or its fsync fails the file is cut back to its previous
    /// length, so a failed append leaves nothing for recovery to pick up.
    pub fn append(&self, frame: &[u8]) -> Result<Appended> {
        self.append_with(frame, SegmentWriter::sync_if_needed)
    }

    fn append_with<F>(&self, frame: &[u8], sync: F) -> Result<Appended>
    where
        F: FnOnce(&mut SegmentWriter) -> Result<()>,
    {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(LogKvError::SegmentSealed(self.id))?;

        let offset = self.size.load(Ordering::Acquire);
        let written = writer
            .file
            .write_all(frame)
            .map_err(LogKvError::from)
            .and_then(|_| sync(&mut *writer));
        if let Err(e) = written {
            writer.rollback(self.id, offset);
            return Err(e);
        }

        let len = frame.len() as u64;
        self.size.store(offset + len, Ordering::Release);

        Ok(Appended { offset, len })
    }

    /// Read the record stored at `offset`
    pub fn read(&self, offset: u64) -> Result<Record> {
        // Active segment: exclude in-flight appends
        let _append_guard = if self.is_active() {
            Some(self.writer.lock())
        } else {
            None
        };

        let mut file = self.reader.lock();
        file.seek(SeekFrom::Start(offset))?;
        let frame = read_framed(&mut *file)?.ok_or_else(|| {
            LogKvError::Corrupted(format!(
                "no record at offset {} in segment {}",
                offset, self.id
            ))
        })?;

        decode(&frame)
    }

    /// Flush, fsync and drop the writer; the segment is read-only afterwards
    pub fn seal(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        self.active.store(false, Ordering::Release);
        if let Some(writer) = guard.take() {
            writer.file.sync_all()?;
            debug!(segment = self.id, size = self.size(), "Sealed segment");
        }
        Ok(())
    }

    /// Force an fsync of the active file (no-op when sealed)
    pub fn sync(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            writer.file.sync_data()?;
            writer.unsynced = 0;
        }
        Ok(())
    }

    // =========================================================================
    // Index Operations
    // =========================================================================

    /// Point `key` at the record written at `offset`
    pub fn record(&self, key: String, offset: u64) -> Option<u64> {
        self.index.write().insert(key, offset)
    }

    /// Offset of the key's most recent record in this segment
    pub fn lookup(&self, key: &str) -> Option<u64> {
        self.index.read().get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.read().contains_key(key)
    }

    /// Copy of the index, taken under the guard
    pub fn index_snapshot(&self) -> Vec<(String, u64)> {
        self.index
            .read()
            .iter()
            .map(|(key, offset)| (key.clone(), *offset))
            .collect()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of valid records
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn key_count(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("size", &self.size())
            .field("keys", &self.key_count())
            .field("active", &self.is_active())
            .finish()
    }
}
