//! Segment Builder
//!
//! Writes a complete segment file in one pass (the compaction output).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::encode;

use super::SegmentIndex;

/// Builder for a new segment file
pub struct SegmentBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of record
    index: SegmentIndex,
}

impl SegmentBuilder {
    /// Create (or overwrite) the output file
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            current_offset: 0,
            index: SegmentIndex::new(),
        })
    }

    /// Append a record
    pub fn add(&mut self, key: &str, value: &str) -> Result<()> {
        let frame = encode(key, value);
        self.writer.write_all(&frame)?;
        self.index.insert(key.to_string(), self.current_offset);
        self.current_offset += frame.len() as u64;
        Ok(())
    }

    /// Number of records added so far
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.current_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and fsync; returns the index of the written file and its size
    pub fn finish(mut self) -> Result<(SegmentIndex, u64)> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok((self.index, self.current_offset))
    }
}
