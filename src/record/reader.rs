//! Record Reader
//!
//! Walks a stream of frames in file order. Used by segment recovery and by
//! the CLI's `dump` command.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

use super::{decode, read_framed, Record};

/// A raw frame and the offset it starts at
#[derive(Debug, Clone)]
pub struct Frame {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Offset of the byte right after this frame
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }
}

/// Sequential reader over framed records
pub struct RecordReader<R: Read> {
    reader: R,
    /// Offset of the next frame
    position: u64,
    /// Set once the stream ended or framing broke
    done: bool,
}

impl RecordReader<BufReader<File>> {
    /// Open a segment file for sequential reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            done: false,
        }
    }

    /// Offset of the next frame (equals the valid length once the stream is exhausted)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next raw frame without verifying it
    ///
    /// A framing error leaves `position` at the start of the broken frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        match read_framed(&mut self.reader) {
            Ok(Some(bytes)) => {
                let frame = Frame {
                    offset: self.position,
                    bytes,
                };
                self.position = frame.end();
                Ok(Some(frame))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<(u64, Record)>;

    /// Yields decoded records with their offsets. Stops after the first
    /// framing error; a checksum failure is yielded and the walk continues.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(decode(&frame.bytes).map(|record| (frame.offset, record))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
