//! Error types for logkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LogKvError
pub type Result<T> = std::result::Result<T, LogKvError>;

/// Unified error type for logkv operations
#[derive(Debug, Error)]
pub enum LogKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Truncated record: expected {expected} bytes, got {available}")]
    Truncated { expected: usize, available: usize },

    #[error("SHA1 checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("Record too large: key of {key_len} bytes and value of {value_len} bytes do not fit one frame")]
    RecordTooLarge { key_len: usize, value_len: usize },

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Segment {0} is sealed and cannot be appended to")]
    SegmentSealed(u64),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Store is closed")]
    Closed,
}

impl LogKvError {
    /// True for errors that mean the bytes on disk are not a valid record
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LogKvError::Corrupted(_)
                | LogKvError::Truncated { .. }
                | LogKvError::ChecksumMismatch { .. }
        )
    }
}
