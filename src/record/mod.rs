//! Record Module
//!
//! The unit of storage: one key/value pair framed for an append-only file.
//!
//! ## Responsibilities
//! - Self-delimiting binary framing (sequential scans need no side index)
//! - SHA-1 checksum over key + value, verified on every decode
//! - Stream framing for recovery and segment reads
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬──────────┬─────┬──────────┬───────┬────────────┐
//! │ Total (4) │ KeyLen(4)│ Key │ ValLen(4)│ Value │ SHA-1 (20) │
//! └───────────┴──────────┴─────┴──────────┴───────┴────────────┘
//! ```
//! All integers are little-endian u32. `Total` covers the whole frame,
//! itself included.

mod codec;
mod reader;

use sha1::{Digest, Sha1};

pub use codec::{
    checked_frame_len, decode, decode_key_unverified, encode, encoded_len, read_framed,
};
pub use reader::{Frame, RecordReader};

/// Size of the leading total-length prefix
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of the trailing SHA-1 digest
pub const CHECKSUM_SIZE: usize = 20;

/// Frame size for an empty key and an empty value:
/// Total (4) + KeyLen (4) + ValLen (4) + SHA-1 (20) = 32 bytes
pub const MIN_FRAME_SIZE: usize = LEN_PREFIX_SIZE + 4 + 4 + CHECKSUM_SIZE;

/// Largest frame the u32 length prefix can describe
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// A decoded key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Encode this record into a frame
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.key, &self.value)
    }

    /// Decode a single complete frame
    pub fn decode(frame: &[u8]) -> crate::Result<Self> {
        decode(frame)
    }

    /// Size of the encoded frame, without encoding it
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.key, &self.value)
    }
}

/// SHA-1 over the key bytes followed by the value bytes
pub(crate) fn checksum(key: &[u8], value: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(value);
    let digest = hasher.finalize();

    let mut sum = [0u8; CHECKSUM_SIZE];
    sum.copy_from_slice(&digest);
    sum
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
