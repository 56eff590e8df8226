//! Record codec
//!
//! Encoding and decoding functions for record frames.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LogKvError, Result};

use super::{checksum, to_hex, Record, LEN_PREFIX_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE};

/// Upper bound on the initial allocation when reading a frame from a stream.
/// A corrupted prefix can claim gigabytes; the buffer only grows as bytes arrive.
const READ_CHUNK: usize = 64 * 1024;

/// Size of the frame `encode(key, value)` would produce
pub fn encoded_len(key: &str, value: &str) -> usize {
    MIN_FRAME_SIZE + key.len() + value.len()
}

/// Encode a key/value pair into a frame
///
/// Format: total (4) + key_len (4) + key + value_len (4) + value + sha1 (20)
///
/// The pair must fit `MAX_FRAME_SIZE` (see `checked_frame_len`); the store
/// rejects larger pairs before encoding.
pub fn encode(key: &str, value: &str) -> Vec<u8> {
    let total = encoded_len(key, value);
    let sum = checksum(key.as_bytes(), value.as_bytes());

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32_le(total as u32);
    buf.put_u32_le(key.len() as u32);
    buf.put_slice(key.as_bytes());
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value.as_bytes());
    buf.put_slice(&sum);

    buf.to_vec()
}

/// Decode exactly one frame
///
/// The buffer must hold the whole frame and nothing else.
pub fn decode(frame: &[u8]) -> Result<Record> {
    let (key, value, stored) = split_frame(frame)?;

    let computed = checksum(key, value);
    if stored != computed {
        return Err(LogKvError::ChecksumMismatch {
            stored: to_hex(stored),
            computed: to_hex(&computed),
        });
    }

    let key = String::from_utf8(key.to_vec())
        .map_err(|e| LogKvError::Corrupted(format!("key is not valid UTF-8: {}", e)))?;
    let value = String::from_utf8(value.to_vec())
        .map_err(|e| LogKvError::Corrupted(format!("value is not valid UTF-8: {}", e)))?;

    Ok(Record { key, value })
}

/// Key of a frame whose length fields are consistent, checksum not verified
///
/// Recovery uses this to keep a record that failed verification in the
/// index, so a read of that key reports the failure instead of falling back
/// to an older value.
pub fn decode_key_unverified(frame: &[u8]) -> Result<String> {
    let (key, _, _) = split_frame(frame)?;
    String::from_utf8(key.to_vec())
        .map_err(|e| LogKvError::Corrupted(format!("key is not valid UTF-8: {}", e)))
}

/// Size of the frame for a key and value of the given lengths, or `None`
/// when it does not fit the u32 length prefix
pub fn checked_frame_len(key_len: usize, value_len: usize) -> Option<usize> {
    let total = MIN_FRAME_SIZE.checked_add(key_len)?.checked_add(value_len)?;
    if total > MAX_FRAME_SIZE {
        return None;
    }
    Some(total)
}

/// Check the framing and split a frame into (key, value, stored checksum)
fn split_frame(frame: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    if frame.len() < LEN_PREFIX_SIZE {
        return Err(LogKvError::Truncated {
            expected: LEN_PREFIX_SIZE,
            available: frame.len(),
        });
    }

    let mut buf = frame;
    let total = buf.get_u32_le() as usize;

    if total < MIN_FRAME_SIZE {
        return Err(LogKvError::Corrupted(format!(
            "declared frame size {} is below the minimum of {}",
            total, MIN_FRAME_SIZE
        )));
    }
    if frame.len() < total {
        return Err(LogKvError::Truncated {
            expected: total,
            available: frame.len(),
        });
    }
    if frame.len() > total {
        return Err(LogKvError::Corrupted(format!(
            "declared frame size {} but {} bytes available",
            total,
            frame.len()
        )));
    }

    // Bytes left for key + value once every fixed-width field is accounted for
    let payload_len = total - MIN_FRAME_SIZE;

    let key_len = buf.get_u32_le() as usize;
    if key_len > payload_len {
        return Err(LogKvError::Corrupted(format!(
            "key length {} exceeds frame payload of {}",
            key_len, payload_len
        )));
    }
    let (key, rest) = buf.split_at(key_len);
    buf = rest;

    let value_len = buf.get_u32_le() as usize;
    if key_len + value_len != payload_len {
        return Err(LogKvError::Corrupted(format!(
            "key length {} + value length {} != frame payload of {}",
            key_len, value_len, payload_len
        )));
    }
    let (value, stored) = buf.split_at(value_len);

    Ok((key, value, stored))
}

/// Read one whole frame from a stream
///
/// Returns:
/// - `Ok(Some(frame))` — a complete frame (not yet checksum-verified)
/// - `Ok(None)` — clean EOF on a frame boundary
/// - `Err(Corrupted)` — EOF inside a frame, or an impossible length prefix
pub fn read_framed<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    let mut filled = 0;

    while filled < LEN_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if filled == 0 {
        return Ok(None);
    }
    if filled < LEN_PREFIX_SIZE {
        return Err(LogKvError::Corrupted(format!(
            "EOF inside length prefix ({} of {} bytes)",
            filled, LEN_PREFIX_SIZE
        )));
    }

    let total = u32::from_le_bytes(prefix) as usize;
    if total < MIN_FRAME_SIZE {
        return Err(LogKvError::Corrupted(format!(
            "declared frame size {} is below the minimum of {}",
            total, MIN_FRAME_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(total.min(READ_CHUNK));
    frame.extend_from_slice(&prefix);
    reader
        .by_ref()
        .take((total - LEN_PREFIX_SIZE) as u64)
        .read_to_end(&mut frame)?;

    if frame.len() < total {
        return Err(LogKvError::Corrupted(format!(
            "EOF mid-frame: expected {} bytes, got {}",
            total,
            frame.len()
        )));
    }

    Ok(Some(frame))
}
