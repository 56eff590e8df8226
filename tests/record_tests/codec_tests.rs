//! Tests for the record codec
//!
//! These tests verify:
//! - Encode/decode round trips and the exact frame layout
//! - Tamper detection via the SHA-1 checksum
//! - Truncated and inconsistent frames
//! - Stream framing (`read_framed`) at and inside frame boundaries

use std::io::Cursor;

use logkv::record::{
    checked_frame_len, decode, decode_key_unverified, encode, encoded_len, read_framed, Record,
    MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use logkv::LogKvError;
use sha1::{Digest, Sha1};

// =============================================================================
// Helper Functions
// =============================================================================

/// Hand-built frame with a correct checksum over arbitrary bytes
fn raw_frame(key: &[u8], value: &[u8]) -> Vec<u8> {
    let total = (MIN_FRAME_SIZE + key.len() + value.len()) as u32;
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(value);
    let digest = hasher.finalize();

    let mut frame = Vec::new();
    frame.extend_from_slice(&total.to_le_bytes());
    frame.extend_from_slice(&(key.len() as u32).to_le_bytes());
    frame.extend_from_slice(key);
    frame.extend_from_slice(&(value.len() as u32).to_le_bytes());
    frame.extend_from_slice(value);
    frame.extend_from_slice(&digest);
    frame
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_encode_decode_roundtrip() {
    let frame = encode("key", "value");
    let record = decode(&frame).unwrap();

    assert_eq!(record.key, "key");
    assert_eq!(record.value, "value");
}

#[test]
fn test_roundtrip_assorted_pairs() {
    let pairs = [
        ("", ""),
        ("k", ""),
        ("", "v"),
        ("ключ", "значення"),
        ("emoji 🔑", "value with\nnewlines\tand tabs"),
    ];

    for (key, value) in pairs {
        let record = decode(&encode(key, value)).unwrap();
        assert_eq!(record, Record::new(key, value));
    }
}

#[test]
fn test_roundtrip_large_value() {
    let value = "x".repeat(1024 * 1024);
    let record = decode(&encode("big", &value)).unwrap();

    assert_eq!(record.value.len(), 1024 * 1024);
    assert_eq!(record.value, value);
}

#[test]
fn test_record_methods_match_free_functions() {
    let record = Record::new("key1", "value1");

    assert_eq!(record.encode(), encode("key1", "value1"));
    assert_eq!(record.encoded_len(), 42);
    assert_eq!(Record::decode(&record.encode()).unwrap(), record);
}

// =============================================================================
// Frame Layout Tests
// =============================================================================

#[test]
fn test_frame_layout() {
    let frame = encode("key1", "value1");

    assert_eq!(frame.len(), 42);
    assert_eq!(&frame[0..4], &42u32.to_le_bytes());
    assert_eq!(&frame[4..8], &4u32.to_le_bytes());
    assert_eq!(&frame[8..12], b"key1");
    assert_eq!(&frame[12..16], &6u32.to_le_bytes());
    assert_eq!(&frame[16..22], b"value1");
    assert_eq!(hex(&frame[22..42]), "72fcc8b9a55f0d42f4b375d519f84fcef4e894b9");
}

#[test]
fn test_checksum_covers_key_and_value() {
    let frame = encode("key", "test-value");
    let sum = &frame[frame.len() - 20..];

    // SHA-1("key" ++ "test-value")
    assert_eq!(hex(sum), "9b857dae979b1a9d70b259ad6908929a366c65aa");
}

#[test]
fn test_encoded_len_matches_encode() {
    for (key, value) in [("", ""), ("a", "b"), ("key1", "value1"), ("long key", "long value")] {
        assert_eq!(encoded_len(key, value), encode(key, value).len());
    }
    assert_eq!(encoded_len("", ""), MIN_FRAME_SIZE);
}

#[test]
fn test_checked_frame_len() {
    assert_eq!(checked_frame_len(4, 6), Some(42));
    assert_eq!(checked_frame_len(0, 0), Some(MIN_FRAME_SIZE));
    assert_eq!(
        checked_frame_len(MAX_FRAME_SIZE - MIN_FRAME_SIZE, 0),
        Some(MAX_FRAME_SIZE)
    );
    assert_eq!(checked_frame_len(MAX_FRAME_SIZE - MIN_FRAME_SIZE, 1), None);
    assert_eq!(checked_frame_len(u32::MAX as usize, 0), None);
    assert_eq!(checked_frame_len(usize::MAX, usize::MAX), None);
}

#[test]
fn test_record_too_large_message() {
    let err = LogKvError::RecordTooLarge {
        key_len: 3,
        value_len: u32::MAX as usize,
    };

    assert!(err.to_string().contains("too large"));
    assert!(!err.is_corruption());
}

#[test]
fn test_encode_is_deterministic() {
    assert_eq!(encode("key", "value"), encode("key", "value"));
}

// =============================================================================
// Tamper Detection Tests
// =============================================================================

#[test]
fn test_flipping_any_value_byte_is_checksum_mismatch() {
    let frame = encode("key1", "value1");

    // Value bytes live at [16, 22)
    for i in 16..22 {
        let mut tampered = frame.clone();
        tampered[i] ^= 0x01;

        let err = decode(&tampered).unwrap_err();
        assert!(
            matches!(err, LogKvError::ChecksumMismatch { .. }),
            "byte {}: expected ChecksumMismatch, got {:?}",
            i,
            err
        );
    }
}

#[test]
fn test_flipping_key_byte_is_checksum_mismatch() {
    let mut frame = encode("key1", "value1");
    frame[9] ^= 0xFF;

    assert!(matches!(
        decode(&frame).unwrap_err(),
        LogKvError::ChecksumMismatch { .. }
    ));
}

#[test]
fn test_flipping_checksum_byte_is_checksum_mismatch() {
    let mut frame = encode("key1", "value1");
    let last = frame.len() - 1;
    frame[last] ^= 0x80;

    assert!(matches!(
        decode(&frame).unwrap_err(),
        LogKvError::ChecksumMismatch { .. }
    ));
}

#[test]
fn test_key_readable_from_frame_failing_checksum() {
    let mut frame = encode("key1", "value1");
    frame[16] ^= 0x01;

    assert!(decode(&frame).is_err());
    assert_eq!(decode_key_unverified(&frame).unwrap(), "key1");
}

#[test]
fn test_key_unreadable_from_inconsistent_frame() {
    let mut frame = encode("key1", "value1");
    frame[12..16].copy_from_slice(&5u32.to_le_bytes());

    assert!(matches!(
        decode_key_unverified(&frame).unwrap_err(),
        LogKvError::Corrupted(_)
    ));
}

#[test]
fn test_checksum_error_mentions_sha1() {
    let mut frame = encode("key1", "value1");
    frame[16] = b'V';

    let message = decode(&frame).unwrap_err().to_string();
    assert!(message.contains("SHA1"), "message was: {}", message);
}

// =============================================================================
// Truncated / Corrupted Frame Tests
// =============================================================================

#[test]
fn test_decode_shorter_than_prefix() {
    let err = decode(&[42, 0, 0]).unwrap_err();

    assert!(matches!(
        err,
        LogKvError::Truncated {
            expected: 4,
            available: 3
        }
    ));
}

#[test]
fn test_decode_truncated_frame() {
    let frame = encode("key1", "value1");
    let err = decode(&frame[..41]).unwrap_err();

    assert!(matches!(
        err,
        LogKvError::Truncated {
            expected: 42,
            available: 41
        }
    ));
}

#[test]
fn test_decode_trailing_bytes_is_corrupted() {
    let mut frame = encode("key1", "value1");
    frame.push(0);

    assert!(matches!(decode(&frame).unwrap_err(), LogKvError::Corrupted(_)));
}

#[test]
fn test_decode_declared_size_below_minimum() {
    let mut frame = encode("key1", "value1");
    frame[0..4].copy_from_slice(&10u32.to_le_bytes());

    assert!(matches!(decode(&frame).unwrap_err(), LogKvError::Corrupted(_)));
}

#[test]
fn test_decode_key_length_beyond_payload() {
    let mut frame = encode("key1", "value1");
    frame[4..8].copy_from_slice(&100u32.to_le_bytes());

    assert!(matches!(decode(&frame).unwrap_err(), LogKvError::Corrupted(_)));
}

#[test]
fn test_decode_inconsistent_inner_lengths() {
    let mut frame = encode("key1", "value1");
    frame[12..16].copy_from_slice(&5u32.to_le_bytes());

    assert!(matches!(decode(&frame).unwrap_err(), LogKvError::Corrupted(_)));
}

#[test]
fn test_decode_invalid_utf8_with_valid_checksum() {
    let frame = raw_frame(b"key", &[0xFF, 0xFE, 0xFD]);

    assert!(matches!(decode(&frame).unwrap_err(), LogKvError::Corrupted(_)));
}

#[test]
fn test_corruption_classification() {
    assert!(LogKvError::Corrupted("x".to_string()).is_corruption());
    assert!(LogKvError::Truncated { expected: 4, available: 0 }.is_corruption());
    assert!(!LogKvError::KeyNotFound.is_corruption());
}

// =============================================================================
// read_framed Tests
// =============================================================================

#[test]
fn test_read_framed_sequence_then_clean_eof() {
    let mut stream = encode("key1", "value1");
    stream.extend(encode("key2", "value2"));
    let mut cursor = Cursor::new(stream);

    let first = read_framed(&mut cursor).unwrap().unwrap();
    let second = read_framed(&mut cursor).unwrap().unwrap();

    assert_eq!(decode(&first).unwrap(), Record::new("key1", "value1"));
    assert_eq!(decode(&second).unwrap(), Record::new("key2", "value2"));
    assert!(read_framed(&mut cursor).unwrap().is_none());
}

#[test]
fn test_read_framed_empty_stream() {
    let mut cursor = Cursor::new(Vec::<u8>::new());

    assert!(read_framed(&mut cursor).unwrap().is_none());
}

#[test]
fn test_read_framed_eof_inside_prefix() {
    let frame = encode("key1", "value1");
    let mut cursor = Cursor::new(frame[..2].to_vec());

    assert!(matches!(
        read_framed(&mut cursor).unwrap_err(),
        LogKvError::Corrupted(_)
    ));
}

#[test]
fn test_read_framed_eof_mid_frame() {
    let frame = encode("key1", "value1");
    let mut cursor = Cursor::new(frame[..30].to_vec());

    assert!(matches!(
        read_framed(&mut cursor).unwrap_err(),
        LogKvError::Corrupted(_)
    ));
}

#[test]
fn test_read_framed_huge_prefix_on_short_stream() {
    let mut bytes = u32::MAX.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0u8; 16]);
    let mut cursor = Cursor::new(bytes);

    assert!(matches!(
        read_framed(&mut cursor).unwrap_err(),
        LogKvError::Corrupted(_)
    ));
}

#[test]
fn test_read_framed_prefix_below_minimum() {
    let mut bytes = 8u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0u8; 4]);
    let mut cursor = Cursor::new(bytes);

    assert!(matches!(
        read_framed(&mut cursor).unwrap_err(),
        LogKvError::Corrupted(_)
    ));
}

#[test]
fn test_read_framed_does_not_verify_checksum() {
    let mut frame = encode("key1", "value1");
    frame[16] ^= 0x01;
    let mut cursor = Cursor::new(frame.clone());

    let read = read_framed(&mut cursor).unwrap().unwrap();
    assert_eq!(read, frame);
    assert!(matches!(
        decode(&read).unwrap_err(),
        LogKvError::ChecksumMismatch { .. }
    ));
}
