//! Tests for segment replay
//!
//! These tests verify:
//! - Replay of an empty file and of clean files
//! - Later records for a key win
//! - Torn tails (partial writes) become the recovery boundary
//! - Checksum failures are counted and stay indexed
//! - Replay never modifies the file

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use logkv::record::encode;
use logkv::segment::replay;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_segment() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("segment-0");
    (temp_dir, path)
}

fn write_records(path: &PathBuf, pairs: &[(&str, &str)]) {
    let mut file = File::create(path).unwrap();
    for (key, value) in pairs {
        file.write_all(&encode(key, value)).unwrap();
    }
    file.sync_all().unwrap();
}

fn numbered_pairs(count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|i| (format!("key{}", i), format!("value{}", i)))
        .collect()
}

// =============================================================================
// Clean File Tests
// =============================================================================

#[test]
fn test_replay_empty_file() {
    let (_temp, path) = setup_temp_segment();
    File::create(&path).unwrap();

    let (index, result) = replay(&path).unwrap();

    assert!(index.is_empty());
    assert_eq!(result.records_recovered, 0);
    assert_eq!(result.records_corrupted, 0);
    assert_eq!(result.valid_len, 0);
    assert_eq!(result.file_len, 0);
    assert!(!result.has_torn_tail());
    assert!(!result.was_truncated);
}

#[test]
fn test_replay_clean_file() {
    let (_temp, path) = setup_temp_segment();
    let pairs = numbered_pairs(50);
    let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    write_records(&path, &borrowed);

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 50);
    assert_eq!(index.len(), 50);
    assert_eq!(result.valid_len, result.file_len);
    assert_eq!(index.get("key0"), Some(&0));
}

#[test]
fn test_replay_keeps_latest_offset() {
    let (_temp, path) = setup_temp_segment();
    write_records(
        &path,
        &[("key1", "value1"), ("key2", "value2"), ("key1", "value3")],
    );

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 3);
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("key1"), Some(&84));
    assert_eq!(index.get("key2"), Some(&42));
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_replay_stops_at_partial_frame() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1"), ("key2", "value2")]);
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&encode("key3", "value3")[..30]).unwrap();
    drop(file);

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 2);
    assert_eq!(result.valid_len, 84);
    assert_eq!(result.file_len, 114);
    assert!(result.has_torn_tail());
    assert!(!index.contains_key("key3"));
}

#[test]
fn test_replay_stops_at_partial_length_prefix() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1")]);
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[42, 0]).unwrap();
    drop(file);

    let (_, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 1);
    assert_eq!(result.valid_len, 42);
    assert_eq!(result.file_len, 44);
}

#[test]
fn test_replay_stops_at_zeroed_tail() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1")]);
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0u8; 64]).unwrap();
    drop(file);

    let (index, result) = replay(&path).unwrap();

    assert_eq!(index.len(), 1);
    assert_eq!(result.valid_len, 42);
}

#[test]
fn test_replay_does_not_modify_file() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1")]);
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[9, 9, 9]).unwrap();
    drop(file);

    replay(&path).unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), 45);
}

// =============================================================================
// Corrupted Record Tests
// =============================================================================

#[test]
fn test_replay_indexes_checksum_failures() {
    let (_temp, path) = setup_temp_segment();
    write_records(
        &path,
        &[("key1", "value1"), ("key2", "value2"), ("key3", "value3")],
    );
    let mut bytes = fs::read(&path).unwrap();
    bytes[42 + 18] ^= 0xFF; // inside key2's value
    fs::write(&path, &bytes).unwrap();

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 2);
    assert_eq!(result.records_corrupted, 1);
    assert_eq!(result.valid_len, 126);
    assert!(index.contains_key("key1"));
    assert_eq!(index.get("key2"), Some(&42));
    assert_eq!(index.get("key3"), Some(&84));
}

#[test]
fn test_replay_corrupted_newer_record_shadows_older() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1"), ("key1", "value2")]);
    let mut bytes = fs::read(&path).unwrap();
    bytes[42 + 16] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_corrupted, 1);
    assert_eq!(index.get("key1"), Some(&42));
}

#[test]
fn test_replay_skips_frame_with_unreadable_key() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1"), ("key2", "value2")]);
    let mut bytes = fs::read(&path).unwrap();
    bytes[42 + 8] = 0xFF; // first key byte of key2, now invalid UTF-8
    fs::write(&path, &bytes).unwrap();

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_recovered, 1);
    assert_eq!(result.records_corrupted, 1);
    assert_eq!(index.len(), 1);
    assert_eq!(result.valid_len, 84);
}

#[test]
fn test_replay_skips_frame_with_inconsistent_lengths() {
    let (_temp, path) = setup_temp_segment();
    write_records(&path, &[("key1", "value1"), ("key2", "value2")]);
    let mut bytes = fs::read(&path).unwrap();
    bytes[42 + 4..42 + 8].copy_from_slice(&30u32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let (index, result) = replay(&path).unwrap();

    assert_eq!(result.records_corrupted, 1);
    assert!(!index.contains_key("key2"));
    assert_eq!(result.valid_len, 84);
}
