//! Tests for SSTable building, reading and manager-level merging
//!
//! These tests verify:
//! - Writing and reading values, tombstones and expiry stamps
//! - Key ordering enforcement in the builder
//! - Range and prefix checks on a reader
//! - StorageManager flush, newest-wins lookup and rediscovery on reopen
//! - Prefix scans merged across tables

use std::path::PathBuf;

use blinkkv::memtable::{MemTable, MemTableEntry};
use blinkkv::storage::{SSTableBuilder, SSTableReader, StorageManager};
use blinkkv::BlinkError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn value(v: &[u8]) -> MemTableEntry {
    MemTableEntry::Value {
        value: v.to_vec(),
        expire_at: 0,
    }
}

fn create_memtable_with_entries(entries: &[(&[u8], &[u8])]) -> MemTable {
    let memtable = MemTable::new();
    for (key, value) in entries {
        memtable.put(key.to_vec(), value.to_vec(), 0);
    }
    memtable
}

// =============================================================================
// Builder / Reader Tests
// =============================================================================

#[test]
fn test_build_and_read_back() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("table.sst");

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"apple", b"red", 0).unwrap();
    builder.add_tombstone(b"banana").unwrap();
    builder.add(b"cherry", b"dark", 12_345).unwrap();
    let table = builder.finish().unwrap();

    assert_eq!(table.entry_count(), 3);
    assert_eq!(table.min_key, b"apple".to_vec());
    assert_eq!(table.max_key, b"cherry".to_vec());
    assert!(table.file_size > 0);

    let mut reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 3);
    assert_eq!(reader.get(b"apple").unwrap(), value(b"red"));
    assert_eq!(reader.get(b"banana").unwrap(), MemTableEntry::Tombstone);
    assert_eq!(
        reader.get(b"cherry").unwrap(),
        MemTableEntry::Value {
            value: b"dark".to_vec(),
            expire_at: 12_345
        }
    );
    assert!(matches!(reader.get(b"durian"), Err(BlinkError::KeyNotFound)));
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, dir) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&dir.join("table.sst")).unwrap();

    builder.add(b"b", b"1", 0).unwrap();
    assert!(builder.add(b"a", b"2", 0).is_err());
    assert!(builder.add(b"b", b"3", 0).is_err());
}

#[test]
fn test_reader_iterates_in_order() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("table.sst");

    let mut builder = SSTableBuilder::new(&path).unwrap();
    for i in 0..50u32 {
        builder.add(format!("key{:03}", i).as_bytes(), &i.to_le_bytes(), 0).unwrap();
    }
    builder.finish().unwrap();

    let mut reader = SSTableReader::open(&path).unwrap();
    let entries: Vec<_> = reader.iter().unwrap().map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0].0, b"key000".to_vec());
    assert_eq!(entries[49].0, b"key049".to_vec());
    assert_eq!(entries[7].1, value(&7u32.to_le_bytes()));
}

#[test]
fn test_reader_range_and_prefix_checks() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("table.sst");

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"list:a", b"1", 0).unwrap();
    builder.add(b"list:b", b"2", 0).unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    assert!(reader.might_contain(b"list:a"));
    assert!(reader.might_contain(b"list:ab"));
    assert!(!reader.might_contain(b"zzz"));
    assert!(reader.has_prefix(b"list:"));
    assert!(!reader.has_prefix(b"set:"));
}

#[test]
fn test_reader_rejects_garbage_file() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("garbage.sst");
    std::fs::write(&path, vec![0xAB; 64]).unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

// =============================================================================
// StorageManager Tests
// =============================================================================

#[test]
fn test_manager_open_creates_directory() {
    let (_temp, dir) = setup_temp_dir();
    let storage_dir = dir.join("nested").join("sstables");

    let manager = StorageManager::open(&storage_dir).unwrap();
    assert!(storage_dir.exists());
    assert_eq!(manager.sstable_count(), 0);
    assert_eq!(manager.next_sstable_id(), 1);
}

#[test]
fn test_manager_flush_empty_memtable_fails() {
    let (_temp, dir) = setup_temp_dir();
    let manager = StorageManager::open(&dir).unwrap();

    assert!(manager.flush(&MemTable::new(), 0).is_err());
}

#[test]
fn test_manager_newest_table_wins() {
    let (_temp, dir) = setup_temp_dir();
    let manager = StorageManager::open(&dir).unwrap();

    manager
        .flush(&create_memtable_with_entries(&[(b"k", b"old"), (b"other", b"x")]), 0)
        .unwrap();
    manager
        .flush(&create_memtable_with_entries(&[(b"k", b"new")]), 0)
        .unwrap();

    assert_eq!(manager.sstable_count(), 2);
    assert_eq!(manager.get(b"k").unwrap(), Some(value(b"new")));
    assert_eq!(manager.get(b"other").unwrap(), Some(value(b"x")));
    assert_eq!(manager.get(b"missing").unwrap(), None);
}

#[test]
fn test_manager_tombstone_shadows_older_value() {
    let (_temp, dir) = setup_temp_dir();
    let manager = StorageManager::open(&dir).unwrap();

    manager
        .flush(&create_memtable_with_entries(&[(b"k", b"v")]), 0)
        .unwrap();
    let deletes = MemTable::new();
    deletes.delete(b"k".to_vec());
    manager.flush(&deletes, 0).unwrap();

    assert_eq!(manager.get(b"k").unwrap(), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_manager_flush_turns_expired_values_into_tombstones() {
    let (_temp, dir) = setup_temp_dir();
    let manager = StorageManager::open(&dir).unwrap();

    let memtable = MemTable::new();
    memtable.put(b"gone".to_vec(), b"v".to_vec(), 100);
    memtable.put(b"kept".to_vec(), b"v".to_vec(), 10_000);
    manager.flush(&memtable, 500).unwrap();

    assert_eq!(manager.get(b"gone").unwrap(), Some(MemTableEntry::Tombstone));
    assert_eq!(
        manager.get(b"kept").unwrap(),
        Some(MemTableEntry::Value {
            value: b"v".to_vec(),
            expire_at: 10_000
        })
    );
}

#[test]
fn test_manager_rediscovers_tables_on_reopen() {
    let (_temp, dir) = setup_temp_dir();
    {
        let manager = StorageManager::open(&dir).unwrap();
        manager
            .flush(&create_memtable_with_entries(&[(b"a", b"1")]), 0)
            .unwrap();
        manager
            .flush(&create_memtable_with_entries(&[(b"a", b"2")]), 0)
            .unwrap();
    }

    let manager = StorageManager::open(&dir).unwrap();
    assert_eq!(manager.sstable_count(), 2);
    assert_eq!(manager.next_sstable_id(), 3);
    assert_eq!(manager.get(b"a").unwrap(), Some(value(b"2")));
}

#[test]
fn test_manager_scan_prefix_merges_tables() {
    let (_temp, dir) = setup_temp_dir();
    let manager = StorageManager::open(&dir).unwrap();

    manager
        .flush(
            &create_memtable_with_entries(&[(b"p:1", b"a"), (b"p:2", b"b"), (b"q:1", b"z")]),
            0,
        )
        .unwrap();
    let newer = create_memtable_with_entries(&[(b"p:3", b"c")]);
    newer.delete(b"p:1".to_vec());
    manager.flush(&newer, 0).unwrap();

    let merged = manager.scan_prefix(b"p:").unwrap();
    let keys: Vec<&[u8]> = merged.keys().map(|k| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"p:1"[..], b"p:2", b"p:3"]);
    assert_eq!(merged[&b"p:1".to_vec()], MemTableEntry::Tombstone);
    assert_eq!(merged[&b"p:2".to_vec()], value(b"b"));
}
