//! Tests for metadata durability
//!
//! These tests verify:
//! - Metadata rebuilt after a clean close and after an unclean drop
//! - Snapshot + action log recovery after compaction
//! - Log batches already covered by the snapshot are skipped
//! - A damaged batch in the middle of the log refuses startup
//! - A torn tail is cut off and startup proceeds
//! - A failed log append stops the engine instead of losing writes silently
//! - Online reload and background compaction

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use blinkkv::{BlinkError, Config, Engine, WalSyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build()
}

fn open_engine(dir: &Path) -> Engine {
    Engine::open(test_config(dir)).unwrap()
}

/// A mix of list and set traffic touching splits, pops and drops
fn populate(engine: &Engine) {
    for i in 0..600u32 {
        engine.rpush(b"tail", &[i.to_string().into_bytes()]).unwrap();
    }
    for i in 0..300u32 {
        engine.lpush(b"head", &[i.to_string().into_bytes()]).unwrap();
    }
    engine.linsert_at(b"tail", 100, b"mid").unwrap();
    engine.lpop(b"head").unwrap();
    engine.rpush(b"gone", &[b"x".to_vec()]).unwrap();
    engine.lpop(b"gone").unwrap();
    engine
        .sadd(b"set", &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        .unwrap();
    engine.srem(b"set", &[b"b".to_vec()]).unwrap();
}

fn assert_populated(engine: &Engine) {
    assert_eq!(engine.llen(b"tail").unwrap(), 601);
    assert_eq!(engine.lindex(b"tail", 100).unwrap(), b"mid".to_vec());
    assert_eq!(engine.lindex(b"tail", -1).unwrap(), b"599".to_vec());
    assert_eq!(engine.llen(b"head").unwrap(), 299);
    assert_eq!(engine.lindex(b"head", 0).unwrap(), b"298".to_vec());
    assert_eq!(engine.llen(b"gone").unwrap(), 0);
    assert_eq!(engine.smembers(b"set").unwrap(), vec![b"a".to_vec(), b"c".to_vec()]);
    engine.check_list(b"tail").unwrap();
    engine.check_list(b"head").unwrap();
}

fn frame_len(raw: &[u8], start: usize) -> usize {
    16 + u32::from_le_bytes(raw[start + 12..start + 16].try_into().unwrap()) as usize
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_metadata_identical_after_close() {
    let temp = TempDir::new().unwrap();
    let records = {
        let engine = open_engine(temp.path());
        populate(&engine);
        let records = engine.metadata_records();
        engine.close().unwrap();
        records
    };

    let engine = open_engine(temp.path());
    assert_eq!(engine.metadata_records(), records);
    assert_populated(&engine);
}

#[test]
fn test_metadata_identical_after_drop() {
    let temp = TempDir::new().unwrap();
    let records = {
        let engine = open_engine(temp.path());
        populate(&engine);
        engine.metadata_records()
    };

    let engine = open_engine(temp.path());
    assert_eq!(engine.metadata_records(), records);
    assert_populated(&engine);
}

#[test]
fn test_recovery_from_snapshot_and_log() {
    let temp = TempDir::new().unwrap();
    let records = {
        let engine = open_engine(temp.path());
        populate(&engine);
        assert!(engine.compact_meta().unwrap());
        assert_eq!(engine.meta_log_size(), 0);

        engine.rpush(b"tail", &[b"after".to_vec()]).unwrap();
        engine.sadd(b"set", &[b"d".to_vec()]).unwrap();
        let records = engine.metadata_records();
        engine.close().unwrap();
        records
    };
    assert!(temp.path().join("meta.snapshot").exists());

    let engine = open_engine(temp.path());
    assert_eq!(engine.metadata_records(), records);
    assert_eq!(engine.lindex(b"tail", -1).unwrap(), b"after".to_vec());
    assert_eq!(engine.scard(b"set").unwrap(), 3);

    let recovered = engine.reload_metadata().unwrap();
    assert!(recovered.snapshot_records > 0);
    assert_eq!(recovered.batches_replayed, 2);
    assert_eq!(recovered.batches_skipped, 0);
}

#[test]
fn test_batches_covered_by_snapshot_are_skipped() {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("meta.aof");
    let (records, batches) = {
        let engine = open_engine(temp.path());
        populate(&engine);
        engine.sync_meta().unwrap();
        let saved_log = fs::read(&log_path).unwrap();
        let batches = engine.meta_sequence();

        engine.compact_meta().unwrap();
        let records = engine.metadata_records();
        engine.close().unwrap();

        // Crash between snapshot write and log truncation
        fs::write(&log_path, saved_log).unwrap();
        (records, batches)
    };

    let engine = open_engine(temp.path());
    assert_eq!(engine.metadata_records(), records);

    let recovered = engine.reload_metadata().unwrap();
    assert_eq!(recovered.snapshot_sequence, batches);
    assert_eq!(recovered.batches_skipped, batches);
    assert_eq!(recovered.batches_replayed, 0);
    assert_eq!(engine.metadata_records(), records);
}

// =============================================================================
// Damaged Log Tests
// =============================================================================

#[test]
fn test_corrupted_batch_refuses_startup() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_engine(temp.path());
        for value in ["a", "b", "c"] {
            engine.rpush(b"l", &[value.as_bytes().to_vec()]).unwrap();
        }
        engine.close().unwrap();
    }

    let log_path = temp.path().join("meta.aof");
    let mut raw = fs::read(&log_path).unwrap();
    let second = frame_len(&raw, 0);
    raw[second + 16] ^= 0xFF;
    fs::write(&log_path, raw).unwrap();

    let result = Engine::open(test_config(temp.path()));
    assert!(matches!(result, Err(BlinkError::Corruption(_))));
}

#[test]
fn test_torn_tail_is_discarded() {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("meta.aof");
    let clean_len = {
        let engine = open_engine(temp.path());
        engine
            .rpush(b"l", &[b"a".to_vec(), b"b".to_vec()])
            .unwrap();
        engine.close().unwrap();
        fs::metadata(&log_path).unwrap().len()
    };

    let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
    file.write_all(&[0xAB; 7]).unwrap();
    drop(file);

    let engine = open_engine(temp.path());
    assert_eq!(fs::metadata(&log_path).unwrap().len(), clean_len);
    assert_eq!(
        engine.lrange(b"l", 0, -1).unwrap(),
        vec![b"a".to_vec(), b"b".to_vec()]
    );

    // The log keeps working after the cut
    engine.rpush(b"l", &[b"c".to_vec()]).unwrap();
    engine.close().unwrap();
    let engine = open_engine(temp.path());
    assert_eq!(engine.llen(b"l").unwrap(), 3);
}

#[test]
fn test_failed_log_append_is_latched() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_engine(temp.path());
        engine.rpush(b"l", &[b"a".to_vec()]).unwrap();
        engine.sync_meta().unwrap();

        engine.fail_meta_appends(true);
        // Already queued when the writer hits the failure
        engine.rpush(b"l", &[b"b".to_vec()]).unwrap();

        assert!(matches!(engine.sync_meta(), Err(BlinkError::Storage(_))));
        assert!(matches!(
            engine.rpush(b"l", &[b"c".to_vec()]),
            Err(BlinkError::Storage(_))
        ));
        assert!(matches!(engine.llen(b"l"), Err(BlinkError::Storage(_))));
        assert!(matches!(engine.compact_meta(), Err(BlinkError::Storage(_))));
        assert!(matches!(engine.reload_metadata(), Err(BlinkError::Storage(_))));

        let err = engine.close().unwrap_err();
        assert!(err.to_string().contains("action log append failed"));
    }

    // Only what reached the log comes back
    let engine = open_engine(temp.path());
    assert_eq!(engine.lrange(b"l", 0, -1).unwrap(), vec![b"a".to_vec()]);
    engine.check_list(b"l").unwrap();

    assert_eq!(engine.rpush(b"l", &[b"c".to_vec()]).unwrap(), 2);
    assert_eq!(
        engine.lrange(b"l", 0, -1).unwrap(),
        vec![b"a".to_vec(), b"c".to_vec()]
    );
}

// =============================================================================
// Reload / Compaction Tests
// =============================================================================

#[test]
fn test_reload_rebuilds_same_records() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());
    populate(&engine);
    let before = engine.metadata_records();

    let recovered = engine.reload_metadata().unwrap();
    assert_eq!(recovered.batches_replayed, engine.meta_sequence());
    assert_eq!(engine.metadata_records(), before);

    // Operations resume after the reload
    engine.rpush(b"tail", &[b"more".to_vec()]).unwrap();
    assert_eq!(engine.llen(b"tail").unwrap(), 602);
}

#[test]
fn test_background_compaction() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .meta_compact_threshold(1)
        .meta_compact_interval_ms(10)
        .build();
    let snapshot_path = temp.path().join("meta.snapshot");

    let records = {
        let engine = Engine::open(config.clone()).unwrap();
        populate(&engine);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !snapshot_path.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(snapshot_path.exists());

        let records = engine.metadata_records();
        engine.close().unwrap();
        records
    };

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.metadata_records(), records);
    assert_populated(&engine);
}
