//! Keyspace
//!
//! One ordered key-value store with optional per-key time-to-live, built
//! from a WAL, a MemTable and a set of SSTables.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and SSTables
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full
//! - Replay the WAL on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::wal::{now_millis, Operation, WalRecovery, WalWriter, WriteBatch};

use super::StorageManager;

/// A single keyspace
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/batch/flush): Serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable → storage (on flush)
///
/// - **Reads** (get/scan): No write_lock needed
///   - MemTable uses internal RwLock (many concurrent readers)
///   - StorageManager takes its write lock for SSTable reads
///     (SSTableReader::get needs &mut self for file seeking)
pub struct Keyspace {
    /// Name used in log lines ("scalar", "list", "set")
    name: &'static str,

    /// Directory holding this keyspace's WAL and SSTables
    dir: PathBuf,

    /// Flush threshold in bytes
    memtable_size_limit: usize,

    /// Write-ahead log of write batches (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

impl Keyspace {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create a keyspace under `dir`
    ///
    /// On startup:
    /// 1. Load existing SSTables
    /// 2. Replay the WAL into the MemTable
    /// 3. Flush recovered entries and truncate the WAL
    pub fn open(name: &'static str, dir: &Path, config: &Config) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let storage = StorageManager::open(&dir.join(Self::SSTABLE_DIR))?;
        let memtable = MemTable::new();
        let wal_path = dir.join(Self::WAL_FILENAME);

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover::<WriteBatch>(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    keyspace = name,
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                for op in entry.operation {
                    Self::apply_to_memtable(&memtable, op);
                }
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        // Recovered data goes to an SSTable before the WAL is dropped
        if !memtable.is_empty() {
            tracing::info!(
                keyspace = name,
                "Flushing {} recovered entries to SSTable",
                memtable.entry_count()
            );
            storage.flush(&memtable, now_millis())?;
            memtable.clear();
        }
        wal.truncate()?;

        Ok(Self {
            name,
            dir: dir.to_path_buf(),
            memtable_size_limit: config.memtable_size_limit,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    fn apply_to_memtable(memtable: &MemTable, op: Operation) -> usize {
        match op {
            Operation::Put {
                key,
                value,
                expire_at,
            } => memtable.put(key, value, expire_at),
            Operation::Delete { key } => memtable.delete(key),
        }
    }

    /// Get a live value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.memtable.get(key) {
            Some(entry) => Some(entry),
            None => self.storage.get(key)?,
        };

        Ok(match entry {
            Some(MemTableEntry::Value { value, expire_at }) => {
                if expire_at != 0 && expire_at <= now_millis() {
                    None
                } else {
                    Some(value)
                }
            }
            Some(MemTableEntry::Tombstone) | None => None,
        })
    }

    /// True if the key holds a live value
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Put a key-value pair without expiry
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with_ttl(key, value, None)
    }

    /// Put a key-value pair that disappears after `ttl`
    pub fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expire_at = match ttl {
            Some(ttl) => now_millis().saturating_add(ttl.as_millis() as u64).max(1),
            None => 0,
        };
        self.write(vec![Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            expire_at,
        }])
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(vec![Operation::Delete { key: key.to_vec() }])
    }

    /// Apply a batch of operations as one WAL entry
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write the batch to the WAL (durability)
    /// 3. Apply to MemTable
    /// 4. Flush if the MemTable is full
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _write_guard = self.write_lock.lock();

        // The batch must be logged before it becomes visible
        self.wal.lock().append(batch.clone())?;

        let mut new_size = 0;
        for op in batch {
            new_size = Self::apply_to_memtable(&self.memtable, op);
        }

        if new_size >= self.memtable_size_limit {
            self.flush_internal()?;
        }

        Ok(())
    }

    /// Live entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged = self.storage.scan_prefix(prefix)?;
        for (key, entry) in self.memtable.scan_prefix(prefix) {
            merged.insert(key, entry);
        }

        let now = now_millis();
        Ok(merged
            .into_iter()
            .filter_map(|(key, entry)| match entry {
                MemTableEntry::Value { value, expire_at } => {
                    if expire_at != 0 && expire_at <= now {
                        None
                    } else {
                        Some((key, value))
                    }
                }
                MemTableEntry::Tombstone => None,
            })
            .collect())
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable, now_millis())?;
        self.memtable.clear();

        // Entries are now durable in the SSTable
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Flush pending data and sync the WAL
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        tracing::debug!(keyspace = self.name, "Keyspace closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Keyspace name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Directory holding this keyspace
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Fault injection: fail every write at the WAL until cleared
    #[doc(hidden)]
    pub fn fail_writes(&self, fail: bool) {
        self.wal.lock().set_fail_appends(fail);
    }
}
