//! Storage Manager
//!
//! Manages the SSTables of one keyspace and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge SSTables for ordered prefix scans

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{BlinkError, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::{SSTable, SSTableBuilder, SSTableReader};

/// Manages the storage layer of a keyspace
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<SSTableReader>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    /// 3. Open readers for each (loads indexes into RAM)
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path) -> Result<Self> {
        // Create directory if it doesn't exist
        fs::create_dir_all(path)?;

        // Discover existing SSTables
        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                }
            }
        }

        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        // Open readers for each SSTable
        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            sstables.push(SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?);
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Get the newest entry for a key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: key found (value or tombstone)
    /// - `Ok(None)`: key not in any SSTable
    ///
    /// Note: Uses write lock because SSTableReader::get() needs &mut self
    /// for file seeking.
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        // Write lock: SSTableReader::get() moves the file position
        let mut sstables = self.sstables.write();

        // Search SSTables newest → oldest
        for reader in sstables.iter_mut() {
            // Skip SSTable if key is outside its range (O(1) check)
            if !reader.might_contain(key) {
                continue;
            }

            // Key might be here, do the actual lookup
            match reader.get(key) {
                Ok(entry) => return Ok(Some(entry)),
                Err(BlinkError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        // Not found in any SSTable
        Ok(None)
    }

    /// Merge every SSTable entry whose key starts with `prefix`
    ///
    /// Newer tables shadow older ones; tombstones are kept so the caller can
    /// layer the memtable on top.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<BTreeMap<Vec<u8>, MemTableEntry>> {
        let mut merged = BTreeMap::new();
        let mut sstables = self.sstables.write();

        // Oldest → newest so later inserts win
        for reader in sstables.iter_mut().rev() {
            // Skip tables whose key range cannot hold the prefix
            if !reader.has_prefix(prefix) {
                continue;
            }
            for item in reader.iter()? {
                let (key, entry) = item?;
                if key.starts_with(prefix) {
                    merged.insert(key, entry);
                }
            }
        }

        Ok(merged)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Values already expired at `now` are written as tombstones so they
    /// keep shadowing older tables.
    pub fn flush(&self, memtable: &MemTable, now: u64) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(BlinkError::Storage("Cannot flush empty MemTable".to_string()));
        }

        // Generate new SSTable ID (atomic, lock-free)
        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // Entries arrive sorted from the BTreeMap
        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in memtable.iter() {
            if entry.is_expired(now) {
                builder.add_tombstone(&key)?;
            } else {
                builder.add_entry(&key, &entry)?;
            }
        }
        let metadata = builder.finish()?;

        // Open reader for the new SSTable
        let reader = SSTableReader::open(&path)?;

        // Insert at front (newest first)
        self.sstables.write().insert(0, reader);

        tracing::debug!(
            "Flushed {} entries to {}",
            metadata.entry_count,
            metadata.path.display()
        );

        Ok(metadata)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
