//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock); returns the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, expire_at: u64) -> usize {
        self.insert(key, MemTableEntry::Value { value, expire_at })
    }

    /// Delete a key (write lock, inserts tombstone); returns the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let key_len = key.len();
        let entry_size = entry.footprint();

        let mut data = self.data.write();
        let (added, removed) = match data.insert(key, entry) {
            // Key bytes are already accounted for
            Some(old) => (entry_size, old.footprint()),
            None => (key_len + entry_size, 0),
        };

        // Updated under the write lock, so load/store cannot race
        let next = (self.size.load(Ordering::Relaxed) + added).saturating_sub(removed);
        self.size.store(next, Ordering::Relaxed);
        next
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the memtable holds no entries
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size > limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Get an iterator over all entries (for flush)
    /// Returns entries in sorted key order
    pub fn iter(&self) -> MemTableIterator {
        let entries: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.data
            .read()
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
