//! Record Lock Table
//!
//! One mutex per key, created on first use and dropped again once no
//! holder or waiter references it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

const SHARD_COUNT: usize = 64;

type Slot = Arc<Mutex<()>>;

/// Per-key serialization for every operation touching a list or set
pub struct RecordLockTable {
    shards: Vec<Mutex<HashMap<Vec<u8>, Slot>>>,
}

/// Exclusive hold on one key; releasing it may retire the key's mutex
pub struct RecordGuard<'a> {
    table: &'a RecordLockTable,
    shard: usize,
    key: Vec<u8>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl RecordLockTable {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_index(key: &[u8]) -> usize {
        crc32fast::hash(key) as usize % SHARD_COUNT
    }

    /// Block until `key` is free, then hold it until the guard drops
    pub fn lock(&self, key: &[u8]) -> RecordGuard<'_> {
        let shard = Self::shard_index(key);
        let slot = {
            let mut map = self.shards[shard].lock();
            map.entry(key.to_vec())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        // The local clone keeps the entry alive while we wait.
        let guard = Mutex::lock_arc(&slot);
        drop(slot);

        RecordGuard {
            table: self,
            shard,
            key: key.to_vec(),
            guard: Some(guard),
        }
    }

    /// Number of keys that currently have a mutex
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordGuard<'_> {
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.table.shards[self.shard].lock();
        drop(self.guard.take());
        if map
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            map.remove(&self.key);
        }
    }
}
