//! Metadata Cache
//!
//! Sharded in-memory map from cache key to `MetaRecord`. Readers copy what
//! they need out of a shard; no caller ever holds two shard locks.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::codec::encode_record;
use super::MetaRecord;

const SHARD_COUNT: usize = 16;

/// In-memory home of every ListMeta, ListMetaBlock and SetMeta
pub struct MetaCache {
    shards: Vec<RwLock<HashMap<Vec<u8>, MetaRecord>>>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &[u8]) -> &RwLock<HashMap<Vec<u8>, MetaRecord>> {
        &self.shards[crc32fast::hash(key) as usize % SHARD_COUNT]
    }

    /// Clone of the record under `key`
    pub fn get(&self, key: &[u8]) -> Option<MetaRecord> {
        self.shard(key).read().get(key).cloned()
    }

    /// Run `f` against the record under `key` while holding the shard read lock
    pub fn read<R>(&self, key: &[u8], f: impl FnOnce(Option<&MetaRecord>) -> R) -> R {
        let shard = self.shard(key).read();
        f(shard.get(key))
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.shard(key).read().contains_key(key)
    }

    pub fn insert(&self, key: Vec<u8>, record: MetaRecord) -> Option<MetaRecord> {
        self.shard(&key).write().insert(key, record)
    }

    pub fn remove(&self, key: &[u8]) -> Option<MetaRecord> {
        self.shard(key).write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Bulk-load records rebuilt by recovery
    pub fn install(&self, records: HashMap<Vec<u8>, MetaRecord>) {
        for (key, record) in records {
            self.insert(key, record);
        }
    }

    /// Every record in encoded form, sorted by cache key
    pub fn encoded_records(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            out.extend(
                guard
                    .iter()
                    .map(|(key, record)| (key.clone(), encode_record(record))),
            );
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl Default for MetaCache {
    fn default() -> Self {
        Self::new()
    }
}
