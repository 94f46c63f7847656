//! Staged metadata transaction
//!
//! Operations mutate private clones of the records they touch. `commit`
//! publishes the clones to the cache and hands back the action batch for the
//! log; dropping the transaction instead leaves the cache untouched.

use std::collections::HashMap;

use super::action::{ActionBatch, MetaAction, RecordStore};
use super::cache::MetaCache;
use super::codec::{encode_list_block_key, encode_list_meta_key, encode_set_meta_key};
use super::list::{ListMeta, ListMetaBlock};
use super::set::SetMeta;
use super::MetaRecord;
use crate::error::{BlinkError, Result};

pub struct MetaTxn<'a> {
    cache: &'a MetaCache,
    /// `None` marks a record removed by this transaction
    staged: HashMap<Vec<u8>, Option<MetaRecord>>,
    actions: ActionBatch,
}

impl<'a> MetaTxn<'a> {
    pub fn new(cache: &'a MetaCache) -> Self {
        Self {
            cache,
            staged: HashMap::new(),
            actions: Vec::new(),
        }
    }

    /// Apply an action to the staged records and keep it for the log
    pub fn record(&mut self, action: MetaAction) -> Result<()> {
        action.apply(self)?;
        self.actions.push(action);
        Ok(())
    }

    pub fn list(&mut self, key: &[u8]) -> Option<&ListMeta> {
        self.record_mut(&encode_list_meta_key(key))
            .map(|r| &*r)
            .and_then(MetaRecord::as_list)
    }

    pub fn block(&mut self, key: &[u8], address: u64) -> Option<&ListMetaBlock> {
        self.record_mut(&encode_list_block_key(key, address))
            .map(|r| &*r)
            .and_then(MetaRecord::as_block)
    }

    pub fn set_meta(&mut self, key: &[u8]) -> Option<&SetMeta> {
        self.record_mut(&encode_set_meta_key(key))
            .map(|r| &*r)
            .and_then(MetaRecord::as_set)
    }

    /// Area Allocator: hand out the list's next address
    pub fn allocate(&mut self, key: &[u8]) -> Result<u64> {
        let address = match self.list(key) {
            Some(meta) => meta.next_area(),
            None => {
                return Err(BlinkError::Corruption(
                    "allocating from an unknown list".to_string(),
                ))
            }
        };
        self.record(MetaAction::Alloc {
            key: key.to_vec(),
            next_area: address + 1,
        })?;
        Ok(address)
    }

    pub fn actions(&self) -> &[MetaAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Publish staged records; returns the batch to enqueue
    pub fn commit(self) -> ActionBatch {
        if self.actions.is_empty() {
            return self.actions;
        }
        for (key, record) in self.staged {
            match record {
                Some(record) => {
                    self.cache.insert(key, record);
                }
                None => {
                    self.cache.remove(&key);
                }
            }
        }
        self.actions
    }
}

impl RecordStore for MetaTxn<'_> {
    fn record_mut(&mut self, cache_key: &[u8]) -> Option<&mut MetaRecord> {
        let cache = self.cache;
        self.staged
            .entry(cache_key.to_vec())
            .or_insert_with(|| cache.get(cache_key))
            .as_mut()
    }

    fn put_record(&mut self, cache_key: Vec<u8>, record: MetaRecord) {
        self.staged.insert(cache_key, Some(record));
    }

    fn remove_record(&mut self, cache_key: &[u8]) -> Option<MetaRecord> {
        let cache = self.cache;
        self.staged
            .entry(cache_key.to_vec())
            .or_insert_with(|| cache.get(cache_key))
            .take()
    }
}
