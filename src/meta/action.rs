//! Metadata actions
//!
//! Every structural change to a list or set is one `MetaAction`. The same
//! `apply` runs against the staged transaction of a live operation and
//! against the record map rebuilt during recovery, so replaying the action
//! log reproduces the cache exactly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::codec::{decode_record, encode_list_block_key, encode_list_meta_key, encode_set_meta_key};
use super::list::{BlockPtr, ListMeta, ListMetaBlock};
use super::set::SetMeta;
use super::{MetaRecord, LIST_BLOCK_SLOTS};
use crate::error::{BlinkError, Result};

/// All actions produced by one operation, logged as one unit
pub type ActionBatch = Vec<MetaAction>;

/// One structural mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaAction {
    /// Create an empty list
    Init {
        key: Vec<u8>,
        limit: u64,
        block_limit: u64,
    },
    /// Install an encoded record verbatim
    Reinit { cache_key: Vec<u8>, record: Vec<u8> },
    /// Advance the area counter
    Alloc { key: Vec<u8>, next_area: u64 },
    /// Add an empty block pointer and its block record
    InsertBlock {
        key: Vec<u8>,
        position: u64,
        address: u64,
    },
    /// Move the slots of block `position` from `offset` on into a new block
    /// at `position + 1`
    SplitBlock {
        key: Vec<u8>,
        position: u64,
        offset: u64,
        address: u64,
    },
    /// Place a value address into a block
    InsertSlot {
        key: Vec<u8>,
        position: u64,
        offset: u64,
        address: u64,
    },
    /// Take a value address out of a block; an emptied block is dropped
    RemoveSlot {
        key: Vec<u8>,
        position: u64,
        offset: u64,
    },
    /// Forget a list and all its blocks
    DropList { key: Vec<u8> },
    InitSet { key: Vec<u8> },
    SetCard { key: Vec<u8>, card: u64 },
    DropSet { key: Vec<u8> },
}

/// Mutable view over metadata records that actions are applied to
pub trait RecordStore {
    fn record_mut(&mut self, cache_key: &[u8]) -> Option<&mut MetaRecord>;
    fn put_record(&mut self, cache_key: Vec<u8>, record: MetaRecord);
    fn remove_record(&mut self, cache_key: &[u8]) -> Option<MetaRecord>;
}

impl RecordStore for HashMap<Vec<u8>, MetaRecord> {
    fn record_mut(&mut self, cache_key: &[u8]) -> Option<&mut MetaRecord> {
        self.get_mut(cache_key)
    }

    fn put_record(&mut self, cache_key: Vec<u8>, record: MetaRecord) {
        self.insert(cache_key, record);
    }

    fn remove_record(&mut self, cache_key: &[u8]) -> Option<MetaRecord> {
        self.remove(cache_key)
    }
}

fn corrupt<T>(msg: impl Into<String>) -> Result<T> {
    Err(BlinkError::Corruption(msg.into()))
}

fn list_mut<'s, S: RecordStore + ?Sized>(store: &'s mut S, key: &[u8]) -> Result<&'s mut ListMeta> {
    match store
        .record_mut(&encode_list_meta_key(key))
        .and_then(MetaRecord::as_list_mut)
    {
        Some(meta) => Ok(meta),
        None => corrupt(format!("no list meta for {}", String::from_utf8_lossy(key))),
    }
}

fn block_mut<'s, S: RecordStore + ?Sized>(
    store: &'s mut S,
    key: &[u8],
    address: u64,
) -> Result<&'s mut ListMetaBlock> {
    match store
        .record_mut(&encode_list_block_key(key, address))
        .and_then(MetaRecord::as_block_mut)
    {
        Some(block) => Ok(block),
        None => corrupt(format!("no block {address} for {}", String::from_utf8_lossy(key))),
    }
}

fn set_mut<'s, S: RecordStore + ?Sized>(store: &'s mut S, key: &[u8]) -> Result<&'s mut SetMeta> {
    match store
        .record_mut(&encode_set_meta_key(key))
        .and_then(MetaRecord::as_set_mut)
    {
        Some(meta) => Ok(meta),
        None => corrupt(format!("no set meta for {}", String::from_utf8_lossy(key))),
    }
}

/// Address of the block at `position`, checked against the pointer array
fn block_at(meta: &ListMeta, position: u64) -> Result<BlockPtr> {
    match meta.blocks.get(position as usize) {
        Some(ptr) => Ok(*ptr),
        None => corrupt(format!(
            "block position {position} beyond {} blocks",
            meta.blocks.len()
        )),
    }
}

/// Room for one more block pointer and a fresh, in-range address
fn check_new_block(meta: &ListMeta, address: u64) -> Result<()> {
    if meta.block_count() >= meta.block_limit() {
        return Err(BlinkError::TooManyBlocks {
            limit: meta.block_limit(),
        });
    }
    if address == 0 || address >= meta.next_area {
        return corrupt(format!("block address {address} was never allocated"));
    }
    Ok(())
}

impl MetaAction {
    /// User key the action belongs to (None for `Reinit`)
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            MetaAction::Reinit { .. } => None,
            MetaAction::Init { key, .. }
            | MetaAction::Alloc { key, .. }
            | MetaAction::InsertBlock { key, .. }
            | MetaAction::SplitBlock { key, .. }
            | MetaAction::InsertSlot { key, .. }
            | MetaAction::RemoveSlot { key, .. }
            | MetaAction::DropList { key }
            | MetaAction::InitSet { key }
            | MetaAction::SetCard { key, .. }
            | MetaAction::DropSet { key } => Some(key),
        }
    }

    /// Apply to `store`; nothing is modified when an error is returned
    pub fn apply<S: RecordStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        match self {
            MetaAction::Init {
                key,
                limit,
                block_limit,
            } => {
                let cache_key = encode_list_meta_key(key);
                if store.record_mut(&cache_key).is_some() {
                    return corrupt("list initialised twice");
                }
                store.put_record(
                    cache_key,
                    MetaRecord::List(ListMeta::new(key.clone(), *limit, *block_limit)),
                );
            }

            MetaAction::Reinit { cache_key, record } => {
                let record = decode_record(cache_key, record)?;
                store.put_record(cache_key.clone(), record);
            }

            MetaAction::Alloc { key, next_area } => {
                let meta = list_mut(store, key)?;
                if *next_area <= meta.next_area {
                    return corrupt(format!(
                        "area counter moving back from {} to {next_area}",
                        meta.next_area
                    ));
                }
                meta.next_area = *next_area;
            }

            MetaAction::InsertBlock {
                key,
                position,
                address,
            } => {
                let block_key = encode_list_block_key(key, *address);
                if store.record_mut(&block_key).is_some() {
                    return corrupt(format!("block {address} already exists"));
                }
                let meta = list_mut(store, key)?;
                check_new_block(meta, *address)?;
                if *position as usize > meta.blocks.len() {
                    return corrupt(format!("block position {position} out of range"));
                }
                meta.blocks.insert(
                    *position as usize,
                    BlockPtr {
                        address: *address,
                        count: 0,
                    },
                );
                store.put_record(block_key, MetaRecord::Block(ListMetaBlock::new()));
            }

            MetaAction::SplitBlock {
                key,
                position,
                offset,
                address,
            } => {
                let new_key = encode_list_block_key(key, *address);
                if store.record_mut(&new_key).is_some() {
                    return corrupt(format!("block {address} already exists"));
                }
                let meta = list_mut(store, key)?;
                check_new_block(meta, *address)?;
                let ptr = block_at(meta, *position)?;
                if *offset == 0 || *offset >= ptr.count {
                    return corrupt(format!("split offset {offset} of {} slots", ptr.count));
                }

                let block = block_mut(store, key, ptr.address)?;
                if block.len() as u64 != ptr.count {
                    return corrupt(format!("block {} count mismatch", ptr.address));
                }
                let tail = block.split_off(*offset as usize)?;

                let meta = list_mut(store, key)?;
                let moved = tail.len() as u64;
                meta.blocks[*position as usize].count = *offset;
                meta.blocks.insert(
                    *position as usize + 1,
                    BlockPtr {
                        address: *address,
                        count: moved,
                    },
                );
                store.put_record(new_key, MetaRecord::Block(tail));
            }

            MetaAction::InsertSlot {
                key,
                position,
                offset,
                address,
            } => {
                let meta = list_mut(store, key)?;
                if *address == 0 || *address >= meta.next_area {
                    return corrupt(format!("value address {address} was never allocated"));
                }
                let ptr = block_at(meta, *position)?;
                if ptr.count >= LIST_BLOCK_SLOTS as u64 || *offset > ptr.count {
                    return corrupt(format!(
                        "slot insert at {offset} into block of {}",
                        ptr.count
                    ));
                }

                block_mut(store, key, ptr.address)?.insert(*offset as usize, *address)?;

                let meta = list_mut(store, key)?;
                meta.blocks[*position as usize].count += 1;
                meta.size += 1;
            }

            MetaAction::RemoveSlot {
                key,
                position,
                offset,
            } => {
                let meta = list_mut(store, key)?;
                let ptr = block_at(meta, *position)?;
                if *offset >= ptr.count {
                    return corrupt(format!("slot remove at {offset} from block of {}", ptr.count));
                }

                block_mut(store, key, ptr.address)?.remove(*offset as usize)?;

                let meta = list_mut(store, key)?;
                meta.size -= 1;
                let slot = &mut meta.blocks[*position as usize];
                slot.count -= 1;
                if slot.count == 0 {
                    meta.blocks.remove(*position as usize);
                    store.remove_record(&encode_list_block_key(key, ptr.address));
                }
            }

            MetaAction::DropList { key } => {
                let meta = match store.remove_record(&encode_list_meta_key(key)) {
                    Some(MetaRecord::List(meta)) => meta,
                    Some(other) => {
                        return corrupt(format!("list key holds a {:?} record", other.kind()))
                    }
                    None => return corrupt("dropping an unknown list"),
                };
                for ptr in meta.blocks() {
                    store.remove_record(&encode_list_block_key(key, ptr.address));
                }
            }

            MetaAction::InitSet { key } => {
                let cache_key = encode_set_meta_key(key);
                if store.record_mut(&cache_key).is_some() {
                    return corrupt("set initialised twice");
                }
                store.put_record(cache_key, MetaRecord::Set(SetMeta::new(key.clone())));
            }

            MetaAction::SetCard { key, card } => {
                set_mut(store, key)?.card = *card;
            }

            MetaAction::DropSet { key } => {
                if store.remove_record(&encode_set_meta_key(key)).is_none() {
                    return corrupt("dropping an unknown set");
                }
            }
        }
        Ok(())
    }
}
