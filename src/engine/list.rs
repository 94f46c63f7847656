//! List operations
//!
//! A list is a ListMeta (block-pointer array) plus one ListMetaBlock per
//! pointer plus one value record per element. Logical index `i` resolves to
//! a block position and in-block offset through the ListMeta, then to a
//! physical value address through the block.

use super::{missing_block, Engine};
use crate::error::{BlinkError, Result};
use crate::meta::{encode_list_value_key, InsertPlan, ListMeta, MetaAction, MetaTxn};
use crate::wal::{Operation, WriteBatch};

/// Resolved location of one element
#[derive(Debug, Clone, Copy)]
struct Slot {
    position: usize,
    offset: usize,
    address: u64,
}

impl Engine {
    /// Push values onto the head; returns the new length
    ///
    /// Values are pushed in argument order, so the last one ends up first.
    pub fn lpush(&self, key: &[u8], values: &[Vec<u8>]) -> Result<u64> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            let mut size = 0;
            for value in values {
                size = self.insert_value(txn, batch, key, Some(0), value)?;
            }
            Ok(size)
        })
    }

    /// `lpush` that does nothing when the list does not exist
    pub fn lpushx(&self, key: &[u8], values: &[Vec<u8>]) -> Result<u64> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            if txn.list(key).is_none() {
                return Ok(0);
            }
            let mut size = 0;
            for value in values {
                size = self.insert_value(txn, batch, key, Some(0), value)?;
            }
            Ok(size)
        })
    }

    /// Append values at the tail; returns the new length
    pub fn rpush(&self, key: &[u8], values: &[Vec<u8>]) -> Result<u64> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            let mut size = 0;
            for value in values {
                size = self.insert_value(txn, batch, key, None, value)?;
            }
            Ok(size)
        })
    }

    /// Insert `value` so that it ends up at logical `index`
    ///
    /// `index` may equal the current length (append).
    pub fn linsert_at(&self, key: &[u8], index: u64, value: &[u8]) -> Result<u64> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            self.insert_value(txn, batch, key, Some(index), value)
        })
    }

    /// Remove and return the head element
    pub fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.pop(key, false)
    }

    /// Remove and return the tail element
    pub fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.pop(key, true)
    }

    /// Element at a signed index
    ///
    /// Errors: `NotFound` for an absent list, `IndexOutOfRange` past either
    /// end, `Corruption` when the value record is missing.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Vec<u8>> {
        self.inspect(key, |txn| {
            let index = {
                let meta = txn.list(key).ok_or(BlinkError::NotFound)?;
                meta.resolve_index(index).ok_or(BlinkError::IndexOutOfRange)?
            };
            let slot = slot_at(txn, key, index)?;
            self.read_value(key, slot.address)
        })
    }

    /// Length of the list (0 when absent)
    pub fn llen(&self, key: &[u8]) -> Result<u64> {
        self.inspect(key, |txn| Ok(txn.list(key).map(ListMeta::size).unwrap_or(0)))
    }

    /// Elements between `start` and `stop` inclusive, both signed
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.inspect(key, |txn| {
            let Some((first, last)) = txn
                .list(key)
                .and_then(|meta| clamp_range(meta.size(), start, stop))
            else {
                return Ok(Vec::new());
            };

            let addresses = addresses_between(txn, key, first, last)?;
            addresses
                .into_iter()
                .map(|address| self.read_value(key, address))
                .collect()
        })
    }

    /// Overwrite the element at a signed index
    pub fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            let index = {
                let meta = txn.list(key).ok_or(BlinkError::NotFound)?;
                meta.resolve_index(index).ok_or(BlinkError::IndexOutOfRange)?
            };
            let slot = slot_at(txn, key, index)?;
            batch.push(Operation::Put {
                key: encode_list_value_key(key, slot.address),
                value: value.to_vec(),
                expire_at: 0,
            });
            Ok(())
        })
    }

    /// Remove elements equal to `value`
    ///
    /// `count > 0` removes the first `count` matches from the head,
    /// `count < 0` the first `|count|` from the tail, `0` removes all.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<u64> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            let size = match txn.list(key) {
                Some(meta) => meta.size(),
                None => return Ok(0),
            };
            if size == 0 {
                return Ok(0);
            }

            let addresses = addresses_between(txn, key, 0, size - 1)?;
            let mut matches = Vec::new();
            for (index, &address) in addresses.iter().enumerate() {
                if self.read_value(key, address)? == value {
                    matches.push(index as u64);
                }
            }

            let limit = count.unsigned_abs() as usize;
            if count < 0 {
                matches.reverse();
            }
            if count != 0 {
                matches.truncate(limit);
            }

            // Highest index first keeps the remaining indices valid
            matches.sort_unstable_by(|a, b| b.cmp(a));
            for &index in &matches {
                self.remove_at(txn, batch, key, index)?;
            }
            self.drop_if_empty(txn, key)?;
            Ok(matches.len() as u64)
        })
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn pop(&self, key: &[u8], from_tail: bool) -> Result<Option<Vec<u8>>> {
        self.mutate(key, self.storage.list(), |txn, batch| {
            let size = match txn.list(key) {
                Some(meta) if meta.size() > 0 => meta.size(),
                _ => return Ok(None),
            };
            let index = if from_tail { size - 1 } else { 0 };
            let value = self.remove_at(txn, batch, key, index)?;
            self.drop_if_empty(txn, key)?;
            Ok(Some(value))
        })
    }

    /// Stage an insert at `index` (`None` appends); returns the new length
    fn insert_value(
        &self,
        txn: &mut MetaTxn<'_>,
        batch: &mut WriteBatch,
        key: &[u8],
        index: Option<u64>,
        value: &[u8],
    ) -> Result<u64> {
        if txn.list(key).is_none() {
            txn.record(MetaAction::Init {
                key: key.to_vec(),
                limit: self.config.list_element_limit,
                block_limit: self.config.list_block_limit,
            })?;
        }

        let plan = {
            let meta = txn.list(key).ok_or_else(|| unknown_list(key))?;
            meta.plan_insert(index.unwrap_or(meta.size()))?
        };

        let (position, offset) = match plan {
            InsertPlan::Existing { position, offset } => (position, offset),
            InsertPlan::NewBlock { position } => {
                let address = txn.allocate(key)?;
                txn.record(MetaAction::InsertBlock {
                    key: key.to_vec(),
                    position: position as u64,
                    address,
                })?;
                (position, 0)
            }
            InsertPlan::Split { position, offset } => {
                let address = txn.allocate(key)?;
                txn.record(MetaAction::SplitBlock {
                    key: key.to_vec(),
                    position: position as u64,
                    offset: offset as u64,
                    address,
                })?;
                (position, offset)
            }
        };

        let address = txn.allocate(key)?;
        txn.record(MetaAction::InsertSlot {
            key: key.to_vec(),
            position: position as u64,
            offset: offset as u64,
            address,
        })?;
        batch.push(Operation::Put {
            key: encode_list_value_key(key, address),
            value: value.to_vec(),
            expire_at: 0,
        });

        Ok(txn.list(key).map(ListMeta::size).unwrap_or(0))
    }

    /// Stage removal of the element at `index`; returns its value
    fn remove_at(
        &self,
        txn: &mut MetaTxn<'_>,
        batch: &mut WriteBatch,
        key: &[u8],
        index: u64,
    ) -> Result<Vec<u8>> {
        let slot = slot_at(txn, key, index)?;
        let value = self.read_value(key, slot.address)?;

        txn.record(MetaAction::RemoveSlot {
            key: key.to_vec(),
            position: slot.position as u64,
            offset: slot.offset as u64,
        })?;
        batch.push(Operation::Delete {
            key: encode_list_value_key(key, slot.address),
        });
        Ok(value)
    }

    fn drop_if_empty(&self, txn: &mut MetaTxn<'_>, key: &[u8]) -> Result<()> {
        if txn.list(key).is_some_and(|meta| meta.size() == 0) {
            txn.record(MetaAction::DropList { key: key.to_vec() })?;
        }
        Ok(())
    }

    fn read_value(&self, key: &[u8], address: u64) -> Result<Vec<u8>> {
        self.storage
            .list()
            .get(&encode_list_value_key(key, address))?
            .ok_or_else(|| {
                BlinkError::Corruption(format!(
                    "list {} lost value record {}",
                    String::from_utf8_lossy(key),
                    address
                ))
            })
    }
}

fn unknown_list(key: &[u8]) -> BlinkError {
    BlinkError::Corruption(format!("list {} vanished mid-operation", String::from_utf8_lossy(key)))
}

/// Resolve logical `index` to block position, offset and value address
fn slot_at(txn: &mut MetaTxn<'_>, key: &[u8], index: u64) -> Result<Slot> {
    let (position, offset, block_address) = {
        let meta = txn.list(key).ok_or_else(|| unknown_list(key))?;
        let (position, offset) = meta.locate(index).ok_or(BlinkError::IndexOutOfRange)?;
        (position, offset, meta.blocks()[position].address)
    };
    let address = txn
        .block(key, block_address)
        .ok_or_else(|| missing_block(key, block_address))?
        .slot(offset)
        .ok_or_else(|| {
            BlinkError::Corruption(format!(
                "block {block_address} has no slot {offset}"
            ))
        })?;
    Ok(Slot {
        position,
        offset,
        address,
    })
}

/// Value addresses for logical indices `first..=last`, in order
fn addresses_between(txn: &mut MetaTxn<'_>, key: &[u8], first: u64, last: u64) -> Result<Vec<u64>> {
    let (start_offset, blocks) = {
        let meta = txn.list(key).ok_or_else(|| unknown_list(key))?;
        let (position, offset) = meta.locate(first).ok_or(BlinkError::IndexOutOfRange)?;
        (offset, meta.blocks()[position..].to_vec())
    };

    let wanted = (last - first + 1) as usize;
    let mut addresses = Vec::with_capacity(wanted);
    let mut offset = start_offset;
    for ptr in blocks {
        let block = txn
            .block(key, ptr.address)
            .ok_or_else(|| missing_block(key, ptr.address))?;
        let take = (wanted - addresses.len()).min(block.len().saturating_sub(offset));
        addresses.extend_from_slice(&block.slots()[offset..offset + take]);
        if addresses.len() == wanted {
            break;
        }
        offset = 0;
    }

    if addresses.len() != wanted {
        return Err(BlinkError::Corruption(format!(
            "list {} has fewer slots than its size",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(addresses)
}

/// Redis-style range clamping; `None` for an empty range
fn clamp_range(size: u64, start: i64, stop: i64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }
    let size = size as i64;
    let start = if start < 0 { (size + start).max(0) } else { start };
    let stop = if stop < 0 { size + stop } else { stop.min(size - 1) };
    if start > stop || start >= size {
        return None;
    }
    Some((start as u64, stop as u64))
}
