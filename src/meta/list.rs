//! List metadata records
//!
//! `ListMeta` maps a logical index onto a (block position, in-block offset)
//! pair; `ListMetaBlock` maps that offset onto the physical value address.

use serde::{Deserialize, Serialize};

use super::LIST_BLOCK_SLOTS;
use crate::error::{BlinkError, Result};

/// One entry of the block-pointer array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPtr {
    /// Area address of the ListMetaBlock record
    pub address: u64,
    /// Live slots in that block
    pub count: u64,
}

/// Where an insert at a logical index lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPlan {
    /// The owning block has room
    Existing { position: usize, offset: usize },
    /// A fresh block is inserted at `position`; the element goes to offset 0
    NewBlock { position: usize },
    /// The full block at `position` is split at `offset`; its tail moves to a
    /// new block at `position + 1` and the element is appended at `offset`
    Split { position: usize, offset: usize },
}

/// Structural metadata of one list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMeta {
    key: Vec<u8>,
    pub(crate) size: u64,
    limit: u64,
    block_limit: u64,
    pub(crate) next_area: u64,
    pub(crate) blocks: Vec<BlockPtr>,
}

impl ListMeta {
    /// An empty list; addresses start at 1
    pub fn new(key: Vec<u8>, limit: u64, block_limit: u64) -> Self {
        Self {
            key,
            size: 0,
            limit,
            block_limit,
            next_area: 1,
            blocks: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        key: Vec<u8>,
        size: u64,
        limit: u64,
        block_limit: u64,
        next_area: u64,
        blocks: Vec<BlockPtr>,
    ) -> Self {
        Self {
            key,
            size,
            limit,
            block_limit,
            next_area,
            blocks,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn block_limit(&self) -> u64 {
        self.block_limit
    }

    pub fn next_area(&self) -> u64 {
        self.next_area
    }

    pub fn blocks(&self) -> &[BlockPtr] {
        &self.blocks
    }

    /// Resolve a signed index (negative counts from the tail)
    pub fn resolve_index(&self, index: i64) -> Option<u64> {
        let size = self.size as i64;
        let idx = if index < 0 { size + index } else { index };
        if idx < 0 || idx >= size {
            None
        } else {
            Some(idx as u64)
        }
    }

    /// Owning block of an existing element
    ///
    /// Walks the populated pointers only and stops at the first block whose
    /// cumulative count covers `index`.
    pub fn locate(&self, index: u64) -> Option<(usize, usize)> {
        if index >= self.size {
            return None;
        }
        let mut remaining = index;
        for (position, ptr) in self.blocks.iter().enumerate() {
            if remaining < ptr.count {
                return Some((position, remaining as usize));
            }
            remaining -= ptr.count;
        }
        None
    }

    /// Owning block for an insert at `index` (which may equal `size`)
    ///
    /// Boundaries resolve to the end of the earlier block.
    pub fn locate_insert(&self, index: u64) -> Option<(usize, usize)> {
        if index > self.size {
            return None;
        }
        let mut remaining = index;
        for (position, ptr) in self.blocks.iter().enumerate() {
            if remaining <= ptr.count {
                return Some((position, remaining as usize));
            }
            remaining -= ptr.count;
        }
        None
    }

    /// Decide where an insert at `index` lands, checking every limit first
    pub fn plan_insert(&self, index: u64) -> Result<InsertPlan> {
        if self.size >= self.limit {
            return Err(BlinkError::CapacityExceeded { limit: self.limit });
        }
        if index > self.size {
            return Err(BlinkError::IndexOutOfRange);
        }

        let plan = match self.locate_insert(index) {
            None => InsertPlan::NewBlock { position: 0 },
            Some((position, offset)) => {
                let count = self.blocks[position].count as usize;
                if count < LIST_BLOCK_SLOTS {
                    InsertPlan::Existing { position, offset }
                } else if offset == 0 {
                    InsertPlan::NewBlock { position }
                } else if offset == count {
                    match self.blocks.get(position + 1) {
                        Some(next) if (next.count as usize) < LIST_BLOCK_SLOTS => {
                            InsertPlan::Existing {
                                position: position + 1,
                                offset: 0,
                            }
                        }
                        _ => InsertPlan::NewBlock {
                            position: position + 1,
                        },
                    }
                } else {
                    InsertPlan::Split { position, offset }
                }
            }
        };

        if !matches!(plan, InsertPlan::Existing { .. }) && self.block_count() >= self.block_limit {
            return Err(BlinkError::TooManyBlocks {
                limit: self.block_limit,
            });
        }
        Ok(plan)
    }

    /// Verify the structural invariants of this record
    pub fn check_invariants(&self) -> Result<()> {
        let corrupt = |msg: String| Err(BlinkError::Corruption(msg));

        let total: u64 = self.blocks.iter().map(|b| b.count).sum();
        if total != self.size {
            return corrupt(format!("block counts sum to {total}, size is {}", self.size));
        }
        if self.size > self.limit {
            return corrupt(format!("size {} exceeds limit {}", self.size, self.limit));
        }
        if self.block_count() > self.block_limit {
            return corrupt(format!(
                "{} blocks exceed block limit {}",
                self.block_count(),
                self.block_limit
            ));
        }
        if self.next_area == 0 {
            return corrupt("area counter is zero".to_string());
        }

        let mut seen = std::collections::HashSet::with_capacity(self.blocks.len());
        for ptr in &self.blocks {
            if ptr.count == 0 || ptr.count > LIST_BLOCK_SLOTS as u64 {
                return corrupt(format!("block {} holds {} slots", ptr.address, ptr.count));
            }
            if ptr.address == 0 || ptr.address >= self.next_area {
                return corrupt(format!("block address {} out of range", ptr.address));
            }
            if !seen.insert(ptr.address) {
                return corrupt(format!("block address {} used twice", ptr.address));
            }
        }
        Ok(())
    }
}

/// Ordered value addresses of one block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMetaBlock {
    slots: Vec<u64>,
}

impl ListMetaBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_slots(slots: Vec<u64>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[u64] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, offset: usize) -> Option<u64> {
        self.slots.get(offset).copied()
    }

    pub(crate) fn insert(&mut self, offset: usize, address: u64) -> Result<()> {
        if offset > self.slots.len() || self.slots.len() >= LIST_BLOCK_SLOTS {
            return Err(BlinkError::Corruption(format!(
                "slot insert at {offset} into block of {}",
                self.slots.len()
            )));
        }
        self.slots.insert(offset, address);
        Ok(())
    }

    pub(crate) fn remove(&mut self, offset: usize) -> Result<u64> {
        if offset >= self.slots.len() {
            return Err(BlinkError::Corruption(format!(
                "slot remove at {offset} from block of {}",
                self.slots.len()
            )));
        }
        Ok(self.slots.remove(offset))
    }

    pub(crate) fn split_off(&mut self, offset: usize) -> Result<ListMetaBlock> {
        if offset > self.slots.len() {
            return Err(BlinkError::Corruption(format!(
                "split at {offset} of block of {}",
                self.slots.len()
            )));
        }
        Ok(ListMetaBlock {
            slots: self.slots.split_off(offset),
        })
    }
}
