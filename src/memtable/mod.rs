//! MemTable Module
//!
//! In-memory data structure for recent keyspace writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and prefix scans
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in a parking_lot RwLock:
//! - Ordered keys (required for SSTable generation and prefix scans)
//! - Expiry stored next to each value, checked on read

mod table;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value; `expire_at` is unix millis, 0 = never
    Value { value: Vec<u8>, expire_at: u64 },

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// True if the value's time-to-live has elapsed at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        match self {
            MemTableEntry::Value { expire_at, .. } => *expire_at != 0 && *expire_at <= now,
            MemTableEntry::Tombstone => false,
        }
    }

    /// Approximate heap footprint used for flush accounting
    pub(crate) fn footprint(&self) -> usize {
        match self {
            MemTableEntry::Value { value, .. } => value.len() + 8,
            MemTableEntry::Tombstone => 1,
        }
    }
}
