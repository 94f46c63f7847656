//! Metadata Module
//!
//! Structural metadata that turns the flat list/set keyspaces into ordered
//! collections.
//!
//! ## Records
//! - `ListMeta`: size, limits, area counter and the block-pointer array
//! - `ListMetaBlock`: the physical value addresses of one block
//! - `SetMeta`: member count of a set
//!
//! ## Address indirection
//! ```text
//! ListMeta "mylist"
//!   blocks: [ {addr 7, count 3} , {addr 1, count 256} , ... ]
//!               │                    │
//!               ▼                    ▼
//!   ListMetaBlock (mylist, 7)   ListMetaBlock (mylist, 1)
//!     slots: [12, 9, 8]           slots: [6, 5, 4, ...]
//!               │
//!               ▼
//!   list keyspace: V|mylist|12 → "value"
//! ```
//!
//! Every mutation is expressed as a `MetaAction`, applied to a staged
//! `MetaTxn`, committed into the `MetaCache`, and appended to the action log
//! by the `MetaJournal`. Snapshots bound the replay length.

mod action;
mod cache;
mod codec;
mod journal;
mod list;
mod lock;
mod set;
mod snapshot;
mod txn;

pub use action::{ActionBatch, MetaAction, RecordStore};
pub use cache::MetaCache;
pub use codec::{
    check_key, decode_cache_key, decode_record, encode_list_block_key, encode_list_meta_key,
    encode_list_value_key, encode_record, encode_set_member_key, encode_set_meta_key,
    set_member_prefix, CacheKey, MAX_KEY_LEN,
};
pub use journal::{MetaJournal, Recovered};
pub use list::{BlockPtr, InsertPlan, ListMeta, ListMetaBlock};
pub use lock::{RecordGuard, RecordLockTable};
pub use set::SetMeta;
pub use snapshot::MetaSnapshot;
pub use txn::MetaTxn;

/// Fixed slot capacity of one ListMetaBlock
pub const LIST_BLOCK_SLOTS: usize = 256;

/// Default element ceiling for a new list
pub const DEFAULT_LIST_ELEMENT_LIMIT: u64 = 1 << 20;

/// Default block-pointer capacity for a new list
pub const DEFAULT_LIST_BLOCK_LIMIT: u64 = 8192;

/// One cached metadata record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaRecord {
    List(ListMeta),
    Block(ListMetaBlock),
    Set(SetMeta),
}

/// Discriminant of a `MetaRecord`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    List,
    Block,
    Set,
}

impl MetaRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            MetaRecord::List(_) => RecordKind::List,
            MetaRecord::Block(_) => RecordKind::Block,
            MetaRecord::Set(_) => RecordKind::Set,
        }
    }

    pub fn as_list(&self) -> Option<&ListMeta> {
        match self {
            MetaRecord::List(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListMeta> {
        match self {
            MetaRecord::List(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&ListMetaBlock> {
        match self {
            MetaRecord::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut ListMetaBlock> {
        match self {
            MetaRecord::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetMeta> {
        match self {
            MetaRecord::Set(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut SetMeta> {
        match self {
            MetaRecord::Set(meta) => Some(meta),
            _ => None,
        }
    }
}
