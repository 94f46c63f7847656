//! Storage Module
//!
//! The storage adapter: three independent keyspaces (scalar, list, set),
//! each an ordered key-value store with optional per-key time-to-live.
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── scalar/   wal.log + sstables/
//!   ├── list/     wal.log + sstables/
//!   └── set/      wal.log + sstables/
//! ```

mod keyspace;
mod manager;
mod sstable;

use std::path::Path;

pub use keyspace::Keyspace;
pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};

use crate::config::Config;
use crate::error::Result;

/// The three keyspaces backing the data types
pub struct Storage {
    scalar: Keyspace,
    list: Keyspace,
    set: Keyspace,
}

impl Storage {
    /// Open (or create) all keyspaces under `data_dir`
    pub fn open(data_dir: &Path, config: &Config) -> Result<Self> {
        Ok(Self {
            scalar: Keyspace::open("scalar", &data_dir.join("scalar"), config)?,
            list: Keyspace::open("list", &data_dir.join("list"), config)?,
            set: Keyspace::open("set", &data_dir.join("set"), config)?,
        })
    }

    /// Keyspace for plain string values
    pub fn scalar(&self) -> &Keyspace {
        &self.scalar
    }

    /// Keyspace holding list element values
    pub fn list(&self) -> &Keyspace {
        &self.list
    }

    /// Keyspace holding set members
    pub fn set(&self) -> &Keyspace {
        &self.set
    }

    /// Flush and sync every keyspace
    pub fn close(&self) -> Result<()> {
        self.scalar.close()?;
        self.list.close()?;
        self.set.close()?;
        Ok(())
    }
}
