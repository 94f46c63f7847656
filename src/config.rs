//! Configuration for blinkkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{BlinkError, Result};
use crate::meta::{DEFAULT_LIST_BLOCK_LIMIT, DEFAULT_LIST_ELEMENT_LIMIT};

/// Main configuration for a blinkkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── scalar/          (keyspace: wal.log + sstables/)
    ///     ├── list/            (keyspace: wal.log + sstables/)
    ///     ├── set/             (keyspace: wal.log + sstables/)
    ///     ├── meta.aof         (metadata action log)
    ///     └── meta.snapshot    (compacted metadata)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync keyspace WALs and the action log
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of a keyspace memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // List / Metadata Configuration
    // -------------------------------------------------------------------------
    /// Element ceiling stamped into every new list
    pub list_element_limit: u64,

    /// Block-pointer capacity stamped into every new list
    pub list_block_limit: u64,

    /// Capacity of the action queue between operations and the log writer
    pub meta_queue_capacity: usize,

    /// Action log size (bytes) that triggers a metadata snapshot
    pub meta_compact_threshold: u64,

    /// How often the compactor checks the action log size (milliseconds)
    pub meta_compact_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blinkkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            list_element_limit: DEFAULT_LIST_ELEMENT_LIMIT,
            list_block_limit: DEFAULT_LIST_BLOCK_LIMIT,
            meta_queue_capacity: 64 * 1024,
            meta_compact_threshold: 64 * 1024 * 1024, // 64 MB
            meta_compact_interval_ms: 1000,
            listen_addr: "127.0.0.1:6379".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.list_element_limit == 0 {
            return Err(BlinkError::Config(
                "list_element_limit must be positive".to_string(),
            ));
        }
        if self.list_block_limit == 0 || self.list_block_limit > u16::MAX as u64 {
            return Err(BlinkError::Config(format!(
                "list_block_limit must be in 1..={}",
                u16::MAX
            )));
        }
        if self.meta_queue_capacity == 0 {
            return Err(BlinkError::Config(
                "meta_queue_capacity must be positive".to_string(),
            ));
        }
        if self.meta_compact_interval_ms == 0 {
            return Err(BlinkError::Config(
                "meta_compact_interval_ms must be positive".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(BlinkError::Config(
                "WAL sync entry count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the element ceiling for new lists
    pub fn list_element_limit(mut self, limit: u64) -> Self {
        self.config.list_element_limit = limit;
        self
    }

    /// Set the block-pointer capacity for new lists
    pub fn list_block_limit(mut self, limit: u64) -> Self {
        self.config.list_block_limit = limit;
        self
    }

    /// Set the action queue capacity
    pub fn meta_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.meta_queue_capacity = capacity;
        self
    }

    /// Set the action log size that triggers compaction (in bytes)
    pub fn meta_compact_threshold(mut self, bytes: u64) -> Self {
        self.config.meta_compact_threshold = bytes;
        self
    }

    /// Set the compactor polling interval (in milliseconds)
    pub fn meta_compact_interval_ms(mut self, ms: u64) -> Self {
        self.config.meta_compact_interval_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
