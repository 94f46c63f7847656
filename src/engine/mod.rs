//! Engine Module
//!
//! The core engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the storage adapter, the Metadata Cache and the Record Lock Table
//! - Run list and set operations as staged metadata transactions
//! - Route parsed commands to their handlers
//! - Rebuild metadata on startup and keep the action log compacted
//!
//! ## Operation flow
//! ```text
//! gate (shared) → record lock(key) → MetaTxn (staged) → keyspace.write(batch)
//!     → txn.commit() into cache → journal.submit(actions) → release
//! ```
//! A failed storage write drops the staged transaction, so the cache never
//! reflects a write that did not reach storage and no action is logged.

mod list;
mod set;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BlinkError, Result};
use crate::meta::{
    check_key, encode_list_block_key, encode_list_meta_key, encode_list_value_key,
    set_member_prefix, ListMeta, MetaAction, MetaCache, MetaJournal, MetaRecord, MetaTxn,
    RecordLockTable, Recovered,
};
use crate::protocol::{Command, Reply};
use crate::storage::{Keyspace, Storage};
use crate::wal::{Operation, WriteBatch};

/// The main engine
///
/// ## Concurrency Model
///
/// - **Per key**: every list/set operation holds the key's record lock, so
///   operations on one key are serialized in lock order
/// - **Across keys**: operations proceed in parallel; the cache is sharded
///   and each keyspace serializes only its own WAL appends
/// - **Structural gate**: operations hold it shared; compaction and
///   metadata reload take it exclusively
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Scalar, list and set keyspaces
    storage: Storage,

    /// In-memory ListMeta / ListMetaBlock / SetMeta records
    cache: Arc<MetaCache>,

    /// Per-key serialization
    locks: RecordLockTable,

    /// Action log writer, compactor and structural gate
    journal: MetaJournal,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Open the keyspaces (each replays its own WAL)
    /// 3. Rebuild metadata from snapshot and action log
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = Storage::open(&config.data_dir, &config)?;

        let cache = Arc::new(MetaCache::new());
        let (journal, recovered) = MetaJournal::open(&config, Arc::clone(&cache))?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            "Engine opened: {} metadata records ({} from snapshot, {} batches replayed)",
            cache.len(),
            recovered.snapshot_records,
            recovered.batches_replayed
        );

        Ok(Self {
            config,
            storage,
            cache,
            locks: RecordLockTable::new(),
            journal,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers and shapes the reply.
    pub fn execute(&self, command: Command) -> Result<Reply> {
        tracing::trace!(command = command.name(), "Executing");
        match command {
            Command::Ping { message } => Ok(match message {
                Some(message) => Reply::Bulk(message),
                None => Reply::Status("PONG".to_string()),
            }),
            Command::Quit => Ok(Reply::ok()),

            Command::Get { key } => Ok(Reply::from_option(self.get(&key)?)),
            Command::Set { key, value, ttl } => {
                self.set(&key, &value, ttl)?;
                Ok(Reply::ok())
            }
            Command::Del { keys } => Ok(Reply::integer(self.del(&keys)?)),

            Command::LPush { key, values } => Ok(Reply::integer(self.lpush(&key, &values)?)),
            Command::LPushX { key, values } => Ok(Reply::integer(self.lpushx(&key, &values)?)),
            Command::RPush { key, values } => Ok(Reply::integer(self.rpush(&key, &values)?)),
            Command::LPop { key } => Ok(Reply::from_option(self.lpop(&key)?)),
            Command::RPop { key } => Ok(Reply::from_option(self.rpop(&key)?)),
            Command::LIndex { key, index } => match self.lindex(&key, index) {
                Ok(value) => Ok(Reply::Bulk(value)),
                Err(BlinkError::NotFound) | Err(BlinkError::IndexOutOfRange) => Ok(Reply::Nil),
                Err(e) => Err(e),
            },
            Command::LLen { key } => Ok(Reply::integer(self.llen(&key)?)),
            Command::LRange { key, start, stop } => Ok(Reply::bulk_array(self.lrange(&key, start, stop)?)),
            Command::LSet { key, index, value } => {
                self.lset(&key, index, &value)?;
                Ok(Reply::ok())
            }
            Command::LRem { key, count, value } => Ok(Reply::integer(self.lrem(&key, count, &value)?)),

            Command::SAdd { key, members } => Ok(Reply::integer(self.sadd(&key, &members)?)),
            Command::SCard { key } => Ok(Reply::integer(self.scard(&key)?)),
            Command::SIsMember { key, member } => {
                Ok(Reply::integer(self.sismember(&key, &member)? as u64))
            }
            Command::SRem { key, members } => Ok(Reply::integer(self.srem(&key, &members)?)),
            Command::SMembers { key } => Ok(Reply::bulk_array(self.smembers(&key)?)),
        }
    }

    // =========================================================================
    // Scalar values
    // =========================================================================

    /// Get a scalar value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        self.storage.scalar().get(key)
    }

    /// Store a scalar value, optionally expiring after `ttl`
    pub fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        check_key(key)?;
        self.storage.scalar().put_with_ttl(key, value, ttl)
    }

    /// Remove the scalar, list and set stored under each key
    ///
    /// Returns how many keys held anything. Keys are processed one at a
    /// time; there is no atomicity across keys.
    pub fn del(&self, keys: &[Vec<u8>]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if self.del_one(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Each keyspace is cleared and its metadata logged before the next
    /// one is touched, so a failed write leaves every remaining record
    /// reachable. The scalar goes last.
    fn del_one(&self, key: &[u8]) -> Result<bool> {
        check_key(key)?;
        let _gate = self.journal.enter()?;
        let _lock = self.locks.lock(key);

        let list_found = self.drop_list(key)?;
        let set_found = self.drop_set(key)?;

        let mut scalar_found = false;
        if self.storage.scalar().exists(key)? {
            self.storage.scalar().delete(key)?;
            scalar_found = true;
        }
        Ok(list_found || set_found || scalar_found)
    }

    /// Delete a list's values and metadata; caller holds gate and lock
    fn drop_list(&self, key: &[u8]) -> Result<bool> {
        let mut txn = MetaTxn::new(&self.cache);
        let Some(meta) = txn.list(key) else {
            return Ok(false);
        };

        let mut batch = WriteBatch::new();
        let addresses: Vec<u64> = meta.blocks().iter().map(|b| b.address).collect();
        for block_address in addresses {
            let slots = txn
                .block(key, block_address)
                .map(|b| b.slots().to_vec())
                .ok_or_else(|| missing_block(key, block_address))?;
            batch.extend(slots.into_iter().map(|address| Operation::Delete {
                key: encode_list_value_key(key, address),
            }));
        }
        txn.record(MetaAction::DropList { key: key.to_vec() })?;

        self.storage.list().write(batch)?;
        self.journal.submit(txn.commit())?;
        Ok(true)
    }

    /// Delete a set's members and metadata; caller holds gate and lock
    fn drop_set(&self, key: &[u8]) -> Result<bool> {
        let mut txn = MetaTxn::new(&self.cache);
        if txn.set_meta(key).is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        for (member_key, _) in self.storage.set().scan_prefix(&set_member_prefix(key))? {
            batch.push(Operation::Delete { key: member_key });
        }
        txn.record(MetaAction::DropSet { key: key.to_vec() })?;

        self.storage.set().write(batch)?;
        self.journal.submit(txn.commit())?;
        Ok(true)
    }

    // =========================================================================
    // Metadata maintenance
    // =========================================================================

    /// Snapshot the metadata and truncate the action log now
    pub fn compact_meta(&self) -> Result<bool> {
        self.journal.compact()
    }

    /// Rebuild the Metadata Cache from snapshot and action log
    ///
    /// Operations arriving meanwhile fail with `Reloading`.
    pub fn reload_metadata(&self) -> Result<Recovered> {
        self.journal.reload()
    }

    /// Wait until every committed action is in the log and fsync it
    pub fn sync_meta(&self) -> Result<()> {
        self.journal.sync()
    }

    /// Copy of a list's metadata
    pub fn list_meta(&self, key: &[u8]) -> Option<ListMeta> {
        self.cache.read(&encode_list_meta_key(key), |record| {
            record.and_then(MetaRecord::as_list).cloned()
        })
    }

    /// Every metadata record in encoded form, sorted by cache key
    pub fn metadata_records(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.cache.encoded_records()
    }

    /// Verify a list's structure against its block records
    pub fn check_list(&self, key: &[u8]) -> Result<()> {
        let Some(meta) = self.list_meta(key) else {
            return Ok(());
        };
        meta.check_invariants()?;
        for ptr in meta.blocks() {
            let len = self
                .cache
                .read(&encode_list_block_key(key, ptr.address), |record| {
                    record.and_then(MetaRecord::as_block).map(|b| b.len())
                })
                .ok_or_else(|| missing_block(key, ptr.address))?;
            if len as u64 != ptr.count {
                return Err(BlinkError::Corruption(format!(
                    "block {} holds {} slots, pointer says {}",
                    ptr.address, len, ptr.count
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Last action sequence number handed out
    pub fn meta_sequence(&self) -> u64 {
        self.journal.sequence()
    }

    /// Current size of the action log in bytes
    pub fn meta_log_size(&self) -> u64 {
        self.journal.log_size()
    }

    /// Fault injection: fail action-log appends until cleared
    #[doc(hidden)]
    pub fn fail_meta_appends(&self, fail: bool) {
        self.journal.fail_appends(fail);
    }

    /// Close the engine gracefully
    ///
    /// Drains the action queue and flushes every keyspace.
    pub fn close(self) -> Result<()> {
        let Engine {
            storage, journal, ..
        } = self;
        let journal_result = journal.close();
        storage.close()?;
        journal_result?;
        tracing::info!("Engine closed");
        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Run a metadata read under the gate and the key's record lock
    fn inspect<R>(&self, key: &[u8], f: impl FnOnce(&mut MetaTxn<'_>) -> Result<R>) -> Result<R> {
        check_key(key)?;
        let _gate = self.journal.enter()?;
        let _lock = self.locks.lock(key);
        let mut txn = MetaTxn::new(&self.cache);
        f(&mut txn)
    }

    /// Run a mutation: stage metadata, write `keyspace`, then commit and log
    fn mutate<R>(
        &self,
        key: &[u8],
        keyspace: &Keyspace,
        f: impl FnOnce(&mut MetaTxn<'_>, &mut WriteBatch) -> Result<R>,
    ) -> Result<R> {
        check_key(key)?;
        let _gate = self.journal.enter()?;
        let _lock = self.locks.lock(key);

        let mut txn = MetaTxn::new(&self.cache);
        let mut batch = WriteBatch::new();
        let result = f(&mut txn, &mut batch)?;

        keyspace.write(batch)?;
        let actions = txn.commit();
        if !actions.is_empty() {
            tracing::trace!(
                key = %String::from_utf8_lossy(key),
                "Committed {} metadata actions",
                actions.len()
            );
        }
        self.journal.submit(actions)?;
        Ok(result)
    }
}

fn missing_block(key: &[u8], address: u64) -> BlinkError {
    BlinkError::Corruption(format!(
        "list {} references missing block {}",
        String::from_utf8_lossy(key),
        address
    ))
}
