//! Metadata journal
//!
//! Durability for the Metadata Cache:
//! - operations `submit` action batches onto a bounded channel
//! - a writer thread appends each batch to `meta.aof` in WAL framing,
//!   using the batch sequence number as its LSN
//! - a compactor thread snapshots the cache into `meta.snapshot` once the
//!   log passes the size threshold, then truncates the log
//!
//! ## Structural gate
//! Operations hold the gate shared from staging until their batch is
//! submitted; compaction and reload hold it exclusively. A snapshot stamped
//! with sequence S therefore reflects every batch numbered S or below, and
//! replay skips those batches.
//!
//! ## Append failures
//! The first failed append latches the journal. Every later `enter`,
//! `submit`, `sync`, `compact`, `reload` and `close` returns that failure,
//! and the writer appends nothing past the gap. Restart to recover.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};

use super::action::{ActionBatch, MetaAction};
use super::cache::MetaCache;
use super::snapshot::MetaSnapshot;
use super::MetaRecord;
use crate::config::Config;
use crate::error::{BlinkError, Result};
use crate::wal::{WalEntry, WalRecovery, WalWriter};

const LOG_FILENAME: &str = "meta.aof";
const SNAPSHOT_FILENAME: &str = "meta.snapshot";

/// What recovery found on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovered {
    /// Records installed from the snapshot
    pub snapshot_records: usize,
    /// Sequence the snapshot was stamped with (0 without a snapshot)
    pub snapshot_sequence: u64,
    /// Log batches applied
    pub batches_replayed: u64,
    /// Log batches already covered by the snapshot
    pub batches_skipped: u64,
    /// A torn tail was cut from the log
    pub log_truncated: bool,
}

struct Shared {
    cache: Arc<MetaCache>,
    log: Mutex<WalWriter>,
    log_path: PathBuf,
    snapshot_path: PathBuf,
    gate: RwLock<()>,

    /// Last sequence number handed out
    sequence: AtomicU64,
    submitted: AtomicU64,
    appended: Mutex<u64>,
    appended_cv: Condvar,

    forbid_compact: AtomicBool,
    reloading: AtomicBool,
    compact_threshold: u64,

    /// First append failure; set once, never cleared
    failure: Mutex<Option<String>>,
}

pub struct MetaJournal {
    shared: Arc<Shared>,
    sender: Option<Sender<WalEntry<ActionBatch>>>,
    shutdown: Option<Sender<()>>,
    writer: Option<JoinHandle<()>>,
    compactor: Option<JoinHandle<()>>,
}

impl MetaJournal {
    /// Rebuild `cache` from disk and start the background threads
    pub fn open(config: &Config, cache: Arc<MetaCache>) -> Result<(Self, Recovered)> {
        let log_path = config.data_dir.join(LOG_FILENAME);
        let snapshot_path = config.data_dir.join(SNAPSHOT_FILENAME);

        let (records, last_sequence, recovered) = recover_records(&log_path, &snapshot_path)?;
        cache.clear();
        cache.install(records);

        let log = WalWriter::open(&log_path, config.wal_sync_strategy)?;

        let shared = Arc::new(Shared {
            cache,
            log: Mutex::new(log),
            log_path,
            snapshot_path,
            gate: RwLock::new(()),
            sequence: AtomicU64::new(last_sequence),
            submitted: AtomicU64::new(0),
            appended: Mutex::new(0),
            appended_cv: Condvar::new(),
            forbid_compact: AtomicBool::new(false),
            reloading: AtomicBool::new(false),
            compact_threshold: config.meta_compact_threshold,
            failure: Mutex::new(None),
        });

        let (sender, receiver) = channel::bounded(config.meta_queue_capacity);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let interval = Duration::from_millis(config.meta_compact_interval_ms);

        let writer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("blinkkv-meta-writer".to_string())
                .spawn(move || shared.run_writer(receiver))?
        };
        let compactor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("blinkkv-meta-compactor".to_string())
                .spawn(move || shared.run_compactor(shutdown_rx, interval))?
        };

        Ok((
            Self {
                shared,
                sender: Some(sender),
                shutdown: Some(shutdown_tx),
                writer: Some(writer),
                compactor: Some(compactor),
            },
            recovered,
        ))
    }

    /// Shared hold on the structural gate for one operation
    pub fn enter(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.shared.check_failure()?;
        if self.shared.reloading.load(Ordering::Acquire) {
            return Err(BlinkError::Reloading);
        }
        let guard = self.shared.gate.read();
        if self.shared.reloading.load(Ordering::Acquire) {
            return Err(BlinkError::Reloading);
        }
        Ok(guard)
    }

    /// Queue a committed batch for the log; blocks while the queue is full
    pub fn submit(&self, batch: ActionBatch) -> Result<u64> {
        self.shared.check_failure()?;
        if batch.is_empty() {
            return Ok(self.sequence());
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BlinkError::Storage("action log is closed".to_string()))?;

        let sequence = self.shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.submitted.fetch_add(1, Ordering::AcqRel);
        if sender.send(WalEntry::new(sequence, batch)).is_err() {
            self.shared.submitted.fetch_sub(1, Ordering::AcqRel);
            return Err(BlinkError::Storage("action log writer stopped".to_string()));
        }
        tracing::trace!(sequence, "Queued action batch");
        Ok(sequence)
    }

    /// Wait for every queued batch to reach the log, then fsync it
    pub fn sync(&self) -> Result<()> {
        self.shared.wait_appended();
        self.shared.check_failure()?;
        self.shared.log.lock().sync()
    }

    /// Snapshot the cache and truncate the log
    ///
    /// Returns false while compaction is forbidden (recovery in progress).
    pub fn compact(&self) -> Result<bool> {
        self.shared.compact()
    }

    /// Drop the cache and rebuild it from snapshot and log
    pub fn reload(&self) -> Result<Recovered> {
        let shared = &self.shared;
        let _gate = shared.gate.write();
        shared.wait_appended();
        shared.check_failure()?;

        shared.forbid_compact.store(true, Ordering::Release);
        shared.reloading.store(true, Ordering::Release);

        let result = shared
            .log
            .lock()
            .sync()
            .and_then(|_| recover_records(&shared.log_path, &shared.snapshot_path));

        let outcome = result.map(|(records, last_sequence, recovered)| {
            shared.cache.clear();
            shared.cache.install(records);
            shared.sequence.fetch_max(last_sequence, Ordering::AcqRel);
            recovered
        });

        shared.reloading.store(false, Ordering::Release);
        shared.forbid_compact.store(false, Ordering::Release);

        let recovered = outcome?;
        tracing::info!(
            "Metadata reloaded: {} snapshot records, {} batches replayed",
            recovered.snapshot_records,
            recovered.batches_replayed
        );
        Ok(recovered)
    }

    /// Last sequence number handed out
    pub fn sequence(&self) -> u64 {
        self.shared.sequence.load(Ordering::Acquire)
    }

    /// Current size of the action log in bytes
    pub fn log_size(&self) -> u64 {
        self.shared.log.lock().size_bytes()
    }

    /// Drain the queue, stop both threads and fsync the log
    pub fn close(mut self) -> Result<()> {
        self.stop();
        self.shared.check_failure()?;
        self.shared.log.lock().sync()
    }

    /// Fault injection: fail every action-log append until cleared
    #[doc(hidden)]
    pub fn fail_appends(&self, fail: bool) {
        self.shared.log.lock().set_fail_appends(fail);
    }

    fn stop(&mut self) {
        // Compactor first so it never races the final drain
        self.shutdown.take();
        if let Some(handle) = self.compactor.take() {
            if handle.join().is_err() {
                tracing::warn!("Metadata compactor thread panicked");
            }
        }
        self.sender.take();
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                tracing::warn!("Metadata writer thread panicked");
            }
        }
    }
}

impl Drop for MetaJournal {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn run_writer(&self, receiver: Receiver<WalEntry<ActionBatch>>) {
        for entry in receiver.iter() {
            // Nothing may land after a missing batch
            if self.failure.lock().is_none() {
                if let Err(e) = self.log.lock().append_entry(&entry) {
                    tracing::error!(sequence = entry.lsn, "Failed to append action batch: {}", e);
                    *self.failure.lock() = Some(format!("batch {}: {}", entry.lsn, e));
                }
            }
            let mut appended = self.appended.lock();
            *appended += 1;
            self.appended_cv.notify_all();
        }
        tracing::debug!("Metadata writer stopped");
    }

    fn run_compactor(&self, shutdown: Receiver<()>, interval: Duration) {
        let ticker = channel::tick(interval);
        loop {
            crossbeam::select! {
                recv(ticker) -> _ => {
                    let size = self.log.lock().size_bytes();
                    if size >= self.compact_threshold && self.check_failure().is_ok() {
                        tracing::debug!("Action log at {} bytes, compacting", size);
                        if let Err(e) = self.compact() {
                            tracing::warn!("Metadata compaction failed: {}", e);
                        }
                    }
                }
                recv(shutdown) -> _ => break,
            }
        }
        tracing::debug!("Metadata compactor stopped");
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(BlinkError::Storage(format!(
                "action log append failed: {}",
                message
            ))),
            None => Ok(()),
        }
    }

    fn wait_appended(&self) {
        let target = self.submitted.load(Ordering::Acquire);
        let mut appended = self.appended.lock();
        while *appended < target {
            self.appended_cv.wait(&mut appended);
        }
    }

    fn compact(&self) -> Result<bool> {
        if self.forbid_compact.load(Ordering::Acquire) {
            return Ok(false);
        }
        let _gate = self.gate.write();
        if self.forbid_compact.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.wait_appended();
        self.check_failure()?;

        let sequence = self.sequence.load(Ordering::Acquire);
        let snapshot = MetaSnapshot::new(sequence, self.cache.encoded_records());

        let mut log = self.log.lock();
        log.sync()?;
        snapshot.write_to(&self.snapshot_path)?;
        log.truncate()?;

        tracing::debug!(
            sequence,
            "Metadata snapshot written: {} records",
            snapshot.records.len()
        );
        Ok(true)
    }
}

/// LoadMetaSnapshot followed by LoadMetaAppendonly
fn recover_records(
    log_path: &Path,
    snapshot_path: &Path,
) -> Result<(HashMap<Vec<u8>, MetaRecord>, u64, Recovered)> {
    let mut records = HashMap::new();
    let mut recovered = Recovered::default();

    if let Some(snapshot) = MetaSnapshot::load(snapshot_path)? {
        recovered.snapshot_sequence = snapshot.sequence;
        recovered.snapshot_records = snapshot.records.len();
        for (cache_key, record) in snapshot.records {
            MetaAction::Reinit { cache_key, record }.apply(&mut records)?;
        }
    }

    let mut last_sequence = recovered.snapshot_sequence;
    if log_path.exists() {
        let (entries, result) = WalRecovery::recover::<ActionBatch>(log_path)?;
        if result.entries_corrupted > 0 {
            return Err(BlinkError::Corruption(format!(
                "{} corrupted batches in {}",
                result.entries_corrupted,
                log_path.display()
            )));
        }
        recovered.log_truncated = result.was_truncated;
        last_sequence = last_sequence.max(result.last_lsn);

        for entry in entries {
            if entry.lsn <= recovered.snapshot_sequence {
                recovered.batches_skipped += 1;
                continue;
            }
            for action in &entry.operation {
                action.apply(&mut records)?;
            }
            recovered.batches_replayed += 1;
        }
    }

    for record in records.values() {
        if let MetaRecord::List(meta) = record {
            meta.check_invariants()?;
        }
    }

    if recovered.snapshot_records > 0 || recovered.batches_replayed > 0 {
        tracing::info!(
            "Metadata recovery: {} snapshot records (sequence {}), {} batches replayed, {} skipped",
            recovered.snapshot_records,
            recovered.snapshot_sequence,
            recovered.batches_replayed,
            recovered.batches_skipped
        );
    }

    Ok((records, last_sequence, recovered))
}
