//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

use super::reader::Frame;
use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Detect and skip corrupted entries
    /// 3. Truncate partial writes at end
    /// 4. Return all valid entries in order
    pub fn recover<T>(path: &Path) -> Result<(Vec<WalEntry<T>>, RecoveryResult)>
    where
        T: Serialize + DeserializeOwned,
    {
        let (entries, result, torn_at) = Self::scan(path, true)?;

        if let Some(offset) = torn_at {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            tracing::warn!(
                "Truncated partial WAL entry at offset {} in {}",
                offset,
                path.display()
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify<T>(path: &Path) -> Result<RecoveryResult>
    where
        T: Serialize + DeserializeOwned,
    {
        let (_entries, result, _torn_at) = Self::scan::<T>(path, false)?;
        Ok(result)
    }

    fn scan<T>(path: &Path, keep: bool) -> Result<(Vec<WalEntry<T>>, RecoveryResult, Option<u64>)>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut reader = WalReader::<T>::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut torn_at = None;

        loop {
            match reader.next_frame()? {
                Frame::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = result.last_lsn.max(entry.lsn);
                    if keep {
                        entries.push(entry);
                    }
                }
                Frame::Corrupt { lsn, reason } => {
                    tracing::warn!("Skipping corrupted WAL entry {}: {}", lsn, reason);
                    result.entries_corrupted += 1;
                }
                Frame::Torn { offset } => {
                    result.was_truncated = true;
                    torn_at = Some(offset);
                    break;
                }
                Frame::End => break,
            }
        }

        Ok((entries, result, torn_at))
    }
}
