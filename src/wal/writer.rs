//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::entry::decode_header;
use super::{WalEntry, HEADER_SIZE};

/// Writes entries to the WAL file
pub struct WalWriter {
    /// Path of the log file
    path: PathBuf,

    /// Buffered append handle
    writer: BufWriter<File>,

    /// LSN handed to the next appended entry
    next_lsn: u64,

    /// When to fsync
    sync_strategy: WalSyncStrategy,

    /// Entries written since the last fsync
    unsynced: usize,

    /// Bytes in the file, including buffered bytes
    size: u64,

    /// Appends fail without touching the file while set
    fail_appends: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Appends continue after the last complete frame; the next LSN follows
    /// the highest LSN already in the file.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (last_lsn, size) = Self::scan_frames(&mut file)?;
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            size,
            fail_appends: false,
        })
    }

    /// Walk frame headers to find the highest LSN without decoding bodies
    fn scan_frames(file: &mut File) -> Result<(u64, u64)> {
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        let mut last_lsn = 0u64;
        let mut header = [0u8; HEADER_SIZE];

        while offset + HEADER_SIZE as u64 <= len {
            file.read_exact(&mut header)?;
            let (lsn, _crc, body_len) = decode_header(&header);
            let next = offset + HEADER_SIZE as u64 + body_len as u64;
            if next > len {
                break;
            }
            last_lsn = last_lsn.max(lsn);
            file.seek(SeekFrom::Start(next))?;
            offset = next;
        }

        Ok((last_lsn, len))
    }

    /// Append an operation under the next LSN
    pub fn append<T>(&mut self, operation: T) -> Result<u64>
    where
        T: Serialize + DeserializeOwned,
    {
        let entry = WalEntry::new(self.next_lsn, operation);
        self.append_entry(&entry)
    }

    /// Append a pre-built entry, keeping its LSN
    pub fn append_entry<T>(&mut self, entry: &WalEntry<T>) -> Result<u64>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.fail_appends {
            return Err(io::Error::new(io::ErrorKind::Other, "injected append failure").into());
        }

        let frame = entry.serialize()?;
        self.writer.write_all(&frame)?;
        self.size += frame.len() as u64;
        self.next_lsn = self.next_lsn.max(entry.lsn + 1);
        self.unsynced += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } => {
                if self.unsynced >= count {
                    self.sync()?;
                }
            }
        }

        Ok(entry.lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry (their effects are durable elsewhere)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.size = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the LSN the next append will use
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Bytes written to the log so far
    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fault injection: make appends fail until cleared
    #[doc(hidden)]
    pub fn set_fail_appends(&mut self, fail: bool) {
        self.fail_appends = fail;
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush WAL {}: {}", self.path.display(), e);
        }
    }
}
