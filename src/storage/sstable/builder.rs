//! SSTable Builder
//!
//! Writes sorted entries to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{BlinkError, Result};
use crate::memtable::MemTableEntry;

use super::{SSTable, ENTRY_HEADER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()`/`add_tombstone()` in sorted order,
    /// then `finish()` to write index and footer.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Write header (entry_count placeholder, patched in finish)
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a value with its expiry (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8], expire_at: u64) -> Result<()> {
        self.write_entry(key, Some(value), expire_at)
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None, 0)
    }

    /// Add a memtable entry as-is
    pub fn add_entry(&mut self, key: &[u8], entry: &MemTableEntry) -> Result<()> {
        match entry {
            MemTableEntry::Value { value, expire_at } => self.add(key, value, *expire_at),
            MemTableEntry::Tombstone => self.add_tombstone(key),
        }
    }

    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>, expire_at: u64) -> Result<()> {
        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(BlinkError::Storage(
                    "SSTable keys must be added in strictly increasing order".to_string(),
                ));
            }
        }

        // Record offset for index
        self.index.push((key.to_vec(), self.current_offset));

        // Track min/max keys
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        let val_len = match value {
            Some(v) => v.len() as u32,
            None => TOMBSTONE_MARKER,
        };

        // Entry header: [key_len(4)][val_len(4)][expire_at(8)]
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        header[0..4].copy_from_slice(&(key.len() as u32).to_le_bytes());
        header[4..8].copy_from_slice(&val_len.to_le_bytes());
        header[8..16].copy_from_slice(&expire_at.to_le_bytes());

        // Write and accumulate CRC
        self.writer.write_all(&header)?;
        self.writer.write_all(key)?;
        self.data_hasher.update(&header);
        self.data_hasher.update(key);

        let mut entry_size = (ENTRY_HEADER_SIZE + key.len()) as u64;

        // Tombstones carry no value bytes
        if let Some(v) = value {
            self.writer.write_all(v)?;
            self.data_hasher.update(v);
            entry_size += v.len() as u64;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write index block, footer, and return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        // Record where index block starts
        let index_offset = self.current_offset;

        // Write index block: [key_len(4)][offset(8)][key] for each entry
        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        // Finalize CRC
        let data_crc = self.data_hasher.finalize();

        // Write footer: index_offset (8) + data_crc (4) + padding (4)
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;

        // Flush everything
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| BlinkError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        // Seek back and update entry count in header (after magic + version)
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size,
        })
    }
}
