//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{BlinkError, Result};
use crate::memtable::MemTableEntry;

use super::iterator::SSTableIterator;
use super::{
    decode_entry_header, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER,
    VERSION,
};

/// Reader for SSTable files with in-memory index for O(log n) lookups
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    pub(super) file: BufReader<File>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    /// Index block starting offset (end of the data block)
    pub(super) index_offset: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Verifies the data checksum and loads the entire index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(BlinkError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(BlinkError::Storage(format!(
                "Invalid SSTable magic: expected BLKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(BlinkError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&header[6..14]);
        let entry_count = u64::from_le_bytes(count);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let mut offset = [0u8; 8];
        offset.copy_from_slice(&footer[0..8]);
        let index_offset = u64::from_le_bytes(offset);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(BlinkError::Storage(format!(
                "SSTable {} has invalid index offset {}",
                path.display(),
                index_offset
            )));
        }

        // Verify the data block before trusting any offsets
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let take = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..take])?;
            hasher.update(&chunk[..take]);
            remaining -= take as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(BlinkError::Storage(format!(
                "SSTable {} data checksum mismatch",
                path.display()
            )));
        }

        // Index block size = file_size - footer_size - index_offset
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;

        // Parse index entries: [key_len(4)][offset(8)][key]
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos + 12 <= index_data.len() {
            let key_len = u32::from_le_bytes([
                index_data[pos],
                index_data[pos + 1],
                index_data[pos + 2],
                index_data[pos + 3],
            ]) as usize;
            let mut off = [0u8; 8];
            off.copy_from_slice(&index_data[pos + 4..pos + 12]);
            pos += 12;

            if pos + key_len > index_data.len() {
                break;
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), u64::from_le_bytes(off));
            pos += key_len;
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            index,
            entry_count,
            index_offset,
        })
    }

    /// Get the entry stored for a key, O(log n) via the in-memory index
    ///
    /// Returns:
    /// - `Ok(entry)`: key found (value or tombstone)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&mut self, key: &[u8]) -> Result<MemTableEntry> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Err(BlinkError::KeyNotFound),
        };

        self.file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; ENTRY_HEADER_SIZE];
        self.file.read_exact(&mut header)?;
        let (key_len, val_len, expire_at) = decode_entry_header(&header);

        // Skip the key (we already know it matches)
        self.file.seek(SeekFrom::Current(key_len as i64))?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(MemTableEntry::Tombstone);
        }

        let mut value = vec![0u8; val_len as usize];
        self.file.read_exact(&mut value)?;

        Ok(MemTableEntry::Value { value, expire_at })
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// True if some key in this SSTable starts with `prefix`
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.index
            .range::<[u8], _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .next()
            .map(|(k, _)| k.starts_with(prefix))
            .unwrap_or(false)
    }

    /// Create an iterator over all entries (for prefix scans, debugging)
    pub fn iter(&mut self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, self.index_offset)
    }
}
