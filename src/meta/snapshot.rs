//! Metadata snapshot file
//!
//! ## File Format
//! ```text
//! ┌────────────┬─────────────┬──────────────┬───────────┐
//! │ Magic (4)  │ Version (2) │ Sequence (8) │ Count (8) │
//! ├────────────┴─────────────┴──────────────┴───────────┤
//! │ Count × [key_len u32][key][rec_len u32][record]     │
//! ├─────────────────────────────────────────────────────┤
//! │ CRC32 of everything above (4)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//! Integers are big-endian; records use the layout from `meta::codec`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{BlinkError, Result};

const MAGIC: &[u8; 4] = b"BKMS";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 4 + 2 + 8 + 8;
const FOOTER_SIZE: usize = 4;

/// Every metadata record as of action sequence `sequence`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaSnapshot {
    pub sequence: u64,
    /// `(cache key, encoded record)`, sorted by cache key
    pub records: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MetaSnapshot {
    pub fn new(sequence: u64, records: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self { sequence, records }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body: usize = self.records.iter().map(|(k, r)| 8 + k.len() + r.len()).sum();
        let mut buf = Vec::with_capacity(HEADER_SIZE + body + FOOTER_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16(VERSION);
        buf.put_u64(self.sequence);
        buf.put_u64(self.records.len() as u64);
        for (key, record) in &self.records {
            buf.put_u32(key.len() as u32);
            buf.put_slice(key);
            buf.put_u32(record.len() as u32);
            buf.put_slice(record);
        }
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        let corrupt = |msg: &str| BlinkError::Corruption(format!("snapshot: {msg}"));

        if raw.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt("file too small"));
        }
        let (content, mut footer) = raw.split_at(raw.len() - FOOTER_SIZE);
        if crc32fast::hash(content) != footer.get_u32() {
            return Err(corrupt("checksum mismatch"));
        }

        let mut buf = content;
        if &buf[..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        buf.advance(4);
        let version = buf.get_u16();
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let sequence = buf.get_u64();
        let count = buf.get_u64();

        let mut records = Vec::new();
        for _ in 0..count {
            let key = take_chunk(&mut buf).ok_or_else(|| corrupt("truncated key"))?;
            let record = take_chunk(&mut buf).ok_or_else(|| corrupt("truncated record"))?;
            records.push((key, record));
        }
        if buf.has_remaining() {
            return Err(corrupt("trailing bytes"));
        }

        Ok(Self { sequence, records })
    }

    /// Write atomically: temp file, fsync, rename
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("snapshot.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.encode())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        if let Some(parent) = path.parent() {
            // Persist the rename itself
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Load the snapshot at `path`, if one was ever written
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        Self::decode(&raw).map(Some)
    }
}

fn take_chunk(buf: &mut &[u8]) -> Option<Vec<u8>> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return None;
    }
    let chunk = buf[..len].to_vec();
    buf.advance(len);
    Some(chunk)
}
