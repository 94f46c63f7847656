//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BlinkError, Result};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry body; anything larger is treated as corruption
pub const MAX_ENTRY_SIZE: u32 = 1024 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry<T> {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: T,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Keyspace mutations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair; `expire_at` is unix millis, 0 = never
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        expire_at: u64,
    },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// Operations applied atomically by one keyspace write
pub type WriteBatch = Vec<Operation>;

/// Current wall clock in unix millis
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Checksum over the header fields and the body
pub(crate) fn frame_crc(lsn: u64, len: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// Split a frame header into (lsn, crc, len)
pub(crate) fn decode_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&header[0..8]);
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&header[8..12]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[12..16]);
    (
        u64::from_le_bytes(lsn),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    )
}

impl<T> WalEntry<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: T) -> Self {
        Self {
            lsn,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Encode the entry as a complete frame
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&(self.timestamp, &self.operation))?;
        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(BlinkError::Serialization(format!(
                "WAL entry too large: {} bytes",
                data.len()
            )));
        }
        let len = data.len() as u32;
        let crc = frame_crc(self.lsn, len, &data);

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Decode a complete frame, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BlinkError::WalCorruption(format!(
                "frame shorter than header: {} bytes",
                bytes.len()
            )));
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let (lsn, crc, len) = decode_header(&header);

        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(BlinkError::WalCorruption(format!(
                "incomplete frame: expected {} bytes, got {}",
                end,
                bytes.len()
            )));
        }

        Self::from_body(lsn, crc, &bytes[HEADER_SIZE..end])
    }

    /// Verify and decode a frame body
    pub(crate) fn from_body(lsn: u64, crc: u32, data: &[u8]) -> Result<Self> {
        let actual = frame_crc(lsn, data.len() as u32, data);
        if actual != crc {
            return Err(BlinkError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let (timestamp, operation): (u64, T) = bincode::deserialize(data)
            .map_err(|e| BlinkError::WalCorruption(format!("undecodable entry {}: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            operation,
            timestamp,
        })
    }
}
