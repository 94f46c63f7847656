//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BlinkError, Result};

use super::entry::decode_header;
use super::{WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};

/// Outcome of reading one frame
pub(super) enum Frame<T> {
    /// A verified entry
    Entry(WalEntry<T>),
    /// A complete frame whose checksum or body is bad; already skipped
    Corrupt { lsn: u64, reason: String },
    /// The file ends inside a frame starting at `offset`
    Torn { offset: u64 },
    /// Clean end of file
    End,
}

/// Reads entries from the WAL file
pub struct WalReader<T> {
    file: BufReader<File>,
    position: u64,
    _marker: PhantomData<T>,
}

impl<T> WalReader<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            position: 0,
            _marker: PhantomData,
        })
    }

    /// Byte offset of the next frame
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next entry from the WAL
    ///
    /// Torn or corrupted frames surface as `WalCorruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry<T>>> {
        match self.next_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::End => Ok(None),
            Frame::Corrupt { lsn, reason } => Err(BlinkError::WalCorruption(format!(
                "entry {}: {}",
                lsn, reason
            ))),
            Frame::Torn { offset } => Err(BlinkError::WalCorruption(format!(
                "partial entry at offset {}",
                offset
            ))),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator<T> {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame<T>> {
        let start = self.position;
        let mut header = [0u8; HEADER_SIZE];

        match read_full(&mut self.file, &mut header)? {
            0 => return Ok(Frame::End),
            n if n < HEADER_SIZE => return Ok(Frame::Torn { offset: start }),
            _ => {}
        }

        let (lsn, crc, len) = decode_header(&header);
        if len > MAX_ENTRY_SIZE {
            // A length this large cannot be trusted to find the next frame
            return Ok(Frame::Torn { offset: start });
        }

        let mut data = vec![0u8; len as usize];
        if read_full(&mut self.file, &mut data)? < data.len() {
            return Ok(Frame::Torn { offset: start });
        }
        self.position = start + HEADER_SIZE as u64 + len as u64;

        match WalEntry::from_body(lsn, crc, &data) {
            Ok(entry) => Ok(Frame::Entry(entry)),
            Err(e) => Ok(Frame::Corrupt {
                lsn,
                reason: e.to_string(),
            }),
        }
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator<T> {
    reader: WalReader<T>,
    done: bool,
}

impl<T> Iterator for WalIterator<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = Result<WalEntry<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
