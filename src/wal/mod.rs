//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging. The same
//! framing carries keyspace write batches and metadata action batches.
//!
//! ## Responsibilities
//! - Append log entries before any mutation
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode encoding of `(timestamp, operation)`; the CRC covers
//! the LSN, the length and the data.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{Operation, WalEntry, WriteBatch, HEADER_SIZE, MAX_ENTRY_SIZE};
pub(crate) use entry::now_millis;
pub use writer::WalWriter;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
