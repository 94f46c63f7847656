//! # blinkkv
//!
//! A Redis-compatible list and set server synthesized on top of an embedded
//! key-value engine:
//! - Durable lists built from block-pointer metadata over flat key/value records
//! - Sets with cached cardinality
//! - Write-Ahead Logging (WAL) for every keyspace
//! - Metadata action log with snapshot compaction
//! - RESP (inline and multibulk) over TCP
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TCP Server (thread per client)              │
//! │                 RESP parser / command table                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │       record lock → staged metadata → storage → commit      │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │  Metadata Cache │──── actions ──▶│  meta.aof       │
//!   │  (sharded)      │                │  meta.snapshot  │
//!   └─────────────────┘                └─────────────────┘
//!            │
//!            ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │  Keyspaces: scalar / list / set                     │
//!   │  WAL → MemTable → SSTables                          │
//!   └─────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod meta;
pub mod engine;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlinkError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blinkkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
