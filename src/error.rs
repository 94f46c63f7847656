//! Error types for blinkkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BlinkError
pub type Result<T> = std::result::Result<T, BlinkError>;

/// Unified error type for blinkkv operations
#[derive(Debug, Error)]
pub enum BlinkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    /// Key absent from one SSTable; the search continues in older tables.
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // List / Set Metadata Errors
    // -------------------------------------------------------------------------
    #[error("Maximum element size limited: {limit}")]
    CapacityExceeded { limit: u64 },

    #[error("Maximum block size limited: {limit}")]
    TooManyBlocks { limit: u64 },

    #[error("index out of range")]
    IndexOutOfRange,

    #[error("no such key")]
    NotFound,

    #[error("metadata corruption: {0}")]
    Corruption(String),

    #[error("metadata is reloading")]
    Reloading,

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed request the command table rejects; the message is sent verbatim.
    #[error("{0}")]
    InvalidCommand(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BlinkError {
    fn from(err: bincode::Error) -> Self {
        BlinkError::Serialization(err.to_string())
    }
}
