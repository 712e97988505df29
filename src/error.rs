//! Error types for varpack
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::entry::EntryKey;

/// Result type alias using VarpackError
pub type Result<T> = std::result::Result<T, VarpackError>;

/// Unified error type for varpack operations
#[derive(Debug, Error)]
pub enum VarpackError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    #[error("Checksum mismatch for entry {key}: expected {expected:#010x}, got {actual:#010x}")]
    Checksum {
        key: EntryKey,
        expected: u32,
        actual: u32,
    },

    // -------------------------------------------------------------------------
    // Pager Errors
    // -------------------------------------------------------------------------
    #[error("Out of bounds: {0}")]
    Bounds(String),

    #[error("Invalid state: {0}")]
    State(String),

    // -------------------------------------------------------------------------
    // Entry Errors
    // -------------------------------------------------------------------------
    #[error("Entry {0} is not loaded")]
    NotLoaded(EntryKey),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    #[error("Failed to load entry '{name}': {source}")]
    EntryLoad {
        name: String,
        #[source]
        source: Box<VarpackError>,
    },

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid entry name: {0}")]
    InvalidName(String),

    #[error("Package layout incomplete, missing {}", .0.display())]
    MissingLayout(PathBuf),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
