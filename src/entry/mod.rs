//! Entry Module
//!
//! Per-variable metadata and the runtime handle that materializes a value
//! from its pages.
//!
//! ## Entry States
//! ```text
//!            load                 set_data / data_mut
//! Unloaded ───────▶ Loaded-Clean ─────────────────────▶ Loaded-Dirty
//!    ▲                 │    ▲                               │
//!    │     unload      │    └────────────save───────────────┘
//!    └─────────────────┘
//! reset: any state ──▶ Unloaded (pages wiped)
//! ```
//!
//! ## Page Payload
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┬──────────────┐
//! │ Len (u32 LE) │ CRC (u32 LE) │ Value text (Len)    │ zero padding │
//! └──────────────┴──────────────┴─────────────────────┴──────────────┘
//! ```

mod frame;
mod handle;
mod index;

use std::fmt;

pub use handle::{Entry, EntryState};
pub use index::{validate_name, EntryFlags, EntryIndex};

/// `(package id, entry id)`, fixed once assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub package_id: u64,
    pub entry_id: u64,
}

impl EntryKey {
    pub fn new(package_id: u64, entry_id: u64) -> Self {
        Self {
            package_id,
            entry_id,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package_id, self.entry_id)
    }
}

/// What an entry is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Named, persisted variable
    Variable,
    /// Named, persisted environment binding
    Environment,
    /// Unnamed, in-memory only
    Transient,
}

impl EntryKind {
    /// Tag used in index lines
    pub fn tag(self) -> &'static str {
        match self {
            EntryKind::Variable => "var",
            EntryKind::Environment => "env",
            EntryKind::Transient => "tmp",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "var" => Some(EntryKind::Variable),
            "env" => Some(EntryKind::Environment),
            "tmp" => Some(EntryKind::Transient),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
