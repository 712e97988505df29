//! # varpack
//!
//! Paged persistent storage for calculator variables:
//! - One directory per package with a text header and index
//! - Entry payloads stored in fixed-size pages of one backing file
//! - Lazy load, explicit save, per-entry failure reporting
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │            (header, index, entry catalog, ids)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ owns
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Entry                               │
//! │          (EntryIndex + optional in-memory Value)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bind → read/write → reset
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ SharedPager │          │ Value codec │
//!   │   (Mutex)   │          │ (SCA / VEC) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  var/pages  │
//!   │   (Units)   │
//!   └─────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use varpack::{EntryKind, Store, Value};
//!
//! let mut store = Store::new_package("usr", "./data", 0)?;
//! let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(3.4))?;
//! store.close();
//!
//! let mut store = Store::open_from_directory("./data/usr", 0)?;
//! assert_eq!(store.entry_value(key.entry_id)?, &Value::Scalar(3.4));
//! # Ok::<(), varpack::VarpackError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod pager;
pub mod value;
pub mod entry;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{VarpackError, Result};
pub use config::Config;
pub use entry::{Entry, EntryIndex, EntryKey, EntryKind, EntryState};
pub use pager::{Pager, SharedPager, Unit};
pub use store::{PackageHeader, Store, Version};
pub use value::{Matrix, Value, ValueKind};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of varpack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
