//! Pager Module
//!
//! Paged binary storage over one backing file.
//!
//! ## Responsibilities
//! - Grow the file append-only, one zero-filled page at a time
//! - Track which page numbers are occupied
//! - Sequential unit-level read/write through one bound cursor
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────┬──────────────────────┬─────┐
//! │ Page 0               │ Page 1               │ ... │
//! │ ┌──────┬──────┬────┐ │ ┌──────┬──────┬────┐ │     │
//! │ │Unit 0│Unit 1│ .. │ │ │Unit 0│Unit 1│ .. │ │     │
//! │ └──────┴──────┴────┘ │ └──────┴──────┴────┘ │     │
//! └──────────────────────┴──────────────────────┴─────┘
//! offset(page, unit) = ((page * page_size) + unit) * unit_size
//! ```
//!
//! A bound page list need not be contiguous: the cursor walks the list in
//! order and hops to the next listed page after the last unit of a page.

mod cursor;
mod file;
mod unit;

use std::sync::Arc;

use parking_lot::Mutex;

pub use file::Pager;
pub use unit::{join_units, split_units, Primitive, Unit};

/// Index of a page within the backing file
pub type PageNumber = u32;

/// Pager shared by a store and its entries
///
/// Holding the lock across bind → operate → reset keeps one entry's cursor
/// work from interleaving with another's.
pub type SharedPager = Arc<Mutex<Pager>>;
