//! Pager
//!
//! Page allocation and cursor I/O over a single backing file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, VarpackError};

use super::cursor::Binding;
use super::{PageNumber, SharedPager, Unit};

/// Turns one file into an append-only sequence of fixed-size pages
///
/// ## Addressing
/// Unit `u` of page `p` lives at byte offset
/// `((p * page_size) + u) * unit_size`. Pages are never relocated.
///
/// ## Binding
/// Reads and writes go through a single cursor bound to an ordered page
/// list with [`Pager::bind`]. Every operation seeks and reads/writes exactly
/// one unit; nothing is cached. An I/O failure while bound drops the
/// binding, so later calls fail until the caller binds again.
pub struct Pager {
    /// Backing file path
    path: PathBuf,
    /// Open handle, `None` once closed
    file: Option<File>,
    /// Bytes per unit
    unit_size: usize,
    /// Units per page
    page_size: usize,
    /// Number of pages in the file
    page_count: u32,
    /// page number -> occupied
    occupancy: BTreeMap<PageNumber, bool>,
    /// Active cursor binding
    binding: Option<Binding>,
}

impl Pager {
    /// Open (or create) a paged file
    ///
    /// Pages already in the file start out free; owners re-register them
    /// with [`Pager::claim`].
    ///
    /// # Errors
    /// Fails when the geometry is invalid, the file cannot be opened, or its
    /// length is not a whole number of pages.
    pub fn open(path: &Path, unit_size: usize, page_size: usize) -> Result<Self> {
        Config {
            unit_size,
            page_size,
            ..Config::default()
        }
        .validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let page_bytes = (unit_size * page_size) as u64;
        let file_size = file.metadata()?.len();
        if file_size % page_bytes != 0 {
            return Err(VarpackError::Format(format!(
                "{} is {} bytes, not a multiple of the {} byte page size",
                path.display(),
                file_size,
                page_bytes
            )));
        }

        let pages = file_size / page_bytes;
        let page_count = u32::try_from(pages).map_err(|_| {
            VarpackError::Format(format!("{} holds too many pages ({})", path.display(), pages))
        })?;

        let occupancy = (0..page_count).map(|page| (page, false)).collect();

        tracing::debug!(
            "Opened pager {} ({} pages, {} units x {} bytes)",
            path.display(),
            page_count,
            page_size,
            unit_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            unit_size,
            page_size,
            page_count,
            occupancy,
            binding: None,
        })
    }

    /// Open using the geometry from a config
    pub fn with_config(path: &Path, config: &Config) -> Result<Self> {
        Self::open(path, config.unit_size, config.page_size)
    }

    /// Wrap the pager for sharing between a store and its entries
    pub fn into_shared(self) -> SharedPager {
        Arc::new(Mutex::new(self))
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Append `count` zero-filled pages to the end of the file
    ///
    /// Returns the new page numbers in allocation order, already marked
    /// occupied.
    ///
    /// # Errors
    /// `State` while a binding is active or after close; `Io` if the file
    /// cannot be extended (the file is truncated back to its old length).
    pub fn allocate(&mut self, count: usize) -> Result<Vec<PageNumber>> {
        if self.binding.is_some() {
            return Err(VarpackError::State(
                "cannot allocate while the pager is bound".to_string(),
            ));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let first = self.page_count;
        let last = u32::try_from(count)
            .ok()
            .and_then(|count| first.checked_add(count))
            .ok_or_else(|| {
                VarpackError::Bounds(format!("cannot allocate {} pages past page {}", count, first))
            })?;

        let page_bytes = self.page_bytes();
        let old_len = first as u64 * page_bytes as u64;
        let file = self.file_mut()?;

        let zeros = vec![0u8; page_bytes];
        let extended = (|| -> std::io::Result<()> {
            file.seek(SeekFrom::Start(old_len))?;
            for _ in 0..count {
                file.write_all(&zeros)?;
            }
            file.flush()
        })();

        if let Err(e) = extended {
            // Best effort: drop the partially written tail
            let _ = file.set_len(old_len);
            tracing::warn!("Failed to extend {} by {} pages: {}", self.path.display(), count, e);
            return Err(VarpackError::Io(e));
        }

        let pages: Vec<PageNumber> = (first..last).collect();
        for &page in &pages {
            self.occupancy.insert(page, true);
        }
        self.page_count = last;

        tracing::trace!("Allocated pages {:?}", pages);
        Ok(pages)
    }

    /// Return pages to the free set. Their bytes stay in the file.
    ///
    /// # Errors
    /// `State` while bound; `Bounds` if any page is unknown or already free.
    /// Nothing is freed unless every page is valid.
    pub fn free(&mut self, pages: &[PageNumber]) -> Result<()> {
        if self.binding.is_some() {
            return Err(VarpackError::State(
                "cannot free pages while the pager is bound".to_string(),
            ));
        }
        for &page in pages {
            if self.occupancy.get(&page) != Some(&true) {
                return Err(VarpackError::Bounds(format!(
                    "page {} is not allocated",
                    page
                )));
            }
        }
        for &page in pages {
            self.occupancy.insert(page, false);
        }
        tracing::trace!("Freed pages {:?}", pages);
        Ok(())
    }

    /// Mark existing pages as occupied by a reopened owner
    ///
    /// # Errors
    /// `Bounds` for pages past the end of the file, `Duplicate` for pages
    /// that are already owned (including repeats within `pages`).
    pub fn claim(&mut self, pages: &[PageNumber]) -> Result<()> {
        for (i, &page) in pages.iter().enumerate() {
            match self.occupancy.get(&page) {
                None => {
                    return Err(VarpackError::Bounds(format!(
                        "page {} is past the end of {} ({} pages)",
                        page,
                        self.path.display(),
                        self.page_count
                    )))
                }
                Some(true) => {
                    return Err(VarpackError::Duplicate(format!(
                        "page {} is already owned",
                        page
                    )))
                }
                Some(false) if pages[..i].contains(&page) => {
                    return Err(VarpackError::Duplicate(format!(
                        "page {} is listed twice",
                        page
                    )))
                }
                Some(false) => {}
            }
        }
        for &page in pages {
            self.occupancy.insert(page, true);
        }
        Ok(())
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind the cursor to an ordered page list, positioned at unit 0
    ///
    /// Any previous binding is cleared first.
    ///
    /// # Errors
    /// `State` after close or if a page is free; `Bounds` for pages past the
    /// end of the file.
    pub fn bind(&mut self, pages: &[PageNumber]) -> Result<()> {
        self.reset();
        self.file_mut()?;

        for &page in pages {
            match self.occupancy.get(&page) {
                None => {
                    return Err(VarpackError::Bounds(format!(
                        "cannot bind page {}: file has {} pages",
                        page, self.page_count
                    )))
                }
                Some(false) => {
                    return Err(VarpackError::State(format!(
                        "cannot bind page {}: page is not allocated",
                        page
                    )))
                }
                Some(true) => {}
            }
        }

        self.binding = Some(Binding::new(pages.to_vec()));
        Ok(())
    }

    /// Release the binding. The occupancy table is kept.
    pub fn reset(&mut self) {
        self.binding = None;
    }

    /// Alias of [`Pager::reset`]
    pub fn unbind(&mut self) {
        self.reset();
    }

    /// Release the binding and close the file
    pub fn close(&mut self) {
        self.reset();
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                tracing::warn!("Failed to sync {} on close: {}", self.path.display(), e);
            }
            tracing::debug!("Closed pager {}", self.path.display());
        }
        self.occupancy.clear();
        self.page_count = 0;
    }

    /// fsync the backing file
    pub fn flush(&mut self) -> Result<()> {
        self.file_mut()?.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Cursor I/O
    // =========================================================================

    /// Read the unit under the cursor and advance
    ///
    /// # Errors
    /// `State` when unbound or at end of stream; `Io` on read failure, which
    /// also drops the binding.
    pub fn read_unit(&mut self) -> Result<Unit> {
        let (page, unit) = self.current_position()?;
        let mut buf = vec![0u8; self.unit_size];
        let offset = self.unit_offset(page, unit);

        let result = self.file_mut().and_then(|file| {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
            Ok(())
        });
        self.check_stale(result)?;

        self.advance();
        Ok(Unit::from_vec(buf))
    }

    /// Read exactly `count` units from the cursor
    ///
    /// # Errors
    /// `Bounds` if fewer than `count` units remain (nothing is read).
    pub fn read_units(&mut self, count: usize) -> Result<Vec<Unit>> {
        let remaining = self.remaining()?;
        if count > remaining {
            return Err(VarpackError::Bounds(format!(
                "requested {} units, only {} remain in the binding",
                count, remaining
            )));
        }
        (0..count).map(|_| self.read_unit()).collect()
    }

    /// Read every unit of every bound page, in list order
    ///
    /// Rewinds to the start of the binding first; the cursor ends parked at
    /// end of stream.
    pub fn read_all_units(&mut self) -> Result<Vec<Unit>> {
        if self.binding_ref()?.total_units(self.page_size) == 0 {
            return Ok(Vec::new());
        }
        self.current_position()?;
        self.seek(0)?;
        let total = self.remaining()?;
        self.read_units(total)
    }

    /// Write consecutive units from the cursor, hopping pages as needed
    ///
    /// # Errors
    /// `Bounds` if a unit has the wrong width or the bound list cannot hold
    /// all units (checked before anything is written); `State` when unbound;
    /// `Io` on write failure, which can leave a partial write behind.
    pub fn write_units(&mut self, units: &[Unit]) -> Result<()> {
        if let Some(bad) = units.iter().find(|u| u.len() != self.unit_size) {
            return Err(VarpackError::Bounds(format!(
                "unit of {} bytes written to a pager with {} byte units",
                bad.len(),
                self.unit_size
            )));
        }
        if units.is_empty() {
            self.binding_ref()?;
            return Ok(());
        }

        let remaining = self.remaining()?;
        if units.len() > remaining {
            return Err(VarpackError::Bounds(format!(
                "{} units do not fit in the {} units left in the binding",
                units.len(),
                remaining
            )));
        }

        for unit in units {
            self.write_one(unit.as_bytes())?;
        }
        Ok(())
    }

    /// Zero every unit of every bound page. The cursor is rewound to unit 0.
    pub fn wipe_all(&mut self) -> Result<()> {
        self.current_position()?;
        self.seek(0)?;
        let zeros = vec![0u8; self.unit_size];
        while !self.is_end() {
            self.write_one(&zeros)?;
        }
        self.seek(0)?;
        Ok(())
    }

    /// Move the cursor to a unit offset relative to the start of the binding
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        let page_size = self.page_size;
        let binding = self.binding_mut()?;
        if !binding.seek(offset, page_size) {
            return Err(VarpackError::Bounds(format!(
                "offset {} is past the {} units of the binding",
                offset,
                binding.total_units(page_size)
            )));
        }
        Ok(())
    }

    /// Unit offset of the cursor relative to the start of the binding
    pub fn position(&self) -> Result<usize> {
        Ok(self.binding_ref()?.offset(self.page_size))
    }

    /// `(page number, unit within page)` under the cursor
    pub fn absolute_position(&self) -> Result<(PageNumber, usize)> {
        self.current_position()
    }

    /// True when unbound or the cursor has passed the last bound unit
    pub fn is_end(&self) -> bool {
        self.binding.as_ref().map_or(true, Binding::at_end)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Pages of the active binding
    pub fn bound_pages(&self) -> Option<&[PageNumber]> {
        self.binding.as_ref().map(Binding::pages)
    }

    // =========================================================================
    // Occupancy
    // =========================================================================

    /// True if a free page sits before the last occupied page
    pub fn is_fragmented(&self) -> bool {
        let last_used = match self
            .occupancy
            .iter()
            .rev()
            .find(|&(_, &occupied)| occupied)
        {
            Some((&page, _)) => page,
            None => return false,
        };
        self.occupancy
            .range(..last_used)
            .any(|(_, &occupied)| !occupied)
    }

    /// True if `pages` is not a run of consecutive ascending page numbers
    pub fn is_list_fragmented(pages: &[PageNumber]) -> bool {
        pages.windows(2).any(|w| w[1] != w[0].wrapping_add(1))
    }

    pub fn is_occupied(&self, page: PageNumber) -> bool {
        self.occupancy.get(&page).copied().unwrap_or(false)
    }

    pub fn occupied_pages(&self) -> Vec<PageNumber> {
        self.pages_where(true)
    }

    pub fn free_pages(&self) -> Vec<PageNumber> {
        self.pages_where(false)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Units per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_bytes(&self) -> usize {
        self.unit_size * self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| VarpackError::State("pager is closed".to_string()))
    }

    fn binding_ref(&self) -> Result<&Binding> {
        self.binding
            .as_ref()
            .ok_or_else(|| VarpackError::State("pager is not bound".to_string()))
    }

    fn binding_mut(&mut self) -> Result<&mut Binding> {
        self.binding
            .as_mut()
            .ok_or_else(|| VarpackError::State("pager is not bound".to_string()))
    }

    fn current_position(&self) -> Result<(PageNumber, usize)> {
        self.binding_ref()?
            .current()
            .ok_or_else(|| VarpackError::State("end of stream".to_string()))
    }

    fn remaining(&self) -> Result<usize> {
        Ok(self.binding_ref()?.remaining(self.page_size))
    }

    fn advance(&mut self) {
        let page_size = self.page_size;
        if let Some(binding) = self.binding.as_mut() {
            binding.advance(page_size);
        }
    }

    fn unit_offset(&self, page: PageNumber, unit: usize) -> u64 {
        ((page as u64 * self.page_size as u64) + unit as u64) * self.unit_size as u64
    }

    /// Write one unit-sized buffer at the cursor and advance
    fn write_one(&mut self, bytes: &[u8]) -> Result<()> {
        let (page, unit) = self.current_position()?;
        let offset = self.unit_offset(page, unit);

        let result = self.file_mut().and_then(|file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
            Ok(())
        });
        self.check_stale(result)?;

        self.advance();
        Ok(())
    }

    /// Drop the binding when the file rejects a seek/read/write
    fn check_stale(&mut self, result: Result<()>) -> Result<()> {
        if let Err(e) = result {
            if matches!(e, VarpackError::Io(_)) {
                tracing::warn!(
                    "I/O failure on {}, dropping stale binding: {}",
                    self.path.display(),
                    e
                );
                self.reset();
            }
            return Err(e);
        }
        Ok(())
    }

    fn pages_where(&self, occupied: bool) -> Vec<PageNumber> {
        self.occupancy
            .iter()
            .filter(|&(_, &o)| o == occupied)
            .map(|(&page, _)| page)
            .collect()
    }
}

impl std::fmt::Debug for Pager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .field("unit_size", &self.unit_size)
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}
