//! Entry handle
//!
//! Joins an [`EntryIndex`] to an optional in-memory value and moves the
//! value between memory and the entry's pages.

use crate::error::{Result, VarpackError};
use crate::pager::{join_units, split_units, SharedPager};
use crate::value::Value;

use super::frame::{decode_frame, encode_frame};
use super::{EntryIndex, EntryKey, EntryKind};

/// Materialization state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Pages are authoritative, nothing in memory
    Unloaded,
    /// In memory and matching the pages
    Clean,
    /// In memory with unsaved changes
    Dirty,
}

/// Runtime handle of one stored variable
///
/// ## Persistence
/// Changing the value never writes to disk by itself; call [`Entry::save`].
/// Transient entries never touch the pager: saving one only marks it clean.
#[derive(Debug)]
pub struct Entry {
    index: EntryIndex,
    data: Option<Value>,
    dirty: bool,
    pager: SharedPager,
}

impl Entry {
    /// Handle for an indexed entry, starting unloaded
    pub fn new(index: EntryIndex, pager: SharedPager) -> Self {
        Self {
            index,
            data: None,
            dirty: false,
            pager,
        }
    }

    /// Handle holding a value that has not been saved yet
    pub fn with_value(index: EntryIndex, value: Value, pager: SharedPager) -> Self {
        Self {
            index,
            data: Some(value),
            dirty: true,
            pager,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Read the value from the entry's pages. No-op if already loaded.
    ///
    /// An entry without pages, or with wiped pages, loads as [`Value::Null`].
    ///
    /// # Errors
    /// Pager errors, `Checksum`/`Format` for a damaged payload, and `Format`
    /// if the payload kind disagrees with the index.
    pub fn load(&mut self) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        if self.index.pages().is_empty() {
            self.data = Some(Value::Null);
            self.dirty = false;
            return Ok(());
        }

        let bytes = {
            let mut pager = self.pager.lock();
            let result = pager
                .bind(self.index.pages())
                .and_then(|_| pager.read_all_units());
            pager.reset();
            join_units(&result?)
        };

        let payload = decode_frame(&bytes, self.key())?;
        let value = if payload.is_empty() {
            Value::Null
        } else {
            Value::decode(payload)?
        };

        if !value.is_null() && value.kind() != self.index.value_kind() {
            return Err(VarpackError::Format(format!(
                "entry {} is indexed as {} but stores {}",
                self.key(),
                self.index.value_kind(),
                value.kind()
            )));
        }

        tracing::trace!("Loaded entry {} ({})", self.key(), value.kind());
        self.data = Some(value);
        self.dirty = false;
        Ok(())
    }

    /// Drop the in-memory value
    ///
    /// Transient entries keep their value: memory is their only copy.
    ///
    /// # Errors
    /// `State` if the value has unsaved changes; save or [`Entry::discard`]
    /// first.
    pub fn unload(&mut self) -> Result<()> {
        if self.index.is_transient() {
            return Ok(());
        }
        if self.dirty {
            return Err(VarpackError::State(format!(
                "entry {} has unsaved changes",
                self.key()
            )));
        }
        self.data = None;
        Ok(())
    }

    /// Drop the in-memory value, unsaved changes included
    pub fn discard(&mut self) {
        self.data = None;
        self.dirty = false;
    }

    /// Unload and zero the entry's pages. The pages stay owned.
    pub fn reset(&mut self) -> Result<()> {
        self.check_writable()?;
        self.discard();

        if self.index.pages().is_empty() {
            return Ok(());
        }

        let mut pager = self.pager.lock();
        let result = pager
            .bind(self.index.pages())
            .and_then(|_| pager.wipe_all());
        pager.reset();

        tracing::debug!("Reset entry {}", self.key());
        result
    }

    /// Write the in-memory value to the entry's pages
    ///
    /// Grows the page list with freshly allocated pages or frees surplus
    /// tail pages so it fits the encoded value exactly.
    ///
    /// # Errors
    /// `NotLoaded` without a value in memory; pager errors otherwise. The
    /// entry stays dirty on failure.
    pub fn save(&mut self) -> Result<()> {
        let value = self
            .data
            .as_ref()
            .ok_or(VarpackError::NotLoaded(self.index.key()))?;

        if self.index.kind() == EntryKind::Transient {
            self.dirty = false;
            return Ok(());
        }

        let kind = value.kind();
        let frame = encode_frame(&value.encode());

        let mut pager = self.pager.lock();
        pager.reset();

        let units = split_units(&frame, pager.unit_size());
        let needed = units.len().div_ceil(pager.page_size());
        let have = self.index.pages().len();

        if needed > have {
            let extra = pager.allocate(needed - have)?;
            self.index.pages_mut().extend(extra);
        } else if needed < have {
            let surplus = self.index.pages()[needed..].to_vec();
            pager.free(&surplus)?;
            self.index.pages_mut().truncate(needed);
        }

        let result = pager
            .bind(self.index.pages())
            .and_then(|_| pager.write_units(&units));
        pager.reset();
        result?;

        self.index.set_value_kind(kind);
        self.dirty = false;

        tracing::trace!(
            "Saved entry {} ({} bytes over {} pages)",
            self.index.key(),
            frame.len(),
            self.index.pages().len()
        );
        Ok(())
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// The loaded value
    ///
    /// # Errors
    /// `NotLoaded` while unloaded.
    pub fn data(&self) -> Result<&Value> {
        self.data.as_ref().ok_or(VarpackError::NotLoaded(self.key()))
    }

    /// Mutable access to the loaded value; marks the entry dirty
    pub fn data_mut(&mut self) -> Result<&mut Value> {
        self.check_writable()?;
        let key = self.key();
        let value = self.data.as_mut().ok_or(VarpackError::NotLoaded(key))?;
        self.dirty = true;
        Ok(value)
    }

    /// Replace the value in memory; marks the entry dirty
    pub fn set_data(&mut self, value: Value) -> Result<()> {
        self.check_writable()?;
        self.data = Some(value);
        self.dirty = true;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> EntryState {
        match (&self.data, self.dirty) {
            (None, _) => EntryState::Unloaded,
            (Some(_), false) => EntryState::Clean,
            (Some(_), true) => EntryState::Dirty,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn key(&self) -> EntryKey {
        self.index.key()
    }

    pub fn name(&self) -> &str {
        self.index.name()
    }

    pub fn kind(&self) -> EntryKind {
        self.index.kind()
    }

    pub fn index(&self) -> &EntryIndex {
        &self.index
    }

    /// Flag and name changes; the page list stays private to the entry
    pub fn index_mut(&mut self) -> &mut EntryIndex {
        &mut self.index
    }

    // =========================================================================
    // Crate Helpers
    // =========================================================================

    /// Give the entry's pages back to the pager's free set
    pub(crate) fn release_pages(&mut self) -> Result<()> {
        if self.index.pages().is_empty() {
            return Ok(());
        }
        let mut pager = self.pager.lock();
        pager.reset();
        pager.free(self.index.pages())?;
        self.index.pages_mut().clear();
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.index.is_read_only() {
            return Err(VarpackError::ReadOnly(format!(
                "entry {} is read-only",
                self.key()
            )));
        }
        Ok(())
    }
}
