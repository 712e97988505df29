//! Entry Index
//!
//! The metadata record of one entry and its one-line text form.

use std::fmt;

use crate::error::{Result, VarpackError};
use crate::pager::PageNumber;
use crate::value::ValueKind;

use super::{EntryKey, EntryKind};

/// Placeholder written in the name column of unnamed entries
const NO_NAME: &str = "-";

/// id, name, kind, value kind, load-immediate, read-only, page count
const FIXED_TOKENS: usize = 7;

/// Flag bits of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags {
    /// Load as soon as the package is opened
    pub load_immediate: bool,
    /// Reject value writes
    pub read_only: bool,
    /// Metadata changed since the index was last written (not persisted)
    pub modified: bool,
}

/// Metadata for one entry
///
/// The page list is owned exclusively by this index. Only the owning
/// [`Entry`](super::Entry) changes it, and only through the pager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIndex {
    key: EntryKey,
    kind: EntryKind,
    name: String,
    value_kind: ValueKind,
    flags: EntryFlags,
    pages: Vec<PageNumber>,
}

/// Check an entry name for `kind`, returning the name to store
///
/// Transient entries always get an empty name. Other kinds need a single
/// non-empty token.
pub fn validate_name(name: &str, kind: EntryKind) -> Result<String> {
    if kind == EntryKind::Transient {
        return Ok(String::new());
    }
    if name.is_empty() {
        return Err(VarpackError::InvalidName(format!(
            "{} entries must have a name",
            kind
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(VarpackError::InvalidName(format!(
            "'{}' contains whitespace",
            name
        )));
    }
    Ok(name.to_string())
}

impl EntryIndex {
    /// New index with no pages and no flags set
    pub fn new(key: EntryKey, kind: EntryKind, name: &str, value_kind: ValueKind) -> Result<Self> {
        Ok(Self {
            key,
            kind,
            name: validate_name(name, kind)?,
            value_kind,
            flags: EntryFlags::default(),
            pages: Vec::new(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Owned pages, in payload order
    pub fn pages(&self) -> &[PageNumber] {
        &self.pages
    }

    pub fn load_immediate(&self) -> bool {
        self.flags.load_immediate
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    pub fn is_modified(&self) -> bool {
        self.flags.modified
    }

    pub fn is_transient(&self) -> bool {
        self.kind == EntryKind::Transient
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    pub fn set_load_immediate(&mut self, value: bool) {
        self.flags.load_immediate = value;
        self.flags.modified = true;
    }

    pub fn set_read_only(&mut self, value: bool) {
        self.flags.read_only = value;
        self.flags.modified = true;
    }

    /// Rename. Fails for names that are invalid for this entry's kind.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.name = validate_name(name, self.kind)?;
        self.flags.modified = true;
        Ok(())
    }

    pub(crate) fn set_value_kind(&mut self, kind: ValueKind) {
        if self.value_kind != kind {
            self.value_kind = kind;
            self.flags.modified = true;
        }
    }

    pub(crate) fn pages_mut(&mut self) -> &mut Vec<PageNumber> {
        self.flags.modified = true;
        &mut self.pages
    }

    pub(crate) fn clear_modified(&mut self) {
        self.flags.modified = false;
    }

    // =========================================================================
    // Text Form
    // =========================================================================

    /// `id name kind value_kind load_immediate read_only page_count pages...`
    pub fn to_line(&self) -> String {
        let name = if self.name.is_empty() {
            NO_NAME
        } else {
            &self.name
        };

        let mut line = format!(
            "{} {} {} {} {} {} {}",
            self.key.entry_id,
            name,
            self.kind.tag(),
            self.value_kind.tag(),
            u8::from(self.flags.load_immediate),
            u8::from(self.flags.read_only),
            self.pages.len()
        );
        for page in &self.pages {
            line.push(' ');
            line.push_str(&page.to_string());
        }
        line
    }

    /// Parse one index line for the given package
    ///
    /// # Errors
    /// `Format` for missing or malformed tokens, or when the page count
    /// disagrees with the number of page tokens present.
    pub fn parse(line: &str, package_id: u64) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < FIXED_TOKENS {
            return Err(VarpackError::Format(format!(
                "index line has {} tokens, expected at least {}: '{}'",
                tokens.len(),
                FIXED_TOKENS,
                line
            )));
        }

        let entry_id: u64 = tokens[0]
            .parse()
            .map_err(|_| VarpackError::Format(format!("invalid entry id '{}'", tokens[0])))?;

        let kind = EntryKind::from_tag(tokens[2])
            .ok_or_else(|| VarpackError::Format(format!("unknown entry kind '{}'", tokens[2])))?;

        let name = match (kind, tokens[1]) {
            (EntryKind::Transient, NO_NAME) => String::new(),
            (EntryKind::Transient, other) => {
                return Err(VarpackError::Format(format!(
                    "transient entry {} has name '{}'",
                    entry_id, other
                )))
            }
            (_, name) => name.to_string(),
        };

        let value_kind = ValueKind::from_tag(tokens[3])
            .ok_or_else(|| VarpackError::Format(format!("unknown value kind '{}'", tokens[3])))?;

        let load_immediate = parse_flag(tokens[4], "load-immediate")?;
        let read_only = parse_flag(tokens[5], "read-only")?;

        let page_count: usize = tokens[6]
            .parse()
            .map_err(|_| VarpackError::Format(format!("invalid page count '{}'", tokens[6])))?;

        let page_tokens = &tokens[FIXED_TOKENS..];
        if page_tokens.len() != page_count {
            return Err(VarpackError::Format(format!(
                "entry {} declares {} pages but lists {}",
                entry_id,
                page_count,
                page_tokens.len()
            )));
        }

        let pages = page_tokens
            .iter()
            .map(|token| {
                token
                    .parse::<PageNumber>()
                    .map_err(|_| VarpackError::Format(format!("invalid page number '{}'", token)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            key: EntryKey::new(package_id, entry_id),
            kind,
            name,
            value_kind,
            flags: EntryFlags {
                load_immediate,
                read_only,
                modified: false,
            },
            pages,
        })
    }
}

impl fmt::Display for EntryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn parse_flag(token: &str, what: &str) -> Result<bool> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(VarpackError::Format(format!(
            "{} flag must be 0 or 1, got '{}'",
            what, other
        ))),
    }
}
