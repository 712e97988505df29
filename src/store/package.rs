//! Package store
//!
//! The entry catalog of one package directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::entry::{validate_name, Entry, EntryIndex, EntryKey, EntryKind};
use crate::error::{Result, VarpackError};
use crate::pager::{Pager, SharedPager};
use crate::value::Value;

use super::header::{PackageHeader, Version};
use super::{HEADER_FILE, INDEX_FILE, PAGES_FILE, VAR_DIR};

/// Per-entry failures collected by the bulk operations
pub type EntryFailures = Vec<(EntryKey, VarpackError)>;

/// Catalog of entries persisted under one package directory
///
/// ## Persistence
/// - `add_entry` and `remove_entry` write the entry's pages and the index
///   file right away.
/// - Value changes made through an [`Entry`] are persisted by that entry's
///   `save()`. [`Store::save`] only writes the index and header.
/// - [`Store::close`] writes nothing.
///
/// ## Concurrency
/// All entries share the package pager as a [`SharedPager`]. Each entry
/// holds the lock for its whole bind → operate → reset sequence.
pub struct Store {
    /// Configuration used to open or create the package
    config: Config,

    /// Package directory
    root: PathBuf,

    /// Package id stamped into every entry key
    package_id: u64,

    header: PackageHeader,

    /// Header changed since it was last written
    header_dirty: bool,

    /// Pager over `var/pages`
    pager: SharedPager,

    /// Catalog in insertion order
    entries: Vec<Entry>,

    /// Next entry id to hand out
    next_id: u64,
}

impl Store {
    /// Open the package described by `config`, creating it if absent
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let root = config.package_dir();
        Self::open_or_create(root, config)
    }

    /// Open an existing package directory with the default configuration
    ///
    /// # Errors
    /// `MissingLayout` if `header`, `index` or `var/` is missing. `Format`
    /// for a damaged header or index line. `EntryLoad` if a load-immediate
    /// entry cannot be loaded.
    pub fn open_from_directory(path: impl AsRef<Path>, package_id: u64) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let mut builder = Config::builder().package_id(package_id);
        if let (Some(parent), Some(name)) = (root.parent(), root.file_name()) {
            builder = builder
                .data_dir(parent)
                .package_name(name.to_string_lossy());
        }
        Self::open_existing(root, builder.build())
    }

    /// Create `landing_dir/name` as a new package, or open it if it exists
    pub fn new_package(name: &str, landing_dir: impl AsRef<Path>, package_id: u64) -> Result<Self> {
        let config = Config::builder()
            .data_dir(landing_dir.as_ref())
            .package_name(name)
            .package_id(package_id)
            .build();
        Self::open(config)
    }

    fn open_or_create(root: PathBuf, config: Config) -> Result<Self> {
        let name = config.package_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(VarpackError::Config(format!(
                "invalid package name '{}'",
                name
            )));
        }

        if !root.join(HEADER_FILE).exists() {
            Self::create_layout(&root, &config)?;
        }
        Self::open_existing(root, config)
    }

    /// Write an empty package: header, empty index and `var/pages`
    fn create_layout(root: &Path, config: &Config) -> Result<()> {
        fs::create_dir_all(root.join(VAR_DIR))?;

        let header = PackageHeader::new(
            config.author.clone(),
            (config.unit_size, config.page_size),
        )?;
        write_atomic(&root.join(HEADER_FILE), &header.to_text())?;
        if !root.join(INDEX_FILE).exists() {
            write_atomic(&root.join(INDEX_FILE), "")?;
        }

        tracing::info!("Created package at {}", root.display());
        Ok(())
    }

    fn open_existing(root: PathBuf, mut config: Config) -> Result<Self> {
        // Step 1: Required layout
        let header_path = root.join(HEADER_FILE);
        let index_path = root.join(INDEX_FILE);
        let var_dir = root.join(VAR_DIR);
        for required in [&header_path, &index_path] {
            if !required.is_file() {
                return Err(VarpackError::MissingLayout(required.clone()));
            }
        }
        if !var_dir.is_dir() {
            return Err(VarpackError::MissingLayout(var_dir));
        }

        // Step 2: Header
        let mut header = PackageHeader::parse(&fs::read_to_string(&header_path)?)?;
        if header.version().major > Version::CURRENT.major {
            return Err(VarpackError::Format(format!(
                "package version {} is newer than supported {}",
                header.version(),
                Version::CURRENT
            )));
        }

        // The header geometry wins over the caller's configuration
        let mut header_dirty = false;
        match header.geometry() {
            Some((unit_size, page_size)) => {
                if (unit_size, page_size) != (config.unit_size, config.page_size) {
                    tracing::debug!(
                        "Using recorded geometry {}x{} for {}",
                        unit_size,
                        page_size,
                        root.display()
                    );
                }
                config.unit_size = unit_size;
                config.page_size = page_size;
            }
            None => {
                header.set_geometry((config.unit_size, config.page_size));
                header_dirty = true;
            }
        }

        // Step 3: Pager
        let pager = Pager::with_config(&var_dir.join(PAGES_FILE), &config)?.into_shared();

        // Step 4: Index
        let package_id = config.package_id;
        let mut entries: Vec<Entry> = Vec::new();
        let mut next_id = 0;
        for line in fs::read_to_string(&index_path)?.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let index = EntryIndex::parse(line, package_id)?;

            if let Some(existing) = entries.iter().find(|entry| {
                entry.key() == index.key() || (!index.is_transient() && entry.name() == index.name())
            }) {
                return Err(VarpackError::Duplicate(format!(
                    "index line '{}' collides with entry {} '{}'",
                    line,
                    existing.key(),
                    existing.name()
                )));
            }

            let entry_id = index.key().entry_id;
            let after = entry_id.checked_add(1).ok_or_else(|| {
                VarpackError::Format(format!("entry id {} leaves no room for new ids", entry_id))
            })?;
            pager.lock().claim(index.pages())?;
            next_id = next_id.max(after);
            entries.push(Entry::new(index, pager.clone()));
        }

        // Step 5: Eager loads
        for entry in entries.iter_mut().filter(|entry| entry.index().load_immediate()) {
            entry.load().map_err(|source| VarpackError::EntryLoad {
                name: entry.name().to_string(),
                source: Box::new(source),
            })?;
        }

        tracing::info!(
            "Opened package {} (id {}, {} entries, {} pages)",
            root.display(),
            package_id,
            entries.len(),
            pager.lock().page_count()
        );

        Ok(Self {
            config,
            root,
            package_id,
            header,
            header_dirty,
            pager,
            entries,
            next_id,
        })
    }

    // =========================================================================
    // Catalog Mutation
    // =========================================================================

    /// Hand out the next entry id. Strictly increasing for this store.
    ///
    /// # Errors
    /// `Format` once the id space is exhausted.
    pub fn next_id(&mut self) -> Result<u64> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| VarpackError::Format("entry ids exhausted".to_string()))?;
        Ok(id)
    }

    /// Add an entry holding `value`
    ///
    /// Non-transient entries are written to their pages and the index before
    /// this returns. Transient entries only live in memory.
    ///
    /// # Errors
    /// `ReadOnly` on a locked package, `InvalidName` or `Duplicate` for a bad
    /// name, pager errors if the value cannot be written.
    pub fn add_entry(&mut self, name: &str, kind: EntryKind, value: Value) -> Result<EntryKey> {
        self.check_unlocked()?;
        let name = validate_name(name, kind)?;
        if kind != EntryKind::Transient && self.position_by_name(&name).is_some() {
            return Err(VarpackError::Duplicate(format!("entry '{}' already exists", name)));
        }

        let key = EntryKey::new(self.package_id, self.next_id()?);
        let index = EntryIndex::new(key, kind, &name, value.kind())?;
        let mut entry = Entry::with_value(index, value, self.pager.clone());

        if kind == EntryKind::Transient {
            entry.save()?;
            self.entries.push(entry);
            tracing::debug!("Added transient entry {}", key);
            return Ok(key);
        }

        if let Err(e) = entry.save() {
            if let Err(release) = entry.release_pages() {
                tracing::warn!("Failed to release pages of unsaved entry {}: {}", key, release);
            }
            return Err(e);
        }

        self.entries.push(entry);
        if let Err(e) = self.write_index() {
            if let Some(mut entry) = self.entries.pop() {
                if let Err(release) = entry.release_pages() {
                    tracing::warn!("Failed to release pages of entry {}: {}", key, release);
                }
            }
            return Err(e);
        }

        tracing::debug!("Added {} entry '{}' as {}", kind, name, key);
        Ok(key)
    }

    /// Remove an entry and give its pages back to the pager
    pub fn remove_entry(&mut self, id: u64) -> Result<()> {
        self.check_unlocked()?;
        let pos = self.position(id)?;

        self.entries[pos].release_pages()?;
        let entry = self.entries.remove(pos);
        if !entry.index().is_transient() {
            self.write_index()?;
        }

        tracing::debug!("Removed entry {} '{}'", entry.key(), entry.name());
        Ok(())
    }

    /// Take an entry out of the catalog without touching its pages
    ///
    /// The pages stay occupied and owned by the returned handle.
    pub fn release_entry(&mut self, id: u64) -> Result<Entry> {
        self.check_unlocked()?;
        let pos = self.position(id)?;
        let entry = self.entries.remove(pos);
        tracing::debug!("Released entry {} '{}'", entry.key(), entry.name());
        Ok(entry)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, id: u64) -> Result<&Entry> {
        let pos = self.position(id)?;
        Ok(&self.entries[pos])
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut Entry> {
        let pos = self.position(id)?;
        Ok(&mut self.entries[pos])
    }

    /// Entry by name
    pub fn resolve(&self, name: &str) -> Result<&Entry> {
        let pos = self.position_for_name(name)?;
        Ok(&self.entries[pos])
    }

    pub fn resolve_mut(&mut self, name: &str) -> Result<&mut Entry> {
        let pos = self.position_for_name(name)?;
        Ok(&mut self.entries[pos])
    }

    /// Entry by full key; keys of other packages never match
    pub fn resolve_key(&self, key: EntryKey) -> Result<&Entry> {
        if key.package_id != self.package_id {
            return Err(VarpackError::NotFound(format!(
                "entry {} belongs to another package",
                key
            )));
        }
        self.get(key.entry_id)
    }

    pub fn key_of(&self, name: &str) -> Option<EntryKey> {
        self.position_by_name(name).map(|pos| self.entries[pos].key())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.key().entry_id == id)
    }

    // =========================================================================
    // Entry Conveniences
    // =========================================================================

    pub fn load_entry(&mut self, id: u64) -> Result<()> {
        self.get_mut(id)?.load()
    }

    pub fn unload_entry(&mut self, id: u64) -> Result<()> {
        self.get_mut(id)?.unload()
    }

    /// Wipe an entry's pages and unload it
    pub fn reset_entry(&mut self, id: u64) -> Result<()> {
        self.check_unlocked()?;
        self.get_mut(id)?.reset()
    }

    /// Value of an entry, loading it first if needed
    pub fn entry_value(&mut self, id: u64) -> Result<&Value> {
        let entry = self.get_mut(id)?;
        entry.load()?;
        entry.data()
    }

    /// Replace an entry's value and save it
    ///
    /// The index is rewritten when the save changed the entry's pages or
    /// value kind.
    pub fn set_entry_value(&mut self, id: u64, value: Value) -> Result<()> {
        self.check_unlocked()?;
        let entry = self.get_mut(id)?;
        entry.set_data(value)?;
        entry.save()?;
        if entry.index().is_modified() && !entry.index().is_transient() {
            self.write_index()?;
        }
        Ok(())
    }

    /// Load every entry; failures are collected, not fatal
    pub fn load_all(&mut self) -> EntryFailures {
        let failures: EntryFailures = self
            .entries
            .iter_mut()
            .filter_map(|entry| entry.load().err().map(|e| (entry.key(), e)))
            .collect();

        if !failures.is_empty() {
            tracing::warn!("{} entries failed to load", failures.len());
        }
        failures
    }

    /// Save every dirty entry; failures are collected, not fatal
    ///
    /// The index is rewritten afterwards if any saved entry changed its
    /// pages or value kind. An index write failure is reported under the
    /// key of the first such entry.
    ///
    /// # Errors
    /// `ReadOnly` on a locked package; nothing is saved.
    pub fn save_entries(&mut self) -> Result<EntryFailures> {
        self.check_unlocked()?;
        let mut failures: EntryFailures = self
            .entries
            .iter_mut()
            .filter(|entry| entry.is_dirty())
            .filter_map(|entry| entry.save().err().map(|e| (entry.key(), e)))
            .collect();

        let relocated = self
            .entries
            .iter()
            .find(|entry| entry.index().is_modified() && !entry.index().is_transient())
            .map(Entry::key);
        if let Some(key) = relocated {
            if let Err(e) = self.write_index() {
                failures.push((key, e));
            }
        }

        if !failures.is_empty() {
            tracing::warn!("{} entries failed to save", failures.len());
        }
        Ok(failures)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Sync the pager, then write the index and header
    ///
    /// Entry values are not saved here; see [`Store::save_entries`].
    pub fn save(&mut self) -> Result<()> {
        self.write_index()?;
        if self.header_dirty {
            write_atomic(&self.root.join(HEADER_FILE), &self.header.to_text())?;
            self.header_dirty = false;
        }

        tracing::info!("Saved package {}", self.root.display());
        Ok(())
    }

    /// Close the pager and drop the catalog without writing anything
    pub fn close(mut self) {
        self.entries.clear();
        self.pager.lock().close();
        tracing::info!("Closed package {}", self.root.display());
    }

    // =========================================================================
    // Header
    // =========================================================================

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn author(&self) -> Option<&str> {
        self.header.author()
    }

    /// Change the author; written by the next [`Store::save`]
    pub fn set_author(&mut self, author: Option<String>) -> Result<()> {
        self.header.set_author(author)?;
        self.header_dirty = true;
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.header.is_locked()
    }

    /// Lock or unlock the package; written by the next [`Store::save`]
    pub fn set_locked(&mut self, locked: bool) {
        self.header.set_locked(locked);
        self.header_dirty = true;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package directory name
    pub fn name(&self) -> &str {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    pub fn package_id(&self) -> u64 {
        self.package_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The package pager, shared with every entry
    pub fn pager(&self) -> &SharedPager {
        &self.pager
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn check_unlocked(&self) -> Result<()> {
        if self.header.is_locked() {
            return Err(VarpackError::ReadOnly(format!(
                "package {} is locked",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn position(&self, id: u64) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry.key().entry_id == id)
            .ok_or_else(|| VarpackError::NotFound(format!("entry id {}", id)))
    }

    fn position_by_name(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.entries.iter().position(|entry| entry.name() == name)
    }

    fn position_for_name(&self, name: &str) -> Result<usize> {
        self.position_by_name(name)
            .ok_or_else(|| VarpackError::NotFound(format!("entry '{}'", name)))
    }

    /// Sync the pager, then rewrite the index from the non-transient entries
    ///
    /// Page bytes reach the disk before any index line that points at them.
    fn write_index(&mut self) -> Result<()> {
        self.pager.lock().flush()?;

        let mut text = String::new();
        for entry in self.entries.iter().filter(|entry| !entry.index().is_transient()) {
            text.push_str(&entry.index().to_line());
            text.push('\n');
        }
        write_atomic(&self.root.join(INDEX_FILE), &text)?;

        for entry in &mut self.entries {
            entry.index_mut().clear_modified();
        }
        tracing::trace!("Wrote index for {} entries", self.entries.len());
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("package_id", &self.package_id)
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Write through a temporary file and rename over `path`
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
