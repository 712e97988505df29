//! Tests for Store
//!
//! These tests verify:
//! - Package layout creation and reopening
//! - Entry add/remove/release and id assignment
//! - Lookup by id, name and key
//! - Header and index persistence
//! - Locked packages and load-immediate failures

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use varpack::entry::{EntryKey, EntryKind, EntryState};
use varpack::store::{PackageHeader, Store, Version};
use varpack::value::Value;
use varpack::{Config, VarpackError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::new_package("usr", temp_dir.path(), 0).unwrap();
    (temp_dir, store)
}

fn reopen(temp_dir: &TempDir) -> Store {
    Store::open_from_directory(temp_dir.path().join("usr"), 0).unwrap()
}

fn read_index(temp_dir: &TempDir) -> String {
    fs::read_to_string(temp_dir.path().join("usr").join("index")).unwrap()
}

fn write_header(root: &Path, text: &str) {
    fs::write(root.join("header"), text).unwrap();
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_new_package_creates_layout() {
    let (temp_dir, store) = setup_temp_store();
    let root = temp_dir.path().join("usr");

    assert!(root.join("header").is_file());
    assert!(root.join("index").is_file());
    assert!(root.join("var").is_dir());
    assert_eq!(store.root(), root.as_path());
    assert_eq!(store.name(), "usr");
    assert_eq!(store.version(), Version::CURRENT);
    assert!(!store.is_locked());
    assert!(store.is_empty());
}

#[test]
fn test_open_with_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .package_name("work")
        .package_id(4)
        .unit_size(16)
        .page_size(8)
        .author("ada")
        .build();

    let store = Store::open(config).unwrap();
    assert_eq!(store.package_id(), 4);
    assert_eq!(store.author(), Some("ada"));
    assert_eq!(store.pager().lock().page_bytes(), 128);
    assert!(temp_dir.path().join("work").join("var").is_dir());
}

#[test]
fn test_open_rejects_invalid_package_name() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["", "a/b", ".."] {
        let result = Store::new_package(name, temp_dir.path(), 0);
        assert!(matches!(result, Err(VarpackError::Config(_))));
    }
}

#[test]
fn test_new_package_opens_existing() {
    let (temp_dir, mut store) = setup_temp_store();
    store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    store.close();

    let store = Store::new_package("usr", temp_dir.path(), 0).unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.resolve("x").is_ok());
}

#[test]
fn test_open_missing_layout() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("broken");
    fs::create_dir_all(root.join("var")).unwrap();
    write_header(&root, "version=1.0.0 locked=f");

    let result = Store::open_from_directory(&root, 0);
    assert!(matches!(result, Err(VarpackError::MissingLayout(path)) if path.ends_with("index")));

    fs::write(root.join("index"), "").unwrap();
    fs::remove_dir_all(root.join("var")).unwrap();
    let result = Store::open_from_directory(&root, 0);
    assert!(matches!(result, Err(VarpackError::MissingLayout(path)) if path.ends_with("var")));
}

#[test]
fn test_header_geometry_wins_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .unit_size(4)
        .page_size(2)
        .build();
    let mut store = Store::open(config).unwrap();
    store
        .add_entry("v", EntryKind::Variable, Value::Vector(vec![1.0, 2.0, 3.0]))
        .unwrap();
    store.close();

    // Default geometry is 8x64; the recorded 4x2 must be used instead
    let mut store = reopen(&temp_dir);
    assert_eq!(store.pager().lock().page_bytes(), 8);
    let id = store.key_of("v").unwrap().entry_id;
    assert_eq!(store.entry_value(id).unwrap(), &Value::Vector(vec![1.0, 2.0, 3.0]));
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_persists_on_save() {
    let (temp_dir, mut store) = setup_temp_store();
    store.set_author(Some("grace".to_string())).unwrap();
    store.set_locked(true);
    store.save().unwrap();
    store.close();

    let text = fs::read_to_string(temp_dir.path().join("usr").join("header")).unwrap();
    let header = PackageHeader::parse(&text).unwrap();
    assert_eq!(header.author(), Some("grace"));
    assert!(header.is_locked());

    let store = reopen(&temp_dir);
    assert_eq!(store.author(), Some("grace"));
    assert!(store.is_locked());
}

#[test]
fn test_legacy_readonly_header() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    let root = temp_dir.path().join("usr");
    write_header(&root, "version=1.0.0\nauthor=ada\nreadonly=t\n");

    let store = reopen(&temp_dir);
    assert!(store.is_locked());
    assert_eq!(store.author(), Some("ada"));
}

#[test]
fn test_newer_version_rejected() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    write_header(&temp_dir.path().join("usr"), "version=2.0.0 locked=f");

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    assert!(matches!(result, Err(VarpackError::Format(_))));
}

#[test]
fn test_invalid_author_rejected() {
    let (_temp, mut store) = setup_temp_store();
    assert!(store.set_author(Some("two words".to_string())).is_err());
    assert_eq!(store.author(), None);
}

// =============================================================================
// Add/Remove Tests
// =============================================================================

#[test]
fn test_add_entry_persists_immediately() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store
        .add_entry("x", EntryKind::Variable, Value::Scalar(3.4))
        .unwrap();

    assert_eq!(key, EntryKey::new(0, 0));
    assert_eq!(store.get(0).unwrap().state(), EntryState::Clean);
    assert_eq!(read_index(&temp_dir).lines().count(), 1);
    assert!(read_index(&temp_dir).starts_with("0 x var SCA 0 0 1 0"));
}

#[test]
fn test_added_entry_payload_on_disk_before_index() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store
        .add_entry("x", EntryKind::Variable, Value::Scalar(3.4))
        .unwrap();
    let page = store.get(key.entry_id).unwrap().index().pages()[0] as usize;

    // Frame header (8 bytes) then the encoded value, in the page the index names
    let pages_path = temp_dir.path().join("usr").join("var").join("pages");
    let bytes = fs::read(pages_path).unwrap();
    let payload = &bytes[page * 512 + 8..page * 512 + 8 + 7];
    assert_eq!(payload, b"SCA 3.4");
    assert!(read_index(&temp_dir).contains(&format!(" 1 {}", page)));
}

#[test]
fn test_transient_value_survives_unload() {
    let (_temp, mut store) = setup_temp_store();
    let key = store
        .add_entry("", EntryKind::Transient, Value::Scalar(7.5))
        .unwrap();

    store.unload_entry(key.entry_id).unwrap();
    store.load_entry(key.entry_id).unwrap();
    assert_eq!(store.entry_value(key.entry_id).unwrap(), &Value::Scalar(7.5));
}

#[test]
fn test_ids_strictly_increase() {
    let (temp_dir, mut store) = setup_temp_store();
    let a = store.add_entry("a", EntryKind::Variable, Value::Null).unwrap();
    let b = store.add_entry("b", EntryKind::Variable, Value::Null).unwrap();
    store.remove_entry(b.entry_id).unwrap();
    let c = store.add_entry("c", EntryKind::Variable, Value::Null).unwrap();

    assert!(a.entry_id < b.entry_id);
    assert!(b.entry_id < c.entry_id);
    assert!(store.next_id().unwrap() > c.entry_id);
    store.close();

    // Ids continue past the highest id on disk
    let mut store = reopen(&temp_dir);
    let d = store.add_entry("d", EntryKind::Variable, Value::Null).unwrap();
    assert!(d.entry_id > c.entry_id);
}

#[test]
fn test_empty_name_rejected_for_named_kinds() {
    let (_temp, mut store) = setup_temp_store();

    for kind in [EntryKind::Variable, EntryKind::Environment] {
        let result = store.add_entry("", kind, Value::Scalar(1.0));
        assert!(matches!(result, Err(VarpackError::InvalidName(_))));
    }
    assert!(store.is_empty());
}

#[test]
fn test_transient_entry_has_empty_name() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store
        .add_entry("", EntryKind::Transient, Value::Scalar(1.0))
        .unwrap();

    let entry = store.get(key.entry_id).unwrap();
    assert_eq!(entry.name(), "");
    assert!(entry.index().pages().is_empty());
    assert!(read_index(&temp_dir).is_empty());
    assert_eq!(store.pager().lock().page_count(), 0);

    store.save().unwrap();
    store.close();
    assert!(reopen(&temp_dir).is_empty());
}

#[test]
fn test_duplicate_name_rejected() {
    let (_temp, mut store) = setup_temp_store();
    store.add_entry("x", EntryKind::Variable, Value::Null).unwrap();

    let result = store.add_entry("x", EntryKind::Environment, Value::Null);
    assert!(matches!(result, Err(VarpackError::Duplicate(_))));

    // Unnamed transients never collide
    store.add_entry("", EntryKind::Transient, Value::Null).unwrap();
    store.add_entry("", EntryKind::Transient, Value::Null).unwrap();
    assert_eq!(store.len(), 3);
}

#[test]
fn test_name_with_whitespace_rejected() {
    let (_temp, mut store) = setup_temp_store();
    let result = store.add_entry("my var", EntryKind::Variable, Value::Null);
    assert!(matches!(result, Err(VarpackError::InvalidName(_))));
}

#[test]
fn test_remove_entry_frees_pages() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store
        .add_entry("x", EntryKind::Variable, Value::Vector(vec![1.0; 100]))
        .unwrap();
    let pages = store.get(key.entry_id).unwrap().index().pages().to_vec();
    assert!(!pages.is_empty());

    store.remove_entry(key.entry_id).unwrap();

    assert!(matches!(store.get(key.entry_id), Err(VarpackError::NotFound(_))));
    assert!(matches!(store.resolve("x"), Err(VarpackError::NotFound(_))));
    assert_eq!(store.pager().lock().free_pages(), pages);
    assert!(read_index(&temp_dir).is_empty());
}

#[test]
fn test_remove_missing_entry() {
    let (_temp, mut store) = setup_temp_store();
    assert!(matches!(store.remove_entry(42), Err(VarpackError::NotFound(_))));
}

#[test]
fn test_release_entry_keeps_pages() {
    let (_temp, mut store) = setup_temp_store();
    let key = store
        .add_entry("x", EntryKind::Variable, Value::Scalar(2.0))
        .unwrap();

    let mut released = store.release_entry(key.entry_id).unwrap();
    assert!(!store.contains(key.entry_id));

    let pager = store.pager().clone();
    for page in released.index().pages() {
        assert!(pager.lock().is_occupied(*page));
    }

    released.unload().unwrap();
    released.load().unwrap();
    assert_eq!(released.data().unwrap(), &Value::Scalar(2.0));
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_lookup_by_name_and_key() {
    let (_temp, mut store) = setup_temp_store();
    let x = store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    let y = store.add_entry("y", EntryKind::Environment, Value::Scalar(2.0)).unwrap();

    assert_eq!(store.key_of("y"), Some(y));
    assert_eq!(store.key_of("z"), None);
    assert_eq!(store.resolve("x").unwrap().key(), x);
    assert_eq!(store.resolve_key(y).unwrap().kind(), EntryKind::Environment);
    assert!(matches!(
        store.resolve_key(EntryKey::new(9, y.entry_id)),
        Err(VarpackError::NotFound(_))
    ));
    assert!(store.contains(x.entry_id));

    store.resolve_mut("x").unwrap().set_data(Value::Scalar(5.0)).unwrap();
    assert!(store.resolve("x").unwrap().is_dirty());
}

#[test]
fn test_entries_in_insertion_order() {
    let (_temp, mut store) = setup_temp_store();
    for name in ["c", "a", "b"] {
        store.add_entry(name, EntryKind::Variable, Value::Null).unwrap();
    }
    let names: Vec<&str> = store.entries().map(|entry| entry.name()).collect();
    assert_eq!(names, vec!["c", "a", "b"]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_close_does_not_write_index() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Null).unwrap();
    store
        .get_mut(key.entry_id)
        .unwrap()
        .index_mut()
        .set_load_immediate(true);
    store.close();

    assert!(!reopen(&temp_dir).get(key.entry_id).unwrap().index().load_immediate());
}

#[test]
fn test_save_writes_index_flags() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Null).unwrap();
    let entry = store.get_mut(key.entry_id).unwrap();
    entry.index_mut().set_read_only(true);
    assert!(entry.index().is_modified());

    store.save().unwrap();
    assert!(!store.get(key.entry_id).unwrap().index().is_modified());
    store.close();

    assert!(reopen(&temp_dir).get(key.entry_id).unwrap().index().is_read_only());
}

#[test]
fn test_set_entry_value_persists() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();

    store
        .set_entry_value(key.entry_id, Value::Vector(vec![7.0, 8.0]))
        .unwrap();
    store.save().unwrap();
    store.close();

    let mut store = reopen(&temp_dir);
    assert_eq!(
        store.entry_value(key.entry_id).unwrap(),
        &Value::Vector(vec![7.0, 8.0])
    );
}

#[test]
fn test_load_all_and_save_entries() {
    let (temp_dir, mut store) = setup_temp_store();
    for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
        store
            .add_entry(name, EntryKind::Variable, Value::Scalar(i as f64))
            .unwrap();
    }
    store.close();

    let mut store = reopen(&temp_dir);
    assert!(store.entries().all(|entry| !entry.is_loaded()));
    assert!(store.load_all().is_empty());
    assert!(store.entries().all(|entry| entry.is_loaded()));

    for entry in store.entries_mut() {
        let doubled = match entry.data().unwrap() {
            Value::Scalar(x) => Value::Scalar(x * 2.0),
            other => other.clone(),
        };
        entry.set_data(doubled).unwrap();
    }
    assert!(store.save_entries().unwrap().is_empty());
    store.close();

    let mut store = reopen(&temp_dir);
    let id = store.key_of("c").unwrap().entry_id;
    assert_eq!(store.entry_value(id).unwrap(), &Value::Scalar(4.0));
}

#[test]
fn test_unload_and_reset_entry() {
    let (_temp, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();

    store.unload_entry(key.entry_id).unwrap();
    assert!(!store.get(key.entry_id).unwrap().is_loaded());
    store.load_entry(key.entry_id).unwrap();

    store.reset_entry(key.entry_id).unwrap();
    assert_eq!(store.entry_value(key.entry_id).unwrap(), &Value::Null);
}

// =============================================================================
// Locked Package Tests
// =============================================================================

#[test]
fn test_locked_package_rejects_changes() {
    let (_temp, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    store.set_locked(true);

    assert!(matches!(
        store.add_entry("y", EntryKind::Variable, Value::Null),
        Err(VarpackError::ReadOnly(_))
    ));
    assert!(matches!(store.remove_entry(key.entry_id), Err(VarpackError::ReadOnly(_))));
    assert!(matches!(store.release_entry(key.entry_id), Err(VarpackError::ReadOnly(_))));
    assert!(matches!(
        store.set_entry_value(key.entry_id, Value::Null),
        Err(VarpackError::ReadOnly(_))
    ));

    // Reads still work
    assert_eq!(store.entry_value(key.entry_id).unwrap(), &Value::Scalar(1.0));

    store.set_locked(false);
    store.remove_entry(key.entry_id).unwrap();
}

#[test]
fn test_locked_package_rejects_bulk_save() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    store
        .get_mut(key.entry_id)
        .unwrap()
        .set_data(Value::Scalar(2.0))
        .unwrap();
    store.set_locked(true);

    assert!(matches!(store.save_entries(), Err(VarpackError::ReadOnly(_))));
    assert!(store.get(key.entry_id).unwrap().is_dirty());
    store.close();

    let mut store = reopen(&temp_dir);
    assert_eq!(store.entry_value(key.entry_id).unwrap(), &Value::Scalar(1.0));
}

// =============================================================================
// Corrupt Index Tests
// =============================================================================

#[test]
fn test_index_with_shared_page_rejected() {
    let (temp_dir, mut store) = setup_temp_store();
    store.add_entry("a", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    store.add_entry("b", EntryKind::Variable, Value::Scalar(2.0)).unwrap();
    store.close();

    let index_path = temp_dir.path().join("usr").join("index");
    fs::write(&index_path, "0 a var SCA 0 0 1 0\n1 b var SCA 0 0 1 0\n").unwrap();

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    assert!(matches!(result, Err(VarpackError::Duplicate(_))));
}

#[test]
fn test_index_with_page_past_end_rejected() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    fs::write(
        temp_dir.path().join("usr").join("index"),
        "0 a var SCA 0 0 1 5\n",
    )
    .unwrap();

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    assert!(matches!(result, Err(VarpackError::Bounds(_))));
}

#[test]
fn test_index_with_bad_page_count_rejected() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    fs::write(
        temp_dir.path().join("usr").join("index"),
        "0 a var SCA 0 0 3 0 1\n",
    )
    .unwrap();

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    assert!(matches!(result, Err(VarpackError::Format(_))));
}

#[test]
fn test_index_with_max_entry_id_rejected() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    fs::write(
        temp_dir.path().join("usr").join("index"),
        format!("{} x var NUL 0 0 0\n", u64::MAX),
    )
    .unwrap();

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    assert!(matches!(result, Err(VarpackError::Format(_))));
}

#[test]
fn test_exhausted_entry_ids_reject_add() {
    let (temp_dir, store) = setup_temp_store();
    store.close();
    fs::write(
        temp_dir.path().join("usr").join("index"),
        format!("{} x var NUL 0 0 0\n", u64::MAX - 1),
    )
    .unwrap();

    // u64::MAX is the next id, but nothing follows it
    let mut store = reopen(&temp_dir);
    assert_eq!(store.len(), 1);
    assert!(matches!(
        store.add_entry("y", EntryKind::Variable, Value::Null),
        Err(VarpackError::Format(_))
    ));
}

#[test]
fn test_index_skips_blank_lines() {
    let (temp_dir, mut store) = setup_temp_store();
    store.add_entry("a", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    store.close();

    let index_path = temp_dir.path().join("usr").join("index");
    let text = fs::read_to_string(&index_path).unwrap();
    fs::write(&index_path, format!("\n{}\n  \n", text)).unwrap();

    assert_eq!(reopen(&temp_dir).len(), 1);
}

#[test]
fn test_load_immediate_failure_is_typed() {
    let (temp_dir, mut store) = setup_temp_store();
    let key = store.add_entry("x", EntryKind::Variable, Value::Scalar(3.4)).unwrap();
    let page = store.get(key.entry_id).unwrap().index().pages()[0];
    store
        .get_mut(key.entry_id)
        .unwrap()
        .index_mut()
        .set_load_immediate(true);
    store.save().unwrap();
    store.close();

    // Flip one payload byte behind the 8-byte frame header
    let pages_path = temp_dir.path().join("usr").join("var").join("pages");
    let mut bytes = fs::read(&pages_path).unwrap();
    let offset = page as usize * 512 + 8;
    bytes[offset] ^= 0xFF;
    fs::write(&pages_path, bytes).unwrap();

    let result = Store::open_from_directory(temp_dir.path().join("usr"), 0);
    match result {
        Err(VarpackError::EntryLoad { name, source }) => {
            assert_eq!(name, "x");
            assert!(matches!(*source, VarpackError::Checksum { .. }));
        }
        other => panic!("expected EntryLoad, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_load_immediate_entries_loaded_on_open() {
    let (temp_dir, mut store) = setup_temp_store();
    let a = store.add_entry("a", EntryKind::Variable, Value::Scalar(1.0)).unwrap();
    let b = store.add_entry("b", EntryKind::Variable, Value::Scalar(2.0)).unwrap();
    store.get_mut(a.entry_id).unwrap().index_mut().set_load_immediate(true);
    store.save().unwrap();
    store.close();

    let store = reopen(&temp_dir);
    assert!(store.get(a.entry_id).unwrap().is_loaded());
    assert!(!store.get(b.entry_id).unwrap().is_loaded());
}
