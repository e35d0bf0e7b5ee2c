use dupestore::config::Config;
use dupestore::engine::Dedupe;
use dupestore::scanner::{Hasher, ScanError, Scanner, ScannerConfig};
use dupestore::store::{FileRecord, IndexStore};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn scan(store: &mut IndexStore, root: &Path) -> dupestore::scanner::ScanSummary {
    Scanner::new(store, ScannerConfig::default())
        .scan(root)
        .expect("scan failed")
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let mut store = IndexStore::open_in_memory().unwrap();

    let summary = scan(&mut store, dir.path());

    assert_eq!(summary.files_scanned, 0);
    assert_eq!(summary.files_hashed, 0);
    assert!(store.get_duplicates().unwrap().is_empty());
}

#[test]
fn test_scan_finds_duplicates_across_subdirectories() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a/deep")).unwrap();
    fs::create_dir_all(dir.path().join("b")).unwrap();

    File::create(dir.path().join("a/deep/one.txt"))
        .unwrap()
        .write_all(b"duplicate")
        .unwrap();
    File::create(dir.path().join("b/two.txt"))
        .unwrap()
        .write_all(b"duplicate")
        .unwrap();
    File::create(dir.path().join("b/unique.txt"))
        .unwrap()
        .write_all(b"unique")
        .unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    let summary = scan(&mut store, dir.path());

    assert_eq!(summary.files_scanned, 3);
    let dupes = store.get_duplicates().unwrap();
    assert_eq!(dupes.len(), 2);
    assert_eq!(dupes[0].0, Hasher::hash_bytes(b"duplicate"));
}

#[test]
fn test_unchanged_tree_is_not_rehashed() {
    let dir = tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }

    let mut store = IndexStore::open_in_memory().unwrap();
    let first = scan(&mut store, dir.path());
    let second = scan(&mut store, dir.path());

    assert_eq!(first.files_hashed, 3);
    assert_eq!(second.files_scanned, 3);
    assert_eq!(second.files_hashed, 0);
}

#[test]
fn test_modified_file_is_rehashed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    fs::write(&path, b"aaaa").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());
    let before = store.get(&path).unwrap().unwrap();

    // Same size, different content, clearly different mtime.
    fs::write(&path, b"bbbb").unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let summary = scan(&mut store, dir.path());
    let after = store.get(&path).unwrap().unwrap();

    assert_eq!(summary.files_hashed, 1);
    assert_ne!(before.hash, after.hash);
    assert_eq!(after.hash, Some(Hasher::hash_bytes(b"bbbb")));
}

#[test]
fn test_deleted_file_is_archived() {
    let dir = tempdir().unwrap();
    let kept = dir.path().join("kept.txt");
    let gone = dir.path().join("gone.txt");
    fs::write(&kept, b"same").unwrap();
    fs::write(&gone, b"same").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());
    fs::remove_file(&gone).unwrap();

    let summary = scan(&mut store, dir.path());

    assert_eq!(summary.records_archived, 1);
    assert!(store.get(&gone).unwrap().is_none());
    assert!(store.get_archived(&gone).unwrap().is_some());
    assert!(store.get(&kept).unwrap().is_some());
    assert!(store.get_duplicates().unwrap().is_empty());
}

#[test]
fn test_restored_file_leaves_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("photo.jpg");
    fs::write(&path, b"pixels").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());
    fs::remove_file(&path).unwrap();
    scan(&mut store, dir.path());
    fs::write(&path, b"pixels").unwrap();
    scan(&mut store, dir.path());

    assert!(store.get(&path).unwrap().is_some());
    assert!(store.get_archived(&path).unwrap().is_none());
}

#[test]
fn test_scanning_one_root_leaves_siblings_alone() {
    let dir = tempdir().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    fs::create_dir(&left).unwrap();
    fs::create_dir(&right).unwrap();
    fs::write(left.join("a.txt"), b"x").unwrap();
    fs::write(right.join("b.txt"), b"x").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, &left);
    scan(&mut store, &right);
    let summary = scan(&mut store, &left);

    assert_eq!(summary.records_archived, 0);
    assert_eq!(store.get_duplicates().unwrap().len(), 2);
}

#[test]
fn test_reconcile_after_nested_scan_keeps_live_files() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(dir.path().join("top.txt"), b"same").unwrap();
    fs::write(sub.join("inner.txt"), b"same").unwrap();

    let mut engine = Dedupe::with_store(IndexStore::open_in_memory().unwrap(), Config::default());
    engine.scan(dir.path()).unwrap();
    engine.scan(&sub).unwrap();

    let stats = engine.reconcile(dir.path()).unwrap();
    assert_eq!(stats.archived, 0);
    assert_eq!(stats.dropped, 0);
    assert_eq!(engine.duplicate_index().unwrap().len(), 2);

    // Nothing was archived, so the unchanged subtree is not re-read
    let summary = engine.scan(&sub).unwrap();
    assert_eq!(summary.files_hashed, 0);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_never_recorded() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("target.txt");
    fs::write(&target, b"content").unwrap();
    std::os::unix::fs::symlink(&target, dir.path().join("alias.txt")).unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    let summary = scan(&mut store, dir.path());

    assert_eq!(summary.files_scanned, 1);
    assert!(store.get(&dir.path().join("alias.txt")).unwrap().is_none());
}

#[test]
fn test_record_without_hash_is_retried() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flaky.bin");
    fs::write(&path, b"data").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());

    // Simulate an earlier hashing failure with an unchanged signature.
    let record = store.get(&path).unwrap().unwrap();
    store
        .upsert(&FileRecord::new(record.path.clone(), None, record.stat))
        .unwrap();

    let summary = scan(&mut store, dir.path());
    assert_eq!(summary.files_hashed, 1);
    assert_eq!(
        store.get(&path).unwrap().unwrap().hash,
        Some(Hasher::hash_bytes(b"data"))
    );
}

#[test]
fn test_scan_rejects_bad_roots() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("file.txt");
    fs::write(&file, b"x").unwrap();
    let mut store = IndexStore::open_in_memory().unwrap();

    let missing = Scanner::new(&mut store, ScannerConfig::default()).scan(&dir.path().join("no"));
    assert!(matches!(missing, Err(ScanError::NotFound(_))));

    let not_dir = Scanner::new(&mut store, ScannerConfig::default()).scan(&file);
    assert!(matches!(not_dir, Err(ScanError::NotADirectory(_))));
}
