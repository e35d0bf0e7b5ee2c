use dupestore::scanner::{Scanner, ScannerConfig};
use dupestore::store::{ContentHash, FileRecord, IndexStore, StatSignature, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn record(path: &str, hash: u8) -> FileRecord {
    FileRecord::new(
        PathBuf::from(path),
        Some(ContentHash::from_bytes(&[hash; 32])),
        StatSignature {
            size: 1,
            ..StatSignature::default()
        },
    )
}

fn scan(store: &mut IndexStore, root: &Path) {
    Scanner::new(store, ScannerConfig::default())
        .scan(root)
        .unwrap();
}

#[test]
fn test_store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("index.sqlite");

    {
        let mut store = IndexStore::open(&db).unwrap();
        store.upsert(&record("/data/a", 1)).unwrap();
        store.upsert(&record("/data/b", 1)).unwrap();
    }

    let store = IndexStore::open(&db).unwrap();
    assert_eq!(store.get_duplicates().unwrap().len(), 2);
    assert_eq!(store.counts().unwrap().active, 2);
}

#[test]
fn test_corrupt_database_is_unavailable() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("index.sqlite");
    fs::write(&db, b"this is not a sqlite database, just some bytes").unwrap();

    let result = IndexStore::open(&db);
    assert!(matches!(result, Err(StoreError::Unavailable { .. })));
}

#[test]
fn test_double_retire_is_not_found() {
    let mut store = IndexStore::open_in_memory().unwrap();
    store.upsert(&record("/data/a", 1)).unwrap();

    store.retire(Path::new("/data/a")).unwrap();
    let second = store.retire(Path::new("/data/a"));
    assert!(matches!(second, Err(StoreError::NotFound(p)) if p == Path::new("/data/a")));
}

#[test]
fn test_failed_retire_batch_rolls_back() {
    let mut store = IndexStore::open_in_memory().unwrap();
    store.upsert(&record("/data/a", 1)).unwrap();

    let result = store.retire_batch(&[PathBuf::from("/data/a"), PathBuf::from("/data/zzz")]);
    assert!(matches!(result, Err(StoreError::NotFound(_))));
    assert!(store.get(Path::new("/data/a")).unwrap().is_some());
}

#[test]
fn test_gc_removes_confirmed_absent_records() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("old.txt");
    fs::write(&file, b"old").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());
    fs::remove_file(&file).unwrap();
    scan(&mut store, dir.path());
    assert!(store.get_archived(&file).unwrap().is_some());

    assert_eq!(store.gc_archive().unwrap(), 1);
    assert!(store.get_archived(&file).unwrap().is_none());
}

#[test]
fn test_gc_keeps_records_under_missing_root() {
    let dir = tempdir().unwrap();
    let media = dir.path().join("media");
    fs::create_dir(&media).unwrap();
    let file = media.join("clip.mov");
    fs::write(&file, b"clip").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, &media);
    fs::remove_file(&file).unwrap();
    scan(&mut store, &media);

    // The whole root vanishes, as with an unmounted drive
    fs::remove_dir(&media).unwrap();
    assert_eq!(store.gc_archive().unwrap(), 0);
    assert!(store.get_archived(&file).unwrap().is_some());
}

#[test]
fn test_wipe_active_forces_rehash() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"a").unwrap();
    fs::write(dir.path().join("b.txt"), b"b").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());
    assert_eq!(store.wipe_active().unwrap(), 2);

    let summary = Scanner::new(&mut store, ScannerConfig::default())
        .scan(dir.path())
        .unwrap();
    assert_eq!(summary.files_hashed, 2);
}

#[test]
fn test_roots_and_counts() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"a").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&mut store, dir.path());

    assert_eq!(store.roots().unwrap(), vec![dir.path().to_path_buf()]);
    assert!(store.last_scan(dir.path()).unwrap().is_some());

    let counts = store.counts().unwrap();
    assert_eq!(counts.active, 1);
    assert_eq!(counts.hashed, 1);
    assert_eq!(counts.archived, 0);
    assert_eq!(counts.roots, 1);
}
