use dupestore::actions::{
    validate_and_execute, ExecuteConfig, ExecuteError, ExecuteProgress, Executor, FileOutcome,
    FileResult, ValidationError,
};
use dupestore::duplicates::{partition, DupeIndex, PartitionOptions};
use dupestore::scanner::{Hasher, Scanner, ScannerConfig};
use dupestore::signal::ShutdownHandler;
use dupestore::store::IndexStore;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::tempdir;

/// Create `count` copies of the same content plus one original, index them,
/// and return (store, keep, delete).
fn copies(root: &Path, count: usize) -> (IndexStore, DupeIndex, DupeIndex) {
    let hash = Hasher::hash_bytes(b"payload");
    let original = root.join("original.bin");
    fs::write(&original, b"payload").unwrap();

    let mut delete = DupeIndex::new();
    for i in 0..count {
        let path = root.join(format!("copy{i:02}.bin"));
        fs::write(&path, b"payload").unwrap();
        delete.add(hash.clone(), path);
    }

    let mut store = IndexStore::open_in_memory().unwrap();
    Scanner::new(&mut store, ScannerConfig::default())
        .scan(root)
        .unwrap();

    let keep = DupeIndex::from_pairs([(hash, original)]);
    (store, keep, delete)
}

#[derive(Default)]
struct Recorder {
    files: Mutex<Vec<FileOutcome>>,
    batches: Mutex<Vec<usize>>,
}

impl ExecuteProgress for Recorder {
    fn on_file(&self, outcome: &FileOutcome) {
        self.files.lock().unwrap().push(outcome.clone());
    }

    fn on_batch_committed(&self, batch: usize, _files: usize) {
        self.batches.lock().unwrap().push(batch);
    }
}

/// Requests shutdown as soon as the first batch commits.
struct StopAfterFirstBatch(ShutdownHandler);

impl ExecuteProgress for StopAfterFirstBatch {
    fn on_file(&self, _outcome: &FileOutcome) {}

    fn on_batch_committed(&self, _batch: usize, _files: usize) {
        self.0.request_shutdown();
    }
}

#[test]
fn test_delete_in_batches_retires_records() {
    let dir = tempdir().unwrap();
    let (mut store, keep, delete) = copies(dir.path(), 5);
    let recorder = Recorder::default();

    let report = validate_and_execute(
        &mut store,
        &keep,
        &delete,
        ExecuteConfig::delete().with_batch_size(2),
        Some(&recorder),
    )
    .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.files_committed, 5);
    assert_eq!(report.batches_committed, 3);
    assert_eq!(report.bytes_freed, 5 * 7);
    assert_eq!(*recorder.batches.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(recorder.files.lock().unwrap().len(), 5);

    for path in delete.paths() {
        assert!(!path.exists());
        assert!(store.get(path).unwrap().is_none());
    }
    assert!(dir.path().join("original.bin").exists());
}

#[test]
fn test_move_preserves_layout_and_avoids_collisions() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    let trash = dir.path().join("trash");
    fs::create_dir(&data).unwrap();
    let (mut store, keep, delete) = copies(&data, 1);
    let victim = data.join("copy00.bin");

    // Occupy the natural target first
    let natural = dupestore::actions::target_path(&trash, &victim);
    fs::create_dir_all(natural.parent().unwrap()).unwrap();
    fs::write(&natural, b"already here").unwrap();

    let report = validate_and_execute(
        &mut store,
        &keep,
        &delete,
        ExecuteConfig::move_to(&trash),
        None,
    )
    .unwrap();

    assert!(report.is_complete());
    let FileResult::Moved { to } = &report.outcomes[0].result else {
        panic!("expected a move, got {:?}", report.outcomes[0].result);
    };
    assert_eq!(to.file_name().unwrap(), "copy00_1.bin");
    assert_eq!(fs::read(to).unwrap(), b"payload");
    assert_eq!(fs::read(&natural).unwrap(), b"already here");
    assert!(!victim.exists());
}

#[test]
fn test_validation_failure_touches_nothing() {
    let dir = tempdir().unwrap();
    let (mut store, keep, mut delete) = copies(dir.path(), 3);
    let subdir = dir.path().join("folder");
    fs::create_dir(&subdir).unwrap();
    delete.add(Hasher::hash_bytes(b"payload"), subdir.clone());

    let err = validate_and_execute(
        &mut store,
        &keep,
        &delete,
        ExecuteConfig::delete(),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, ValidationError::NotAFile(p) if p == subdir));
    for i in 0..3 {
        assert!(dir.path().join(format!("copy{i:02}.bin")).exists());
    }
}

#[test]
fn test_failure_keeps_committed_batches() {
    let dir = tempdir().unwrap();
    let (mut store, _keep, delete) = copies(dir.path(), 4);
    let paths: Vec<PathBuf> = delete.paths().map(Path::to_path_buf).collect();

    // Vanishes after validation would have passed
    fs::remove_file(&paths[2]).unwrap();

    let report = Executor::new(&mut store, ExecuteConfig::delete().with_batch_size(2))
        .execute(&delete, None);

    assert!(!report.is_complete());
    assert!(matches!(report.error, Some(ExecuteError::NotFound(ref p)) if p == &paths[2]));
    assert_eq!(report.batches_committed, 1);
    assert_eq!(report.files_committed, 2);

    // First batch is retired from the index
    assert!(store.get(&paths[0]).unwrap().is_none());
    assert!(store.get(&paths[1]).unwrap().is_none());
    // Failed batch is not
    assert!(store.get(&paths[2]).unwrap().is_some());
    assert!(paths[3].exists());
    assert_eq!(report.outcomes[3].result, FileResult::Skipped);
}

#[test]
fn test_cancellation_between_batches() {
    let dir = tempdir().unwrap();
    let (mut store, keep, delete) = copies(dir.path(), 4);
    let handler = ShutdownHandler::new();
    let progress = StopAfterFirstBatch(handler.clone());

    let report = validate_and_execute(
        &mut store,
        &keep,
        &delete,
        ExecuteConfig::delete()
            .with_batch_size(2)
            .with_shutdown_flag(handler.get_flag()),
        Some(&progress),
    )
    .unwrap();

    assert!(report.cancelled);
    assert!(report.error.is_none());
    assert_eq!(report.files_committed, 2);
    assert_eq!(
        report.count_where(|r| matches!(r, FileResult::Skipped)),
        2
    );
    assert_eq!(
        delete.paths().filter(|p| p.exists()).count(),
        2
    );
}

#[test]
fn test_double_delete_is_not_found() {
    let dir = tempdir().unwrap();
    let (mut store, keep, delete) = copies(dir.path(), 1);

    let first = validate_and_execute(&mut store, &keep, &delete, ExecuteConfig::delete(), None)
        .unwrap();
    assert!(first.is_complete());

    let second =
        validate_and_execute(&mut store, &keep, &delete, ExecuteConfig::delete(), None);
    assert!(matches!(second, Err(ValidationError::NotFound(_))));

    let raw = Executor::new(&mut store, ExecuteConfig::delete()).execute(&delete, None);
    assert!(matches!(raw.error, Some(ExecuteError::NotFound(_))));
}

#[test]
fn test_vanished_keep_copy_blocks_execution() {
    let dir = tempdir().unwrap();
    let orig = dir.path().join("orig.txt");
    let copy = dir.path().join("orig copy.txt");
    fs::write(&orig, b"only data").unwrap();
    fs::write(&copy, b"only data").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    Scanner::new(&mut store, ScannerConfig::default())
        .scan(dir.path())
        .unwrap();
    let full = DupeIndex::from_store(&store).unwrap();
    let selection = partition(
        &full,
        &PartitionOptions::new(dir.path(), Regex::new("copy").unwrap()),
    );
    assert_eq!(selection.delete.paths().collect::<Vec<_>>(), vec![copy.as_path()]);

    // The keeper disappears between indexing and execution
    fs::remove_file(&orig).unwrap();

    let result = validate_and_execute(
        &mut store,
        &selection.keep,
        &selection.delete,
        ExecuteConfig::delete(),
        None,
    );

    assert!(matches!(result, Err(ValidationError::NotFound(ref p)) if *p == orig));
    assert!(copy.exists());
    assert!(store.get(&copy).unwrap().is_some());
}
