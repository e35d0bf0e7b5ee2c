//! Batched removal of a validated delete set.
//!
//! # Overview
//!
//! [`Executor`] walks a delete index in fixed-size batches. Each file is
//! either unlinked or moved under a destination directory, keeping its full
//! original path below that directory. Once every file in a batch is gone
//! the batch's paths are retired from the index in one transaction.
//!
//! If a file operation fails, files already handled in that batch stay
//! moved or deleted on disk, but the batch's index update is never
//! committed and the remaining batches are skipped. Committed batches stay
//! applied.
//!
//! # Example
//!
//! ```no_run
//! use dupestore::actions::{validate_and_execute, ExecuteConfig};
//! use dupestore::duplicates::{partition, DupeIndex, PartitionOptions};
//! use dupestore::store::IndexStore;
//! use regex::Regex;
//! use std::path::Path;
//!
//! let mut store = IndexStore::open(Path::new("index.sqlite")).unwrap();
//! let full = DupeIndex::from_store(&store).unwrap();
//! let options = PartitionOptions::new("/srv/media/inbox", Regex::new("copy").unwrap());
//! let selection = partition(&full, &options);
//!
//! let config = ExecuteConfig::move_to("/srv/trash");
//! let report =
//!     validate_and_execute(&mut store, &selection.keep, &selection.delete, config, None)
//!         .unwrap();
//! println!("{}", report.summary());
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;
use thiserror::Error;

use super::validate::{validate, ValidationError};
use crate::duplicates::DupeIndex;
use crate::store::{IndexStore, StoreError};

/// Default number of files per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Error that aborted an execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The file vanished before it could be removed.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Moving the file to its destination failed.
    #[error("failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unlinking the file failed.
    #[error("failed to delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The batch's index update was rejected.
    #[error("index update failed: {0}")]
    Store(#[from] StoreError),
}

/// What happens to each deleted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposal {
    /// Move below this directory, keeping the full original path.
    MoveTo(PathBuf),
    /// Unlink permanently.
    Delete,
}

/// Execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
    /// Move or delete
    pub disposal: Disposal,
    /// Files per index transaction
    pub batch_size: usize,
    /// Checked between batches
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl ExecuteConfig {
    /// Move files below `destination`.
    #[must_use]
    pub fn move_to(destination: impl Into<PathBuf>) -> Self {
        Self {
            disposal: Disposal::MoveTo(destination.into()),
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_flag: None,
        }
    }

    /// Unlink files permanently.
    #[must_use]
    pub fn delete() -> Self {
        Self {
            disposal: Disposal::Delete,
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_flag: None,
        }
    }

    /// Set the batch size (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the shutdown flag for cancellation between batches.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Per-file result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResult {
    /// Moved to the given location
    Moved { to: PathBuf },
    /// Unlinked
    Deleted,
    /// The file operation failed; execution stopped here
    Failed(String),
    /// Not attempted because execution stopped earlier
    Skipped,
}

/// Outcome for one path of the delete set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: FileResult,
}

/// Callback trait for execution progress reporting.
pub trait ExecuteProgress: Send + Sync {
    /// Called once per path, right after its file operation (or skip).
    fn on_file(&self, outcome: &FileOutcome);

    /// Called after a batch's index update commits.
    fn on_batch_committed(&self, _batch: usize, _files: usize) {}
}

/// Everything that happened during one execution.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// One entry per path, in processing order
    pub outcomes: Vec<FileOutcome>,
    /// Files whose removal is recorded in the index
    pub files_committed: usize,
    /// Batches whose index transaction committed
    pub batches_committed: usize,
    /// Bytes removed from their original location
    pub bytes_freed: u64,
    /// Stopped by a shutdown request
    pub cancelled: bool,
    /// The failure that stopped execution, if any
    pub error: Option<ExecuteError>,
}

impl ExecutionReport {
    /// Whether every path was removed and committed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.error.is_none()
    }

    /// Number of outcomes with the given shape.
    #[must_use]
    pub fn count_where(&self, pred: impl Fn(&FileResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} of {} files removed in {} batches, {} freed",
            self.files_committed,
            self.outcomes.len(),
            self.batches_committed,
            ByteSize::b(self.bytes_freed)
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        if let Some(err) = &self.error {
            line.push_str(&format!(" (stopped: {err})"));
        }
        line
    }
}

/// Applies a delete set to disk and to the index.
pub struct Executor<'a> {
    store: &'a mut IndexStore,
    config: ExecuteConfig,
}

impl<'a> Executor<'a> {
    /// Create an executor that retires removed paths from `store`.
    pub fn new(store: &'a mut IndexStore, config: ExecuteConfig) -> Self {
        Self { store, config }
    }

    /// Remove every path in `delete`. Call [`validate`] first, or use
    /// [`validate_and_execute`].
    ///
    /// # Arguments
    ///
    /// * `delete` - Paths to remove, processed in index iteration order
    /// * `progress` - Optional callback for per-file and per-batch events
    ///
    /// # Returns
    ///
    /// An [`ExecutionReport`] with one outcome per path. Execution never
    /// panics on filesystem failures; the first one stops the run and is
    /// stored in [`ExecutionReport::error`].
    pub fn execute(
        &mut self,
        delete: &DupeIndex,
        progress: Option<&dyn ExecuteProgress>,
    ) -> ExecutionReport {
        let paths: Vec<PathBuf> = delete.paths().map(Path::to_path_buf).collect();
        let batch_size = self.config.batch_size.max(1);
        let mut report = ExecutionReport::default();
        let emit = |report: &mut ExecutionReport, outcome: FileOutcome| {
            if let Some(cb) = progress {
                cb.on_file(&outcome);
            }
            report.outcomes.push(outcome);
        };

        log::info!(
            "Executing {} removals in batches of {}",
            paths.len(),
            batch_size
        );

        let mut next = 0;
        for (batch_no, batch) in paths.chunks(batch_size).enumerate() {
            if self.config.is_shutdown_requested() {
                log::warn!("Shutdown requested; stopping before batch {}", batch_no + 1);
                report.cancelled = true;
                break;
            }

            let mut done: Vec<PathBuf> = Vec::with_capacity(batch.len());
            let mut batch_bytes = 0;
            for path in batch {
                next += 1;
                let size = fs::symlink_metadata(path).map_or(0, |m| m.len());
                match self.dispose(path) {
                    Ok(result) => {
                        batch_bytes += size;
                        done.push(path.clone());
                        emit(&mut report, FileOutcome { path: path.clone(), result });
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        emit(
                            &mut report,
                            FileOutcome {
                                path: path.clone(),
                                result: FileResult::Failed(e.to_string()),
                            },
                        );
                        report.bytes_freed += batch_bytes;
                        report.error = Some(e);
                        break;
                    }
                }
            }

            if report.error.is_some() {
                log::warn!(
                    "Batch {} aborted; {} files already removed stay removed but are not retired",
                    batch_no + 1,
                    done.len()
                );
                break;
            }

            report.bytes_freed += batch_bytes;
            if let Err(e) = self.store.retire_batch(&done) {
                log::error!("Failed to retire batch {}: {}", batch_no + 1, e);
                report.error = Some(e.into());
                break;
            }
            report.files_committed += done.len();
            report.batches_committed += 1;
            if let Some(cb) = progress {
                cb.on_batch_committed(batch_no, done.len());
            }
            log::debug!("Committed batch {} ({} files)", batch_no + 1, done.len());
        }

        for path in &paths[next..] {
            emit(
                &mut report,
                FileOutcome {
                    path: path.clone(),
                    result: FileResult::Skipped,
                },
            );
        }

        log::info!("{}", report.summary());
        report
    }

    fn dispose(&self, path: &Path) -> Result<FileResult, ExecuteError> {
        match &self.config.disposal {
            Disposal::Delete => {
                fs::remove_file(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => ExecuteError::NotFound(path.to_path_buf()),
                    _ => ExecuteError::DeleteFailed {
                        path: path.to_path_buf(),
                        source: e,
                    },
                })?;
                log::info!("Deleted: {}", path.display());
                Ok(FileResult::Deleted)
            }
            Disposal::MoveTo(destination) => {
                if fs::symlink_metadata(path).is_err() {
                    return Err(ExecuteError::NotFound(path.to_path_buf()));
                }
                let target = unique_target(&target_path(destination, path));
                move_file(path, &target).map_err(|source| ExecuteError::MoveFailed {
                    from: path.to_path_buf(),
                    to: target.clone(),
                    source,
                })?;
                log::info!("Moved: {} -> {}", path.display(), target.display());
                Ok(FileResult::Moved { to: target })
            }
        }
    }
}

/// `destination` joined with `path` minus its root and prefix.
///
/// # Example
///
/// ```
/// use dupestore::actions::target_path;
/// use std::path::{Path, PathBuf};
///
/// let target = target_path(Path::new("/trash"), Path::new("/home/me/a.txt"));
/// assert_eq!(target, PathBuf::from("/trash/home/me/a.txt"));
/// ```
#[must_use]
pub fn target_path(destination: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    destination.join(relative)
}

/// `target` itself if free, otherwise the first free `stem_N.ext`.
#[must_use]
pub fn unique_target(target: &Path) -> PathBuf {
    if fs::symlink_metadata(target).is_err() {
        return target.to_path_buf();
    }

    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target.extension().map(|e| e.to_string_lossy().into_owned());

    (1..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            parent.join(name)
        })
        .find(|candidate| fs::symlink_metadata(candidate).is_err())
        .unwrap_or_else(|| target.to_path_buf())
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!("Cross-device move, copying {}", from.display());
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Validate, then execute. A validation failure touches nothing.
///
/// # Errors
///
/// Returns the first [`ValidationError`]; execution failures are reported
/// in the [`ExecutionReport`].
pub fn validate_and_execute(
    store: &mut IndexStore,
    keep: &DupeIndex,
    delete: &DupeIndex,
    config: ExecuteConfig,
    progress: Option<&dyn ExecuteProgress>,
) -> Result<ExecutionReport, ValidationError> {
    validate(keep, delete)?;
    Ok(Executor::new(store, config).execute(delete, progress))
}

/// Dry run: validate and list what would be removed.
///
/// # Errors
///
/// Returns the first [`ValidationError`].
pub fn plan(keep: &DupeIndex, delete: &DupeIndex) -> Result<Vec<PathBuf>, ValidationError> {
    validate(keep, delete)?;
    Ok(delete.paths().map(Path::to_path_buf).collect())
}
