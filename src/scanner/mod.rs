//! Scanner module for directory traversal and incremental indexing.
//!
//! This module provides functionality for:
//! - Recursive directory walking with walkdir (links never followed)
//! - Full-content hashing with BLAKE3 on a bounded rayon pool
//! - Stat-signature reuse so unchanged files are never re-read
//! - Reconciling the index with what a scan observed
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//!
//! # Example
//!
//! ```no_run
//! use dupestore::scanner::{Scanner, ScannerConfig};
//! use dupestore::store::IndexStore;
//! use std::path::Path;
//!
//! let mut store = IndexStore::open(Path::new("index.sqlite")).unwrap();
//! let summary = Scanner::new(&mut store, ScannerConfig::default())
//!     .scan(Path::new("/srv/media"))
//!     .unwrap();
//! println!("{} files, {} hashed", summary.files_scanned, summary.files_hashed);
//! ```

pub mod hasher;
pub mod walker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::store::{FileRecord, IndexStore, StatSignature, StoreError};

pub use hasher::{Hasher, DEFAULT_BUFFER_SIZE};
pub use walker::Walker;

/// A regular file discovered by the [`Walker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Stat signature read during the walk
    pub stat: StatSignature,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The scan was stopped by a shutdown request before reconciling.
    #[error("Scan interrupted")]
    Interrupted,

    /// The hashing thread pool could not be created.
    #[error("Failed to build hashing thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The index store rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Scanner tuning.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Worker threads used for hashing
    pub hash_threads: usize,
    /// Files written to the index per transaction
    pub batch_size: usize,
    /// Read buffer for hashing
    pub buffer_size: usize,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            hash_threads: 4,
            batch_size: 256,
            buffer_size: DEFAULT_BUFFER_SIZE,
            shutdown_flag: None,
        }
    }
}

impl ScannerConfig {
    /// Set the number of hashing threads (at least one).
    #[must_use]
    pub fn with_hash_threads(mut self, threads: usize) -> Self {
        self.hash_threads = threads.max(1);
        self
    }

    /// Set the number of files per index transaction (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the hashing read buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }
}

/// Counters for one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Regular files observed
    pub files_scanned: usize,
    /// Files whose content was read and hashed
    pub files_hashed: usize,
    /// Files that could not be stat'ed or hashed
    pub files_failed: usize,
    /// Records moved to the archive by reconciliation
    pub records_archived: usize,
    /// Unhashed records dropped by reconciliation
    pub records_dropped: usize,
}

/// Incremental indexer for one store.
pub struct Scanner<'a> {
    store: &'a mut IndexStore,
    config: ScannerConfig,
    hasher: Hasher,
}

impl<'a> Scanner<'a> {
    /// Create a scanner writing into `store`.
    pub fn new(store: &'a mut IndexStore, config: ScannerConfig) -> Self {
        let hasher = Hasher::new().with_buffer_size(config.buffer_size);
        Self {
            store,
            config,
            hasher,
        }
    }

    fn is_shutdown_requested(&self) -> bool {
        self.config
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Bring the index up to date with everything below `root`.
    ///
    /// Unchanged files keep their stored hash. New, changed and previously
    /// unhashed files are hashed in parallel. Once every chunk is committed,
    /// records under `root` that were not observed are archived.
    ///
    /// # Errors
    ///
    /// [`ScanError::NotFound`] / [`ScanError::NotADirectory`] for a bad root,
    /// [`ScanError::Interrupted`] on shutdown (reconciliation is skipped),
    /// [`ScanError::Store`] if the index rejects a write.
    pub fn scan(&mut self, root: &Path) -> Result<ScanSummary, ScanError> {
        let root = resolve_root(root)?;
        let scan_id = self.store.begin_scan(&root)?;
        log::info!("Scanning {} (scan {})", root.display(), scan_id);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.hash_threads.max(1))
            .build()?;

        let mut walker = Walker::new(&root);
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let batch_size = self.config.batch_size.max(1);
        let mut summary = ScanSummary::default();
        let mut chunk: Vec<FileEntry> = Vec::with_capacity(batch_size);

        for entry in walker.walk() {
            match entry {
                Ok(file) => {
                    chunk.push(file);
                    if chunk.len() >= batch_size {
                        self.process_chunk(&pool, std::mem::take(&mut chunk), scan_id, &mut summary)?;
                    }
                }
                Err(e) => {
                    log::debug!("Counting walk failure: {}", e);
                    summary.files_failed += 1;
                }
            }
        }
        if !chunk.is_empty() {
            self.process_chunk(&pool, chunk, scan_id, &mut summary)?;
        }

        if self.is_shutdown_requested() {
            log::warn!("Scan of {} interrupted; skipping reconcile", root.display());
            return Err(ScanError::Interrupted);
        }

        let stats = self.store.reconcile(&root, scan_id)?;
        summary.records_archived = stats.archived;
        summary.records_dropped = stats.dropped;

        log::info!(
            "Scan of {} complete: {} files, {} hashed, {} failed, {} archived",
            root.display(),
            summary.files_scanned,
            summary.files_hashed,
            summary.files_failed,
            summary.records_archived
        );
        Ok(summary)
    }

    fn process_chunk(
        &mut self,
        pool: &rayon::ThreadPool,
        chunk: Vec<FileEntry>,
        scan_id: i64,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        if self.is_shutdown_requested() {
            return Err(ScanError::Interrupted);
        }

        summary.files_scanned += chunk.len();

        let mut unchanged = Vec::new();
        let mut stale = Vec::new();
        for file in chunk {
            match self.store.get(&file.path)? {
                Some(record) if record.is_fresh(&file.stat) => {
                    log::trace!("Reusing hash for {}", file.path.display());
                    unchanged.push(file.path);
                }
                _ => stale.push(file),
            }
        }

        let hasher = &self.hasher;
        let records: Vec<FileRecord> = pool.install(|| {
            stale
                .into_par_iter()
                .map(|file| {
                    let hash = match hasher.full_hash(&file.path) {
                        Ok(hash) => Some(hash),
                        Err(e) => {
                            log::warn!("Failed to hash {}: {}", file.path.display(), e);
                            None
                        }
                    };
                    FileRecord::new(file.path, hash, file.stat)
                })
                .collect()
        });

        let failed = records.iter().filter(|r| r.hash.is_none()).count();
        summary.files_hashed += records.len() - failed;
        summary.files_failed += failed;

        self.store.record_scan_batch(&records, &unchanged, scan_id)?;
        log::debug!(
            "Committed chunk: {} hashed, {} unchanged, {} failed",
            records.len() - failed,
            unchanged.len(),
            failed
        );
        Ok(())
    }
}

/// Make `root` absolute and check that it is an existing directory.
fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let absolute = std::path::absolute(root).map_err(|e| ScanError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    match std::fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Ok(absolute),
        Ok(_) => Err(ScanError::NotADirectory(absolute)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ScanError::NotFound(absolute)),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ScanError::PermissionDenied(absolute))
        }
        Err(e) => Err(ScanError::Io {
            path: absolute,
            source: e,
        }),
    }
}
