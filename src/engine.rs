//! High-level entry point tying the pipeline together.
//!
//! # Example
//!
//! ```no_run
//! use dupestore::actions::Disposal;
//! use dupestore::config::Config;
//! use dupestore::duplicates::PartitionOptions;
//! use dupestore::engine::Dedupe;
//! use regex::Regex;
//! use std::path::Path;
//!
//! let mut dedupe = Dedupe::open(Config::load(None).unwrap()).unwrap();
//! dedupe.scan(Path::new("/srv/media")).unwrap();
//!
//! let full = dedupe.duplicate_index().unwrap();
//! let options = PartitionOptions::new("/srv/media/inbox", Regex::new("copy").unwrap());
//! let selection = dedupe.partition(&full, &options);
//!
//! for path in dedupe.plan(&selection).unwrap() {
//!     println!("would remove {}", path.display());
//! }
//! let report = dedupe
//!     .validate_and_execute(&selection, Disposal::Delete, None)
//!     .unwrap();
//! println!("{}", report.summary());
//! ```

use std::path::{Path, PathBuf};

use crate::actions::{self, Disposal, ExecuteProgress, ExecutionReport};
use crate::config::Config;
use crate::duplicates::{self, DupeIndex, Partition, PartitionOptions};
use crate::error::{Error, Result};
use crate::scanner::{ScanError, ScanSummary, Scanner};
use crate::signal::ShutdownHandler;
use crate::store::{IndexStore, ReconcileStats, StoreCounts, StoreError};

/// One open index plus the settings used to drive it.
#[derive(Debug)]
pub struct Dedupe {
    store: IndexStore,
    config: Config,
    shutdown: ShutdownHandler,
}

impl Dedupe {
    /// Open the database named by `config`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for invalid settings, [`Error::Store`] if the
    /// database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let store = config.open_store()?;
        Ok(Self::with_store(store, config))
    }

    /// Wrap an already open store.
    #[must_use]
    pub fn with_store(store: IndexStore, config: Config) -> Self {
        Self {
            store,
            config,
            shutdown: ShutdownHandler::new(),
        }
    }

    /// Share a shutdown handler with the scanner and executor.
    #[must_use]
    pub fn with_shutdown(mut self, handler: ShutdownHandler) -> Self {
        self.shutdown = handler;
        self
    }

    #[must_use]
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index everything below `root`.
    ///
    /// # Errors
    ///
    /// See [`Scanner::scan`].
    pub fn scan(&mut self, root: &Path) -> Result<ScanSummary> {
        let config = self
            .config
            .scanner_config()
            .with_shutdown_flag(self.shutdown.get_flag());
        Ok(Scanner::new(&mut self.store, config).scan(root)?)
    }

    /// Current duplicates in the active collection.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn duplicate_index(&self) -> Result<DupeIndex> {
        Ok(DupeIndex::from_store(&self.store)?)
    }

    /// Split `full` into keep and delete sets.
    #[must_use]
    pub fn partition(&self, full: &DupeIndex, options: &PartitionOptions) -> Partition {
        duplicates::partition(full, options)
    }

    /// Validate the delete side of `selection`, then remove it.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if any check fails; nothing is touched then.
    /// Failures during execution are recorded in the report instead.
    pub fn validate_and_execute(
        &mut self,
        selection: &Partition,
        disposal: Disposal,
        progress: Option<&dyn ExecuteProgress>,
    ) -> Result<ExecutionReport> {
        let config = self
            .config
            .execute_config(disposal)
            .with_shutdown_flag(self.shutdown.get_flag());
        Ok(actions::validate_and_execute(
            &mut self.store,
            &selection.keep,
            &selection.delete,
            config,
            progress,
        )?)
    }

    /// Dry run of [`Self::validate_and_execute`].
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if any check fails.
    pub fn plan(&self, selection: &Partition) -> Result<Vec<PathBuf>> {
        Ok(actions::plan(&selection.keep, &selection.delete)?)
    }

    /// Garbage-collect the archive.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn gc(&mut self) -> Result<usize> {
        Ok(self.store.gc_archive()?)
    }

    /// Forget every active record.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn wipe_active(&mut self) -> Result<usize> {
        Ok(self.store.wipe_active()?)
    }

    /// Re-run reconciliation for `root` against its most recent scan.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NotFound`](crate::error::ErrorKind::NotFound) if `root`
    /// was never scanned.
    pub fn reconcile(&mut self, root: &Path) -> Result<ReconcileStats> {
        let root = std::path::absolute(root).map_err(|e| {
            Error::Scan(ScanError::Io {
                path: root.to_path_buf(),
                source: e,
            })
        })?;
        let scan_id = self
            .store
            .last_scan(&root)?
            .ok_or_else(|| StoreError::NotFound(root.clone()))?;
        Ok(self.store.reconcile(&root, scan_id)?)
    }

    /// Directories holding the most duplicate copies, largest first.
    ///
    /// Useful for picking a scope directory before partitioning.
    ///
    /// # Returns
    ///
    /// Up to `n` `(directory, copies)` pairs. Ties are ordered by path.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn most_common_dirs(&self, n: usize) -> Result<Vec<(PathBuf, usize)>> {
        Ok(self.duplicate_index()?.most_common_dirs(n))
    }

    /// Record counts for status output.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(self.store.counts()?)
    }
}
