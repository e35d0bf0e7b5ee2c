//! File actions module.
//!
//! This module provides functionality for:
//! - Validating a delete set against the keep set and the live filesystem
//! - Moving duplicates below a destination directory, or unlinking them
//! - Batched index updates with per-file progress reporting
//!
//! # Validation
//!
//! [`validate`] runs every check before anything is touched. A path in both
//! sets, a missing file, a directory or a symbolic link rejects the whole
//! delete set.
//!
//! # Execution
//!
//! [`Executor`] processes the delete set in batches (20 files by default).
//! Each completed batch is retired from the index in one transaction; the
//! first failure stops the run.
//!
//! ```no_run
//! use dupestore::actions::{plan, ExecuteConfig, Executor};
//! use dupestore::duplicates::DupeIndex;
//! use dupestore::store::IndexStore;
//! use std::path::Path;
//!
//! let mut store = IndexStore::open(Path::new("index.sqlite")).unwrap();
//! let keep = DupeIndex::new();
//! let delete = DupeIndex::new();
//!
//! for path in plan(&keep, &delete).unwrap() {
//!     println!("would remove {}", path.display());
//! }
//! let report = Executor::new(&mut store, ExecuteConfig::delete()).execute(&delete, None);
//! assert!(report.is_complete());
//! ```

pub mod execute;
pub mod validate;

pub use execute::{
    plan, target_path, unique_target, validate_and_execute, Disposal, ExecuteConfig,
    ExecuteError, ExecuteProgress, ExecutionReport, Executor, FileOutcome, FileResult,
    DEFAULT_BATCH_SIZE,
};
pub use validate::{validate, ValidationError};
