//! Directory walker built on `walkdir`.
//!
//! # Overview
//!
//! [`Walker`] yields one [`FileEntry`] per regular file below a root. Links
//! are never followed and never reported, directories are descended into
//! but not reported, and paths that are not valid UTF-8 are skipped with a
//! warning. Errors are yielded in-band so one unreadable directory does not
//! stop the walk.
//!
//! # Example
//!
//! ```no_run
//! use dupestore::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/srv/media"));
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.stat.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{FileEntry, ScanError};
use crate::store::StatSignature;

/// Recursive file discovery for one root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to descend into. It is not checked here; a
    ///   missing root surfaces as the first item of [`Self::walk`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupestore::scanner::Walker;
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."));
    /// ```
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once `flag` is set.
    ///
    /// # Arguments
    ///
    /// * `flag` - Atomic boolean flag shared across threads
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

    /// Walk the tree in sorted order.
    ///
    /// # Returns
    ///
    /// An iterator of [`FileEntry`] values for regular files, interleaved
    /// with the errors met along the way.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupestore::scanner::Walker;
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."));
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} files", files.len());
    /// ```
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        walk_dir
            .into_iter()
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_symlink() {
                        log::trace!("Skipping symlink: {}", entry.path().display());
                        return None;
                    }
                    if !file_type.is_file() {
                        return None;
                    }
                    if entry.path().to_str().is_none() {
                        log::warn!(
                            "Skipping path that is not valid UTF-8: {}",
                            entry.path().display()
                        );
                        return None;
                    }

                    match entry.metadata() {
                        Ok(metadata) => Some(Ok(FileEntry {
                            stat: StatSignature::from_metadata(&metadata),
                            path: entry.into_path(),
                        })),
                        Err(e) => Some(Err(self.walk_error(e))),
                    }
                }
                Err(e) => Some(Err(self.walk_error(e))),
            })
    }

    fn walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        log::warn!("Walker error for {}: {}", path.display(), error);

        match error.into_io_error() {
            Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionDenied(path)
            }
            Some(io) => ScanError::Io { path, source: io },
            None => ScanError::Io {
                path,
                source: std::io::Error::other("filesystem loop detected"),
            },
        }
    }
}
