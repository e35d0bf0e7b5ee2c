//! Pre-flight checks for a delete set.
//!
//! Every check completes before anything is touched: a single bad candidate
//! rejects the whole set, so a partially valid list is never executed.
//!
//! Keep paths are checked as strictly as delete paths. A keep copy that
//! vanished after the index was read would otherwise leave its hash with no
//! surviving file once the delete side runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::duplicates::DupeIndex;
use crate::store::ContentHash;

/// Why a delete set was rejected.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A `(hash, path)` pair is marked both keep and delete.
    #[error("{path} ({hash}) is selected for both keep and delete")]
    InvariantViolation {
        /// Offending content hash
        hash: ContentHash,
        /// Offending path
        path: PathBuf,
    },

    /// A hash selected for deletion has no keep copy.
    #[error("{path} ({hash}) would lose its last copy")]
    NoSurvivor {
        /// Content hash without a keep path
        hash: ContentHash,
        /// First delete path of that hash
        path: PathBuf,
    },

    /// A keep or delete path no longer exists.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// A keep or delete path is a directory or other non-regular file.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// A keep or delete path is a symbolic link.
    #[error("symbolic link in selection: {0}")]
    IsSymlink(PathBuf),

    /// The candidate could not be inspected.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ValidationError {
    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::InvariantViolation { path, .. }
            | Self::NoSurvivor { path, .. }
            | Self::NotFound(path)
            | Self::NotAFile(path)
            | Self::IsSymlink(path)
            | Self::Io { path, .. } => path,
        }
    }
}

/// Check `delete` against `keep` and against the live filesystem.
///
/// Runs, in order:
///
/// 1. No `(hash, path)` pair may be on both sides.
/// 2. Every path on either side, keep first, must still be a regular file.
///    Links are inspected without being followed.
/// 3. Every hash in `delete` must have at least one keep path.
///
/// # Errors
///
/// The first failing check, in index iteration order.
///
/// # Example
///
/// ```no_run
/// use dupestore::actions::validate;
/// use dupestore::duplicates::DupeIndex;
/// use dupestore::store::ContentHash;
/// use std::path::PathBuf;
///
/// let h = ContentHash::from_bytes(&[1; 32]);
/// let keep = DupeIndex::from_pairs([(h.clone(), PathBuf::from("/a/x"))]);
/// let delete = DupeIndex::from_pairs([(h, PathBuf::from("/a/x copy"))]);
/// validate(&keep, &delete).unwrap();
/// ```
pub fn validate(keep: &DupeIndex, delete: &DupeIndex) -> Result<(), ValidationError> {
    for (hash, path) in delete.iter() {
        if keep.contains(hash, path) {
            log::error!(
                "Internal consistency failure: {} is in both keep and delete",
                path.display()
            );
            return Err(ValidationError::InvariantViolation {
                hash: hash.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    for path in keep.paths().chain(delete.paths()) {
        check_candidate(path)?;
    }

    for (hash, paths) in delete.buckets() {
        if !keep.contains_key(hash) {
            let path = paths.first().cloned().unwrap_or_default();
            log::error!("No keep copy for {} ({})", path.display(), hash.short());
            return Err(ValidationError::NoSurvivor {
                hash: hash.clone(),
                path,
            });
        }
    }

    log::debug!(
        "Validated {} delete candidates against {} keep paths",
        delete.len(),
        keep.len()
    );
    Ok(())
}

fn check_candidate(path: &Path) -> Result<(), ValidationError> {
    let metadata = fs::symlink_metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ValidationError::NotFound(path.to_path_buf()),
        _ => ValidationError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        Err(ValidationError::IsSymlink(path.to_path_buf()))
    } else if !file_type.is_file() {
        Err(ValidationError::NotAFile(path.to_path_buf()))
    } else {
        Ok(())
    }
}
