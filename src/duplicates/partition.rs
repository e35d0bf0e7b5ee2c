//! Keep/delete selection over a duplicate index.
//!
//! # Overview
//!
//! [`partition`] splits a [`DupeIndex`] into two disjoint indexes: paths to
//! delete and paths to keep. Selection is driven by a scope directory, a
//! filename regex and three policy flags (see [`PartitionOptions`]).
//!
//! ## Steps
//!
//! 1. Pairs are split into in-scope (below `scope_dir`) and out-of-scope.
//! 2. Out-of-scope hashes without an in-scope copy are dropped.
//! 3. In-scope pairs are split by whether the regex finds a match in the
//!    file name.
//! 4. Matched pairs go to delete and unmatched to keep, or the reverse when
//!    `match_means_delete` is off. With `include_global`, out-of-scope
//!    copies join the keep side (or the delete side in reverse mode).
//!    Without it, a lone in-scope delete candidate with no local keep is
//!    left alone.
//! 5. Safety pass: a hash with no keep copy has its whole delete bucket
//!    moved to keep. With `autoselect`, the path whose file name sorts
//!    first goes back to delete.
//!
//! The function is pure and touches no filesystem state.
//!
//! # Example
//!
//! ```
//! use dupestore::duplicates::{partition, DupeIndex, PartitionOptions};
//! use dupestore::store::ContentHash;
//! use regex::Regex;
//! use std::path::PathBuf;
//!
//! let h = ContentHash::from_bytes(&[7; 32]);
//! let full = DupeIndex::from_pairs([
//!     (h.clone(), PathBuf::from("/a/x")),
//!     (h.clone(), PathBuf::from("/a/y")),
//!     (h.clone(), PathBuf::from("/b/z")),
//! ]);
//!
//! let options = PartitionOptions::new("/a", Regex::new("y").unwrap());
//! let result = partition(&full, &options);
//!
//! assert_eq!(result.delete.bucket(&h).unwrap(), &[PathBuf::from("/a/y")]);
//! assert_eq!(result.keep.len(), 2);
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::index::DupeIndex;
use crate::store::ContentHash;

/// Selection policy for [`partition`].
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// Directory whose contents are candidates for deletion
    pub scope_dir: PathBuf,
    /// Searched for in each file name (not anchored)
    pub pattern: Regex,
    /// Matching names are deleted when true, kept when false
    pub match_means_delete: bool,
    /// Whether copies outside `scope_dir` take part in the decision
    pub include_global: bool,
    /// Whether to delete one copy of a hash when every copy was selected
    pub autoselect: bool,
}

impl PartitionOptions {
    /// Options with `match_means_delete` and `include_global` on and
    /// `autoselect` off.
    #[must_use]
    pub fn new(scope_dir: impl Into<PathBuf>, pattern: Regex) -> Self {
        Self {
            scope_dir: scope_dir.into(),
            pattern,
            match_means_delete: true,
            include_global: true,
            autoselect: false,
        }
    }

    #[must_use]
    pub fn with_match_means_delete(mut self, value: bool) -> Self {
        self.match_means_delete = value;
        self
    }

    #[must_use]
    pub fn with_include_global(mut self, value: bool) -> Self {
        self.include_global = value;
        self
    }

    #[must_use]
    pub fn with_autoselect(mut self, value: bool) -> Self {
        self.autoselect = value;
        self
    }

    fn name_matches(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.pattern.is_match(&name)
    }
}

/// Disjoint keep/delete selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Paths selected for removal
    pub delete: DupeIndex,
    /// Paths that stay
    pub keep: DupeIndex,
}

impl Partition {
    /// Pairs present on both sides. Empty for any partition produced by
    /// [`partition`].
    #[must_use]
    pub fn check_disjoint(&self) -> Vec<(ContentHash, PathBuf)> {
        self.delete
            .iter()
            .filter(|(hash, path)| self.keep.contains(hash, path))
            .map(|(hash, path)| (hash.clone(), path.to_path_buf()))
            .collect()
    }

    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.delete.len()
    }

    #[must_use]
    pub fn keep_count(&self) -> usize {
        self.keep.len()
    }

    /// Every hash on either side, ascending.
    #[must_use]
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.delete
            .keys()
            .chain(self.keep.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether nothing is selected for deletion.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty()
    }
}

/// Select which duplicates to delete and which to keep.
#[must_use]
pub fn partition(full: &DupeIndex, options: &PartitionOptions) -> Partition {
    let mut in_scope = DupeIndex::new();
    let mut out_of_scope = DupeIndex::new();
    for (hash, path) in full.iter() {
        if path.starts_with(&options.scope_dir) {
            in_scope.add(hash.clone(), path.to_path_buf());
        } else {
            out_of_scope.add(hash.clone(), path.to_path_buf());
        }
    }

    let unrelated: Vec<ContentHash> = out_of_scope
        .keys()
        .filter(|hash| !in_scope.contains_key(hash))
        .cloned()
        .collect();
    for hash in &unrelated {
        out_of_scope.remove_key(hash);
    }

    let mut matched = DupeIndex::new();
    let mut unmatched = DupeIndex::new();
    for (hash, path) in in_scope.iter() {
        if options.name_matches(path) {
            matched.add(hash.clone(), path.to_path_buf());
        } else {
            unmatched.add(hash.clone(), path.to_path_buf());
        }
    }

    let (mut delete, mut keep) = if options.match_means_delete {
        let (mut delete, mut keep) = (matched, unmatched);
        if options.include_global {
            keep.merge_all(&out_of_scope);
        } else {
            let lone: Vec<ContentHash> = delete
                .buckets()
                .filter(|(hash, paths)| !keep.contains_key(hash) && paths.len() == 1)
                .map(|(hash, _)| hash.clone())
                .collect();
            for hash in &lone {
                delete.remove_key(hash);
            }
        }
        (delete, keep)
    } else {
        let (keep, mut delete) = (matched, unmatched);
        if options.include_global {
            delete.merge_all(&out_of_scope);
        }
        (delete, keep)
    };

    safety_pass(&mut delete, &mut keep, options.autoselect);

    log::debug!(
        "Partitioned {} pairs: {} to delete, {} to keep",
        full.len(),
        delete.len(),
        keep.len()
    );
    Partition { delete, keep }
}

/// Give every hash in `delete` at least one keep copy.
fn safety_pass(delete: &mut DupeIndex, keep: &mut DupeIndex, autoselect: bool) {
    let snapshot = delete.clone();

    for hash in snapshot.keys() {
        if keep.contains_key(hash) {
            continue;
        }

        keep.merge_existing_key(&snapshot, hash);
        delete.remove_key(hash);

        let Some(bucket) = snapshot.bucket(hash) else {
            continue;
        };
        if !autoselect || bucket.len() < 2 {
            log::debug!("Keeping every copy of {}", hash.short());
            continue;
        }

        if let Some(victim) = first_by_name(bucket) {
            keep.discard(hash, victim);
            delete.add(hash.clone(), victim.to_path_buf());
            log::debug!("Autoselected {} for {}", victim.display(), hash.short());
        }
    }
}

/// The path whose file name sorts first, ties broken by full path.
fn first_by_name(paths: &[PathBuf]) -> Option<&Path> {
    paths
        .iter()
        .min_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)))
        .map(PathBuf::as_path)
}
