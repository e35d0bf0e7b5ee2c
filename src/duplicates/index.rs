//! Ordered hash → paths multimap.
//!
//! # Overview
//!
//! [`DupeIndex`] maps each [`ContentHash`] to a duplicate-free list of paths
//! that preserves insertion order. Keys iterate in ascending hash order, so
//! every traversal (and everything derived from one) is deterministic.
//!
//! Empty buckets never exist: removing the last path of a hash drops the key.
//!
//! # Example
//!
//! ```
//! use dupestore::duplicates::DupeIndex;
//! use dupestore::store::ContentHash;
//! use std::path::{Path, PathBuf};
//!
//! let h = ContentHash::from_bytes(&[1; 32]);
//! let mut index = DupeIndex::new();
//! assert!(index.add(h.clone(), PathBuf::from("/a/x")));
//! assert!(!index.add(h.clone(), PathBuf::from("/a/x")));
//! assert!(index.add(h.clone(), PathBuf::from("/b/y")));
//!
//! assert_eq!(index.len(), 2);
//! assert_eq!(index.key_count(), 1);
//! assert!(index.contains(&h, Path::new("/b/y")));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::store::{ContentHash, IndexStore, StoreResult};

/// Multimap from content hash to the paths holding that content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DupeIndex {
    buckets: BTreeMap<ContentHash, Vec<PathBuf>>,
}

impl DupeIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(hash, path)` pairs. Repeated pairs collapse.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ContentHash, PathBuf)>,
    {
        let mut index = Self::new();
        for (hash, path) in pairs {
            index.add(hash, path);
        }
        index
    }

    /// Build from the store's active duplicates. Only hashes held by at
    /// least two paths are included.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn from_store(store: &IndexStore) -> StoreResult<Self> {
        let mut index = Self::from_pairs(store.get_duplicates()?);
        index.buckets.retain(|_, paths| paths.len() >= 2);
        log::debug!(
            "Built duplicate index: {} hashes, {} paths",
            index.key_count(),
            index.len()
        );
        Ok(index)
    }

    /// Append `path` under `hash` unless already present. Returns whether
    /// the index changed.
    pub fn add(&mut self, hash: ContentHash, path: PathBuf) -> bool {
        let bucket = self.buckets.entry(hash).or_default();
        if bucket.contains(&path) {
            false
        } else {
            bucket.push(path);
            true
        }
    }

    /// Remove one pair. Drops the key when its bucket empties. Returns
    /// whether the pair was present.
    pub fn discard(&mut self, hash: &ContentHash, path: &Path) -> bool {
        let Some(bucket) = self.buckets.get_mut(hash) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|p| p == path) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(hash);
        }
        true
    }

    /// Drop a whole bucket, returning its paths.
    pub fn remove_key(&mut self, hash: &ContentHash) -> Option<Vec<PathBuf>> {
        self.buckets.remove(hash)
    }

    /// Add every pair of `other`.
    pub fn merge_all(&mut self, other: &DupeIndex) {
        for (hash, path) in other.iter() {
            self.add(hash.clone(), path.to_path_buf());
        }
    }

    /// Add the pairs of `other` under `hash` only.
    pub fn merge_existing_key(&mut self, other: &DupeIndex, hash: &ContentHash) {
        if let Some(paths) = other.bucket(hash) {
            for path in paths {
                self.add(hash.clone(), path.clone());
            }
        }
    }

    /// Hashes in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &ContentHash> + '_ {
        self.buckets.keys()
    }

    /// Buckets in ascending hash order.
    pub fn buckets(&self) -> impl Iterator<Item = (&ContentHash, &[PathBuf])> + '_ {
        self.buckets.iter().map(|(h, paths)| (h, paths.as_slice()))
    }

    /// Every `(hash, path)` pair, hash-ascending then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &Path)> + '_ {
        self.buckets
            .iter()
            .flat_map(|(hash, paths)| paths.iter().map(move |p| (hash, p.as_path())))
    }

    /// Paths recorded for `hash`.
    #[must_use]
    pub fn bucket(&self, hash: &ContentHash) -> Option<&[PathBuf]> {
        self.buckets.get(hash).map(Vec::as_slice)
    }

    /// Whether the pair is present.
    #[must_use]
    pub fn contains(&self, hash: &ContentHash, path: &Path) -> bool {
        self.buckets
            .get(hash)
            .is_some_and(|paths| paths.iter().any(|p| p == path))
    }

    /// Whether `hash` has a bucket.
    #[must_use]
    pub fn contains_key(&self, hash: &ContentHash) -> bool {
        self.buckets.contains_key(hash)
    }

    /// Number of `(hash, path)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Number of distinct hashes.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// All paths, hash-ascending then insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.iter().map(|(_, p)| p)
    }

    /// Number of indexed paths per parent directory.
    #[must_use]
    pub fn directory_counts(&self) -> HashMap<PathBuf, usize> {
        let mut counts = HashMap::new();
        for path in self.paths() {
            let dir = path.parent().unwrap_or(path).to_path_buf();
            *counts.entry(dir).or_insert(0) += 1;
        }
        counts
    }

    /// The `n` directories holding the most indexed paths, highest first,
    /// ties broken by path.
    #[must_use]
    pub fn most_common_dirs(&self, n: usize) -> Vec<(PathBuf, usize)> {
        let mut counts: Vec<_> = self.directory_counts().into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }
}

impl<'a> IntoIterator for &'a DupeIndex {
    type Item = (&'a ContentHash, &'a [PathBuf]);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.buckets())
    }
}

impl FromIterator<(ContentHash, PathBuf)> for DupeIndex {
    fn from_iter<T: IntoIterator<Item = (ContentHash, PathBuf)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
