//! Record definitions for the content index.
//!
//! A [`FileRecord`] pairs a path with its content digest and the stat
//! signature that was observed when the digest was computed. The signature
//! decides whether a stored digest can be trusted on the next scan.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a hex-encoded BLAKE3 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Error returned when text is not a valid content digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid content hash: {0:?}")]
pub struct HashParseError(pub String);

/// Lowercase hex digest of a file's full content.
///
/// Ordering is plain string ordering, which keeps duplicate buckets and
/// partition output in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a hex digest, accepting either case.
    ///
    /// # Errors
    ///
    /// Returns [`HashParseError`] unless the text is exactly 64 hex digits.
    pub fn from_hex(text: &str) -> Result<Self, HashParseError> {
        if text.len() == HASH_HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(text.to_ascii_lowercase()))
        } else {
            Err(HashParseError(text.to_string()))
        }
    }

    /// Build from raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        blake3::Hash::from_bytes(*bytes).into()
    }

    /// The digest as lowercase hex.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..10]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.to_hex().as_str().to_owned())
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// The stat fields that decide whether a stored digest is still valid.
///
/// Timestamps are nanoseconds since the Unix epoch. Any difference in any
/// field invalidates the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatSignature {
    /// File size in bytes
    pub size: u64,
    /// Inode number (0 where the platform has none)
    pub inode: u64,
    /// Last modification time
    pub mtime: i64,
    /// Last status change time (creation time on non-Unix platforms)
    pub ctime: i64,
}

impl StatSignature {
    /// Read the signature from file metadata.
    #[must_use]
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            size: metadata.len(),
            inode: metadata.ino(),
            mtime: metadata
                .mtime()
                .saturating_mul(1_000_000_000)
                .saturating_add(metadata.mtime_nsec()),
            ctime: metadata
                .ctime()
                .saturating_mul(1_000_000_000)
                .saturating_add(metadata.ctime_nsec()),
        }
    }

    /// Read the signature from file metadata.
    #[must_use]
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let modified = metadata.modified().ok();
        let created = metadata.created().ok().or(modified);
        Self {
            size: metadata.len(),
            inode: 0,
            mtime: modified.map_or(0, system_time_nanos),
            ctime: created.map_or(0, system_time_nanos),
        }
    }
}

/// Convert a `SystemTime` into signed nanoseconds since the epoch.
#[must_use]
pub fn system_time_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// One row of the content index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path; unique within a collection
    pub path: PathBuf,
    /// Content digest, absent until hashing succeeds
    pub hash: Option<ContentHash>,
    /// Stat signature observed alongside the digest
    pub stat: StatSignature,
}

impl FileRecord {
    /// Create a record.
    #[must_use]
    pub fn new(path: PathBuf, hash: Option<ContentHash>, stat: StatSignature) -> Self {
        Self { path, hash, stat }
    }

    /// Whether the stored digest can be reused for a file with `current` stats.
    #[must_use]
    pub fn is_fresh(&self, current: &StatSignature) -> bool {
        self.hash.is_some() && self.stat == *current
    }

    /// Whether this record lies at or below `root`.
    #[must_use]
    pub fn is_under(&self, root: &Path) -> bool {
        self.path.starts_with(root)
    }
}
