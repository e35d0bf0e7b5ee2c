//! SQLite-backed content index.
//!
//! Two collections share one schema: `active` mirrors what the most recent
//! scans observed on disk, `archive` keeps hashed records for paths that
//! disappeared. Every mutating method runs inside a single transaction, so a
//! batch either lands completely or not at all.

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use thiserror::Error;

use super::entry::{ContentHash, FileRecord, HashParseError, StatSignature};

/// Current on-disk schema version (`PRAGMA user_version`).
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS active (
    path      TEXT PRIMARY KEY,
    hash      TEXT,
    size      INTEGER NOT NULL,
    inode     INTEGER NOT NULL,
    mtime     INTEGER NOT NULL,
    ctime     INTEGER NOT NULL,
    seen_scan INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS archive (
    path  TEXT PRIMARY KEY,
    hash  TEXT NOT NULL,
    size  INTEGER NOT NULL,
    inode INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    ctime INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS roots (
    path      TEXT PRIMARY KEY,
    last_scan INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_active_hash ON active(hash);
INSERT OR IGNORE INTO meta (key, value) VALUES ('scan_counter', 0);
";

/// Matches `path` itself or anything below it. Bound as ?1 = path,
/// ?2 = path with trailing separator, ?3 = character length of ?2.
const UNDER_ROOT: &str = "(path = ?1 OR substr(path, 1, ?3) = ?2)";

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or its schema could not be created.
    #[error("index store unavailable at {path}: {source}")]
    Unavailable {
        /// Database location
        path: PathBuf,
        /// The underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// No record exists for the path.
    #[error("no index record for {0}")]
    NotFound(PathBuf),

    /// Only hashed records may be archived.
    #[error("cannot archive {0}: record has no content hash")]
    MissingHash(PathBuf),

    /// Paths are stored as UTF-8 text.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// A stored hash failed validation.
    #[error("corrupt hash stored for {path}: {source}")]
    CorruptHash {
        /// Record path
        path: PathBuf,
        /// Validation failure
        #[source]
        source: HashParseError,
    },

    /// Any other SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Hashed records moved to the archive
    pub archived: usize,
    /// Unhashed records removed outright
    pub dropped: usize,
}

/// Row counts for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Records in the active collection
    pub active: usize,
    /// Active records with a content hash
    pub hashed: usize,
    /// Records in the archive collection
    pub archived: usize,
    /// Registered scan roots
    pub roots: usize,
}

/// Persistent content-addressed index.
///
/// Holds a single connection; all writes go through `&mut self`, which keeps
/// access serialized within one process.
pub struct IndexStore {
    conn: Connection,
    location: PathBuf,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl IndexStore {
    /// Open or create the index at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file is not a usable SQLite
    /// database or the schema cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let unavailable = |source| StoreError::Unavailable {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(unavailable)?;
        Self::initialize(&conn).map_err(unavailable)?;
        log::debug!("Opened index store at {}", path.display());

        Ok(Self {
            conn,
            location: path.to_path_buf(),
        })
    }

    /// Open a throwaway in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if SQLite cannot initialize.
    pub fn open_in_memory() -> StoreResult<Self> {
        let location = PathBuf::from(":memory:");
        let unavailable = |source| StoreError::Unavailable {
            path: location.clone(),
            source,
        };

        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::initialize(&conn).map_err(unavailable)?;

        Ok(Self { conn, location })
    }

    fn initialize(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            log::warn!(
                "Index schema version {} is newer than supported version {}",
                version,
                SCHEMA_VERSION
            );
        }

        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Location of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    // ==================== Reads ====================

    /// Fetch the active record for `path`.
    pub fn get(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let key = path_str(path)?;
        let raw = self
            .conn
            .query_row(
                "SELECT path, hash, size, inode, mtime, ctime FROM active WHERE path = ?1",
                params![key],
                raw_record,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Fetch the archived record for `path`.
    pub fn get_archived(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let key = path_str(path)?;
        let raw = self
            .conn
            .query_row(
                "SELECT path, hash, size, inode, mtime, ctime FROM archive WHERE path = ?1",
                params![key],
                raw_record,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// All active records at or below `root`, ordered by path.
    pub fn active_under(&self, root: &Path) -> StoreResult<Vec<FileRecord>> {
        self.records_under("active", root)
    }

    /// All archived records at or below `root`, ordered by path.
    pub fn archived_under(&self, root: &Path) -> StoreResult<Vec<FileRecord>> {
        self.records_under("archive", root)
    }

    fn records_under(&self, table: &str, root: &Path) -> StoreResult<Vec<FileRecord>> {
        let (exact, prefix, len) = root_bounds(root)?;
        let sql = format!(
            "SELECT path, hash, size, inode, mtime, ctime FROM {table} \
             WHERE {UNDER_ROOT} ORDER BY path"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![exact, prefix, len], raw_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Every `(hash, path)` pair in the active collection whose hash occurs
    /// at least twice, ordered by hash then path. Archived records are never
    /// included.
    pub fn get_duplicates(&self) -> StoreResult<Vec<(ContentHash, PathBuf)>> {
        let mut stmt = self.conn.prepare(
            "SELECT hash, path FROM active \
             WHERE hash IN ( \
                 SELECT hash FROM active WHERE hash IS NOT NULL \
                 GROUP BY hash HAVING COUNT(*) > 1) \
             ORDER BY hash, path",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(hash, path)| {
                let path = PathBuf::from(path);
                ContentHash::from_hex(&hash)
                    .map(|h| (h, path.clone()))
                    .map_err(|source| StoreError::CorruptHash { path, source })
            })
            .collect()
    }

    /// Registered scan roots, ordered by path.
    pub fn roots(&self) -> StoreResult<Vec<PathBuf>> {
        let mut stmt = self.conn.prepare("SELECT path FROM roots ORDER BY path")?;
        let roots = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roots.into_iter().map(PathBuf::from).collect())
    }

    /// Id of the most recent scan of `root`, if it was ever scanned.
    pub fn last_scan(&self, root: &Path) -> StoreResult<Option<i64>> {
        let key = path_str(root)?;
        Ok(self
            .conn
            .query_row(
                "SELECT last_scan FROM roots WHERE path = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Row counts for both collections.
    pub fn counts(&self) -> StoreResult<StoreCounts> {
        let count = |sql: &str| -> StoreResult<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(StoreCounts {
            active: count("SELECT COUNT(*) FROM active")?,
            hashed: count("SELECT COUNT(*) FROM active WHERE hash IS NOT NULL")?,
            archived: count("SELECT COUNT(*) FROM archive")?,
            roots: count("SELECT COUNT(*) FROM roots")?,
        })
    }

    // ==================== Writes ====================

    /// Insert or replace the active record for `record.path`.
    pub fn upsert(&mut self, record: &FileRecord) -> StoreResult<()> {
        self.upsert_batch(std::slice::from_ref(record)).map(|_| ())
    }

    /// Insert or replace many active records in one transaction.
    ///
    /// A path that was archived moves back to the active collection.
    pub fn upsert_batch(&mut self, records: &[FileRecord]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        upsert_in(&tx, records, 0)?;
        tx.commit()?;
        Ok(records.len())
    }

    /// Allocate a scan id for `root` and register the root.
    ///
    /// # Returns
    ///
    /// A scan id strictly greater than every id handed out before, across
    /// all roots. Nested roots share the counter, so reconciliation can tell
    /// which of two overlapping scans saw a path last.
    pub fn begin_scan(&mut self, root: &Path) -> StoreResult<i64> {
        let key = path_str(root)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE meta SET value = value + 1 WHERE key = 'scan_counter'",
            [],
        )?;
        let scan_id: i64 = tx.query_row(
            "SELECT value FROM meta WHERE key = 'scan_counter'",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO roots (path, last_scan) VALUES (?1, ?2) \
             ON CONFLICT(path) DO UPDATE SET last_scan = excluded.last_scan",
            params![key, scan_id],
        )?;
        tx.commit()?;

        log::debug!("Scan {} started for {}", scan_id, root.display());
        Ok(scan_id)
    }

    /// Write one chunk of scan results: fresh `records` are upserted and
    /// `unchanged` paths are marked as observed, all under `scan_id`.
    pub fn record_scan_batch(
        &mut self,
        records: &[FileRecord],
        unchanged: &[PathBuf],
        scan_id: i64,
    ) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        upsert_in(&tx, records, scan_id)?;
        mark_seen_in(&tx, unchanged, scan_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Record that scan `scan_id` observed `paths` without rewriting them.
    /// Returns how many active records were touched.
    pub fn mark_seen(&mut self, paths: &[PathBuf], scan_id: i64) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let touched = mark_seen_in(&tx, paths, scan_id)?;
        tx.commit()?;
        Ok(touched)
    }

    /// Move a hashed record from the active collection to the archive.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no active record exists and
    /// [`StoreError::MissingHash`] if the record was never hashed.
    pub fn archive(&mut self, path: &Path) -> StoreResult<()> {
        let key = path_str(path)?;
        let tx = self.conn.transaction()?;

        let hash: Option<Option<String>> = tx
            .query_row(
                "SELECT hash FROM active WHERE path = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match hash {
            None => return Err(StoreError::NotFound(path.to_path_buf())),
            Some(None) => return Err(StoreError::MissingHash(path.to_path_buf())),
            Some(Some(_)) => {}
        }

        tx.execute(
            "INSERT OR REPLACE INTO archive (path, hash, size, inode, mtime, ctime) \
             SELECT path, hash, size, inode, mtime, ctime FROM active WHERE path = ?1",
            params![key],
        )?;
        tx.execute("DELETE FROM active WHERE path = ?1", params![key])?;
        tx.commit()?;

        log::trace!("Archived {}", path.display());
        Ok(())
    }

    /// Permanently remove the record for `path` from whichever collection
    /// holds it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if neither collection knows the path.
    pub fn retire(&mut self, path: &Path) -> StoreResult<()> {
        self.retire_batch(&[path.to_path_buf()]).map(|_| ())
    }

    /// Retire many paths in one transaction. If any path is unknown the whole
    /// batch is rolled back.
    pub fn retire_batch(&mut self, paths: &[PathBuf]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut del_active = tx.prepare_cached("DELETE FROM active WHERE path = ?1")?;
            let mut del_archive = tx.prepare_cached("DELETE FROM archive WHERE path = ?1")?;
            for path in paths {
                let key = path_str(path)?;
                let removed = del_active.execute(params![key])? + del_archive.execute(params![key])?;
                if removed == 0 {
                    return Err(StoreError::NotFound(path.clone()));
                }
            }
        }
        tx.commit()?;
        Ok(paths.len())
    }

    /// Archive every active record under `root` last observed before scan
    /// `scan_id`. Records seen by a later scan of a nested root count as
    /// observed. Unhashed stragglers cannot be archived and are dropped.
    pub fn reconcile(&mut self, root: &Path, scan_id: i64) -> StoreResult<ReconcileStats> {
        let (exact, prefix, len) = root_bounds(root)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO archive (path, hash, size, inode, mtime, ctime) \
                 SELECT path, hash, size, inode, mtime, ctime FROM active \
                 WHERE {UNDER_ROOT} AND seen_scan < ?4 AND hash IS NOT NULL"
            ),
            params![exact, prefix, len, scan_id],
        )?;
        let archived = tx.execute(
            &format!(
                "DELETE FROM active WHERE {UNDER_ROOT} AND seen_scan < ?4 AND hash IS NOT NULL"
            ),
            params![exact, prefix, len, scan_id],
        )?;
        let dropped = tx.execute(
            &format!("DELETE FROM active WHERE {UNDER_ROOT} AND seen_scan < ?4"),
            params![exact, prefix, len, scan_id],
        )?;
        tx.commit()?;

        if archived + dropped > 0 {
            log::info!(
                "Reconciled {}: {} archived, {} dropped",
                root.display(),
                archived,
                dropped
            );
        }

        Ok(ReconcileStats { archived, dropped })
    }

    /// Permanently delete archive records whose absence is confirmed.
    ///
    /// A record counts as confirmed absent when its path does not exist and
    /// either no registered root contains it or at least one containing root
    /// is present on disk. Records under roots that are currently missing
    /// (unmounted media, disconnected shares) are kept.
    pub fn gc_archive(&mut self) -> StoreResult<usize> {
        let roots = self.roots()?;
        let candidates: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT path FROM archive ORDER BY path")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut present_roots: HashSet<&Path> = HashSet::new();
        for root in &roots {
            if root.is_dir() {
                present_roots.insert(root.as_path());
            }
        }

        let doomed: Vec<&String> = candidates
            .iter()
            .filter(|p| {
                let path = Path::new(p.as_str());
                if !matches!(path.try_exists(), Ok(false)) {
                    return false;
                }
                let mut containing = roots.iter().filter(|r| path.starts_with(r)).peekable();
                if containing.peek().is_none() {
                    return true;
                }
                containing.any(|r| present_roots.contains(r.as_path()))
            })
            .collect();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM archive WHERE path = ?1")?;
            for path in &doomed {
                stmt.execute(params![path])?;
            }
        }
        tx.commit()?;

        log::info!(
            "Archive garbage collection removed {} of {} records",
            doomed.len(),
            candidates.len()
        );
        Ok(doomed.len())
    }

    /// Clear the active collection, forcing the next scan to rehash
    /// everything. The archive is untouched.
    pub fn wipe_active(&mut self) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM active", [])?;
        tx.commit()?;
        log::info!("Wiped {} active records", removed);
        Ok(removed)
    }
}

// ==================== Row helpers ====================

struct RawRecord {
    path: String,
    hash: Option<String>,
    stat: StatSignature,
}

impl RawRecord {
    fn into_record(self) -> StoreResult<FileRecord> {
        let path = PathBuf::from(self.path);
        let hash = match self.hash {
            Some(text) => Some(
                ContentHash::from_hex(&text).map_err(|source| StoreError::CorruptHash {
                    path: path.clone(),
                    source,
                })?,
            ),
            None => None,
        };
        Ok(FileRecord::new(path, hash, self.stat))
    }
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        path: row.get(0)?,
        hash: row.get(1)?,
        stat: StatSignature {
            size: row.get::<_, i64>(2)? as u64,
            inode: row.get::<_, i64>(3)? as u64,
            mtime: row.get(4)?,
            ctime: row.get(5)?,
        },
    })
}

fn upsert_in(tx: &Transaction<'_>, records: &[FileRecord], scan_id: i64) -> StoreResult<()> {
    let mut insert = tx.prepare_cached(
        "INSERT INTO active (path, hash, size, inode, mtime, ctime, seen_scan) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(path) DO UPDATE SET \
             hash = excluded.hash, \
             size = excluded.size, \
             inode = excluded.inode, \
             mtime = excluded.mtime, \
             ctime = excluded.ctime, \
             seen_scan = excluded.seen_scan",
    )?;
    let mut unarchive = tx.prepare_cached("DELETE FROM archive WHERE path = ?1")?;

    for record in records {
        let key = path_str(&record.path)?;
        insert.execute(params![
            key,
            record.hash.as_ref().map(ContentHash::as_str),
            record.stat.size as i64,
            record.stat.inode as i64,
            record.stat.mtime,
            record.stat.ctime,
            scan_id,
        ])?;
        unarchive.execute(params![key])?;
    }
    Ok(())
}

fn mark_seen_in(tx: &Transaction<'_>, paths: &[PathBuf], scan_id: i64) -> StoreResult<usize> {
    let mut stmt = tx.prepare_cached("UPDATE active SET seen_scan = ?2 WHERE path = ?1")?;
    let mut touched = 0;
    for path in paths {
        touched += stmt.execute(params![path_str(path)?, scan_id])?;
    }
    Ok(touched)
}

fn path_str(path: &Path) -> StoreResult<&str> {
    path.to_str()
        .ok_or_else(|| StoreError::NonUtf8Path(path.to_path_buf()))
}

/// Bind values for [`UNDER_ROOT`].
fn root_bounds(root: &Path) -> StoreResult<(String, String, i64)> {
    let exact = path_str(root)?.to_string();
    let prefix = if exact.ends_with(MAIN_SEPARATOR) {
        exact.clone()
    } else {
        format!("{exact}{MAIN_SEPARATOR}")
    };
    let len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
    Ok((exact, prefix, len))
}
