//! Persistent content index.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema, transactional batch writes,
//!   reconciliation and archive garbage collection.
//! * [`entry`]: the record types stored in the index and their validation.
//!
//! # Collections
//!
//! * `active`: one record per path currently known to exist. The hash may be
//!   absent when hashing failed; the next scan retries it.
//! * `archive`: hashed records whose path a later scan no longer found. Only
//!   [`IndexStore::gc_archive`] removes entries from here.
//!
//! A path lives in at most one collection at a time.

pub mod database;
pub mod entry;

pub use database::{IndexStore, ReconcileStats, StoreCounts, StoreError, StoreResult};
pub use entry::{ContentHash, FileRecord, HashParseError, StatSignature};
