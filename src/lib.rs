//! dupestore - content-addressed duplicate index with safe, scoped removal
//!
//! Scans directory trees into a persistent SQLite index keyed by BLAKE3
//! content hash, rehashing only files whose stat signature changed. The
//! duplicates it finds can be partitioned into keep and delete sets by
//! directory scope and filename pattern, then validated and removed (or moved
//! aside) in batches that keep the index consistent.

pub mod actions;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod logging;
pub mod scanner;
pub mod signal;
pub mod store;

pub use engine::Dedupe;
pub use error::{Error, ErrorKind, Result};
