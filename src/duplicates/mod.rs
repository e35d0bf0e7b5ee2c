//! Duplicate selection module.
//!
//! This module provides functionality for:
//! - The in-memory hash → paths multimap built from the index store
//! - Scope and pattern driven keep/delete partitioning
//! - The safety pass that never selects every copy of a file

pub mod index;
pub mod partition;

pub use index::DupeIndex;
pub use partition::{partition, Partition, PartitionOptions};
