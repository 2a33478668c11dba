//! Versioned response cache tiers.
//!
//! This module owns two independently versioned tiers:
//! - the shell tier, filled at install time with the bootable asset set
//! - the dynamic tier, filled at runtime by the fetch strategies
//!
//! Tiers live in an explicit [`CacheRegistry`]; superseded versions are
//! evicted on activation while foreign tiers are never touched.

mod manager;
mod registry;
mod storage;
mod tier;

pub use manager::{CacheTierManager, PopulateFailure, PopulateReport};
pub use registry::CacheRegistry;
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use tier::{TierHandle, TierRole, TierState, TierVersions};
