//! Local persistent cache for offline support.
//!
//! This module provides an entity-agnostic cache that:
//! - Stores records in named partitions, one per entity type
//! - Tags records with their local sync state (provisional, edited, deleted)
//! - Keeps per-partition freshness metadata outside the partitions
//! - Decides when cached remote data is stale

mod layer;
mod storage;
mod traits;

pub use layer::{merge_remote, visible, Freshness, DEFAULT_FRESHNESS};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheMeta, EntityKind, LoadSource, OfflineMark, Record, Tracked};
