//! Offline-aware synchronization of entity collections.
//!
//! One [`SyncStore`] per entity type owns the reactive snapshot the UI reads,
//! decides between the cache and the remote on every load, and turns writes
//! made while offline into tagged cache records that [`SyncStore::replay`]
//! pushes later. [`SyncStore::spawn_bridge`] wires a store to connectivity
//! changes and realtime notifications.

mod bridge;
mod error;
mod replay;
mod snapshot;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use error::SyncError;
pub use replay::ReplayReport;
pub use snapshot::SyncSnapshot;
pub use store::{provisional_id, SyncStore};

use crate::cache::SqliteStorage;
use crate::domain::{Course, StudyMaterial, Teacher};
use crate::remote::TableService;

pub type CourseStore = SyncStore<Course, TableService<Course>, SqliteStorage>;
pub type TeacherStore = SyncStore<Teacher, TableService<Teacher>, SqliteStorage>;
pub type MaterialStore = SyncStore<StudyMaterial, TableService<StudyMaterial>, SqliteStorage>;
