//! Core traits and types for the local cache.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The entity types this client keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Course,
  Teacher,
  StudyMaterial,
}

impl EntityKind {
  pub const ALL: [EntityKind; 3] = [
    EntityKind::Course,
    EntityKind::Teacher,
    EntityKind::StudyMaterial,
  ];

  /// Cache partition holding this kind's records.
  pub fn partition(self) -> &'static str {
    match self {
      EntityKind::Course => "courses",
      EntityKind::Teacher => "teachers",
      EntityKind::StudyMaterial => "materials",
    }
  }

  /// Remote table name.
  pub fn table(self) -> &'static str {
    match self {
      EntityKind::Course => "courses",
      EntityKind::Teacher => "teachers",
      EntityKind::StudyMaterial => "study_materials",
    }
  }

  /// Name of the change-notification channel.
  pub fn channel(self) -> &'static str {
    match self {
      EntityKind::Course => "courses",
      EntityKind::Teacher => "teachers",
      EntityKind::StudyMaterial => "materials",
    }
  }

  /// Prefix used for provisional ids, e.g. `temp-course-...`.
  pub fn id_prefix(self) -> &'static str {
    match self {
      EntityKind::Course => "course",
      EntityKind::Teacher => "teacher",
      EntityKind::StudyMaterial => "material",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      EntityKind::Course => "Course",
      EntityKind::Teacher => "Teacher",
      EntityKind::StudyMaterial => "Study material",
    }
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.partition())
  }
}

/// Trait for entities that can be cached and synchronized.
///
/// Implementors provide a stable identifier, the types used to create and
/// partially update them, and the conversions the sync store needs to build
/// provisional records and replay offline edits.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Fields required to create a new record.
  type Draft: Clone + Send + Sync + Serialize + 'static;
  /// Partial update; unset fields are left untouched.
  type Patch: Clone + Send + Sync + Serialize + 'static;

  fn kind() -> EntityKind;

  /// Unique identifier, stable once assigned.
  fn id(&self) -> &str;

  /// Build a record from a draft with a locally assigned id.
  fn from_draft(id: String, created_at: DateTime<Utc>, draft: Self::Draft) -> Self;

  /// The draft that would recreate this record remotely.
  fn to_draft(&self) -> Self::Draft;

  /// Patch carrying every field of this record.
  fn to_patch(&self) -> Self::Patch;

  /// Merge a patch into this record.
  fn apply(&mut self, patch: &Self::Patch);

  /// Reject drafts the backend would refuse anyway.
  fn validate(_draft: &Self::Draft) -> Result<(), String> {
    Ok(())
  }
}

/// Local sync state of a cached record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineMark {
  /// Matches the last known remote state.
  #[default]
  Synced,
  /// Created offline; the id is provisional and unknown to the remote.
  Offline,
  /// Remote record changed locally while offline.
  OfflineUpdated,
  /// Remote record deleted locally while offline.
  OfflineDeleted,
}

impl OfflineMark {
  pub fn as_str(self) -> &'static str {
    match self {
      OfflineMark::Synced => "synced",
      OfflineMark::Offline => "offline",
      OfflineMark::OfflineUpdated => "offline_updated",
      OfflineMark::OfflineDeleted => "offline_deleted",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "synced" => Some(OfflineMark::Synced),
      "offline" => Some(OfflineMark::Offline),
      "offline_updated" => Some(OfflineMark::OfflineUpdated),
      "offline_deleted" => Some(OfflineMark::OfflineDeleted),
      _ => None,
    }
  }

  pub fn is_synced(&self) -> bool {
    matches!(self, OfflineMark::Synced)
  }
}

/// A record together with its local sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
  #[serde(flatten)]
  pub record: T,
  #[serde(default, rename = "_sync", skip_serializing_if = "OfflineMark::is_synced")]
  pub mark: OfflineMark,
}

impl<T> Tracked<T> {
  pub fn synced(record: T) -> Self {
    Self {
      record,
      mark: OfflineMark::Synced,
    }
  }

  pub fn with_mark(record: T, mark: OfflineMark) -> Self {
    Self { record, mark }
  }

  /// Provisional record created while offline.
  pub fn is_offline(&self) -> bool {
    self.mark == OfflineMark::Offline
  }

  pub fn is_offline_updated(&self) -> bool {
    self.mark == OfflineMark::OfflineUpdated
  }

  pub fn is_offline_deleted(&self) -> bool {
    self.mark == OfflineMark::OfflineDeleted
  }

  /// Whether this record carries local work not yet seen by the remote.
  pub fn is_pending(&self) -> bool {
    !self.mark.is_synced()
  }
}

impl<T: Record> Tracked<T> {
  pub fn id(&self) -> &str {
    self.record.id()
  }
}

/// Per-partition cache metadata, stored outside the partition itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMeta {
  /// When the partition was last filled from the remote. `None` means never.
  pub last_fetched: Option<DateTime<Utc>>,
}

impl CacheMeta {
  pub fn fetched_at(at: DateTime<Utc>) -> Self {
    Self {
      last_fetched: Some(at),
    }
  }
}

/// Where the items of a load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
  /// Fresh data from the remote service
  Network,
  /// Cached data, still inside the freshness window
  Cache,
  /// Remote fetch failed; cached data (if any) was served instead
  Fallback,
  /// Offline mode - only the local cache was consulted
  Offline,
}
