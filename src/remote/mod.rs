//! Remote data service: CRUD against the backend's REST tables.

mod client;
mod table;

use color_eyre::{Report, Result};
use std::future::Future;

use crate::cache::{EntityKind, Record};

pub use client::{ApiError, RestClient};
pub use table::TableService;

/// The row an update targeted no longer exists on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRow {
  pub kind: EntityKind,
  pub id: String,
}

impl std::fmt::Display for MissingRow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} not found", self.kind.label(), self.id)
  }
}

impl std::error::Error for MissingRow {}

/// Whether `err` reports a [`MissingRow`].
pub fn is_missing_row(err: &Report) -> bool {
  err.downcast_ref::<MissingRow>().is_some()
}

/// Remote CRUD operations for one entity type.
///
/// Every call may fail with a transport, auth or validation error.
pub trait RemoteService<T: Record>: Send + Sync + 'static {
  /// Fetch every record of this type.
  fn fetch_all(&self) -> impl Future<Output = Result<Vec<T>>> + Send;

  /// Create a record; the backend assigns the id.
  fn create(&self, draft: &T::Draft) -> impl Future<Output = Result<T>> + Send;

  /// Apply a partial update. Services that return the stored row give `Some`.
  /// Fails with [`MissingRow`] when no row has that id.
  fn update(&self, id: &str, patch: &T::Patch) -> impl Future<Output = Result<Option<T>>> + Send;

  fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}
