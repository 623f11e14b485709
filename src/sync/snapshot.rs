//! UI-facing state of a sync store.

use crate::cache::Tracked;

/// Everything a view needs to render one entity collection.
///
/// Published through a `watch` channel; every change replaces the whole value,
/// so readers never observe a half-applied load.
#[derive(Debug, Clone)]
pub struct SyncSnapshot<T> {
  /// Visible records, soft-deleted ones excluded
  pub items: Vec<Tracked<T>>,
  /// A load is in flight
  pub is_loading: bool,
  /// Message of the most recent failure, cleared by the next operation
  pub last_error: Option<String>,
  /// The store is working from the local cache only
  pub is_offline: bool,
}

impl<T> Default for SyncSnapshot<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      is_loading: false,
      last_error: None,
      is_offline: false,
    }
  }
}

impl<T> SyncSnapshot<T> {
  pub fn new(is_offline: bool) -> Self {
    Self {
      is_offline,
      ..Self::default()
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Number of visible records that exist only locally.
  pub fn provisional_count(&self) -> usize {
    self.items.iter().filter(|t| t.is_offline()).count()
  }
}
