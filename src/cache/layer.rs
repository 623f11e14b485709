//! Freshness policy and the rules for folding remote data into the cache.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::traits::{CacheMeta, Record, Tracked};

/// Default freshness window for remote data.
pub const DEFAULT_FRESHNESS: Duration = Duration::minutes(60);

/// Decides when cached remote data must be fetched again.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
  window: Duration,
}

impl Default for Freshness {
  fn default() -> Self {
    Self {
      window: DEFAULT_FRESHNESS,
    }
  }
}

impl Freshness {
  pub fn new(window: Duration) -> Self {
    Self { window }
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  /// Age of the cached data, `None` when it was never fetched.
  pub fn age(&self, meta: &CacheMeta, now: DateTime<Utc>) -> Option<Duration> {
    meta.last_fetched.map(|at| now - at)
  }

  /// Check if cached data is stale. Missing metadata is always stale.
  pub fn is_stale(&self, meta: &CacheMeta, now: DateTime<Utc>) -> bool {
    match self.age(meta, now) {
      Some(age) => age > self.window,
      None => true,
    }
  }
}

/// Merge a fresh remote listing with what the cache already holds.
///
/// Remote order is kept. A cached record with pending local work replaces the
/// remote copy of the same id; pending records the remote does not know about
/// (provisional ones, or rows deleted remotely but edited here) are appended.
pub fn merge_remote<T: Record>(remote: Vec<T>, cached: Vec<Tracked<T>>) -> Vec<Tracked<T>> {
  let mut pending_order: Vec<String> = Vec::new();
  let mut pending: HashMap<String, Tracked<T>> = HashMap::new();
  for t in cached.into_iter().filter(|t| t.is_pending()) {
    pending_order.push(t.id().to_string());
    pending.insert(t.id().to_string(), t);
  }

  let mut merged: Vec<Tracked<T>> = Vec::with_capacity(remote.len() + pending.len());
  for record in remote {
    match pending.remove(record.id()) {
      Some(local) => merged.push(local),
      None => merged.push(Tracked::synced(record)),
    }
  }

  for id in pending_order {
    if let Some(local) = pending.remove(&id) {
      merged.push(local);
    }
  }

  merged
}

/// Records the UI should see: everything except soft-deleted rows.
pub fn visible<T>(records: Vec<Tracked<T>>) -> Vec<Tracked<T>> {
  records
    .into_iter()
    .filter(|t| !t.is_offline_deleted())
    .collect()
}
