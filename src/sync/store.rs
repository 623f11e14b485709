//! Generic offline-aware synchronization store.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::error::SyncError;
use super::snapshot::SyncSnapshot;
use crate::cache::{
  merge_remote, visible, CacheMeta, CacheStorage, EntityKind, Freshness, LoadSource, OfflineMark,
  Record, Tracked,
};
use crate::connectivity::ConnectivityMonitor;
use crate::remote::RemoteService;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Locally generated id for a record created offline:
/// `temp-<kind>-<unix millis>-<7 random base36 chars>`.
pub fn provisional_id(kind: EntityKind) -> String {
  let mut rng = rand::thread_rng();
  let suffix: String = (0..7)
    .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
    .collect();
  format!(
    "temp-{}-{}-{}",
    kind.id_prefix(),
    Utc::now().timestamp_millis(),
    suffix
  )
}

/// Keeps one entity collection consistent across online/offline transitions.
///
/// Online, reads are served from the local cache while it is fresh and from
/// the remote service otherwise; writes go to the remote and are mirrored into
/// the cache. Offline, everything goes to the cache and records are tagged so
/// [`SyncStore::replay`] can push them once connectivity returns.
pub struct SyncStore<T: Record, R, S> {
  pub(super) remote: R,
  pub(super) cache: Arc<S>,
  pub(super) connectivity: ConnectivityMonitor,
  freshness: Freshness,
  meta: Mutex<CacheMeta>,
  pub(super) state: watch::Sender<SyncSnapshot<T>>,
}

impl<T, R, S> SyncStore<T, R, S>
where
  T: Record,
  R: RemoteService<T>,
  S: CacheStorage + 'static,
{
  pub fn new(remote: R, cache: Arc<S>, connectivity: ConnectivityMonitor) -> Self {
    let meta = match cache.get_meta(Self::partition()) {
      Ok(meta) => meta.unwrap_or_default(),
      Err(e) => {
        tracing::warn!(kind = %T::kind(), error = %e, "could not read cache metadata");
        CacheMeta::default()
      }
    };
    let (state, _) = watch::channel(SyncSnapshot::new(!connectivity.is_online()));

    Self {
      remote,
      cache,
      connectivity,
      freshness: Freshness::default(),
      meta: Mutex::new(meta),
      state,
    }
  }

  pub fn with_freshness(mut self, freshness: Freshness) -> Self {
    self.freshness = freshness;
    self
  }

  pub(super) fn partition() -> &'static str {
    T::kind().partition()
  }

  /// Current state.
  pub fn snapshot(&self) -> SyncSnapshot<T> {
    self.state.borrow().clone()
  }

  /// Watch the state; the receiver sees every published snapshot.
  pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot<T>> {
    self.state.subscribe()
  }

  pub fn meta(&self) -> CacheMeta {
    *self.meta.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  /// Reset the per-operation state: clear the last error, refresh the offline flag.
  fn begin(&self) -> bool {
    let online = self.is_online();
    self.state.send_modify(|s| {
      s.last_error = None;
      s.is_offline = !online;
    });
    online
  }

  pub(super) fn record_error(&self, message: String) {
    self.state.send_modify(|s| s.last_error = Some(message));
  }

  fn fail(&self, err: SyncError) -> SyncError {
    self.record_error(err.to_string());
    err
  }

  pub(super) fn set_items(&self, items: Vec<Tracked<T>>) {
    self.state.send_modify(|s| s.items = items);
  }

  /// Replace the item with id `id`, or append when it is not shown yet.
  pub(super) fn upsert_item(&self, id: &str, record: Tracked<T>) {
    self.state.send_modify(|s| {
      match s.items.iter_mut().find(|t| t.id() == id) {
        Some(slot) => *slot = record,
        None => s.items.push(record),
      }
    });
  }

  pub(super) fn remove_item(&self, id: &str) {
    self.state.send_modify(|s| s.items.retain(|t| t.id() != id));
  }

  pub(super) fn cached_all(&self) -> Vec<Tracked<T>> {
    match self.cache.get_all(Self::partition()) {
      Ok(records) => records,
      Err(e) => {
        tracing::warn!(kind = %T::kind(), error = %e, "cache read failed");
        Vec::new()
      }
    }
  }

  fn cached_by_id(&self, id: &str) -> Option<Tracked<T>> {
    match self.cache.get_by_id(Self::partition(), id) {
      Ok(record) => record,
      Err(e) => {
        tracing::warn!(kind = %T::kind(), id, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Log a failed cache write. Returns whether it succeeded.
  pub(super) fn cache_write(&self, op: &str, result: color_eyre::Result<()>) -> bool {
    match result {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(kind = %T::kind(), op, error = %e, "cache write failed");
        false
      }
    }
  }

  /// Mark the partition as just fetched.
  fn stamp(&self) {
    // Storage keeps milliseconds; hold the same instant in memory
    let now = Utc::now();
    let at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    let meta = CacheMeta::fetched_at(at);
    *self.meta.lock().unwrap_or_else(|e| e.into_inner()) = meta;
    self.cache_write("set_meta", self.cache.set_meta(Self::partition(), &meta));
  }

  /// Refresh the collection.
  ///
  /// Never fails: remote errors are recorded in `last_error` and the cache is
  /// used instead. Returns where the items came from.
  pub async fn load(&self, force_refresh: bool) -> LoadSource {
    let online = self.begin();
    self.state.send_modify(|s| s.is_loading = true);

    let source = if online {
      self.load_online(force_refresh).await
    } else {
      self.load_offline()
    };

    self.state.send_modify(|s| s.is_loading = false);
    source
  }

  pub async fn force_refresh(&self) -> LoadSource {
    self.load(true).await
  }

  fn load_offline(&self) -> LoadSource {
    let cached = self.cached_all();
    if cached.is_empty() {
      tracing::debug!(kind = %T::kind(), "offline with an empty cache");
    } else {
      tracing::debug!(kind = %T::kind(), count = cached.len(), "offline, serving cache");
    }
    self.set_items(visible(cached));
    LoadSource::Offline
  }

  async fn load_online(&self, force_refresh: bool) -> LoadSource {
    let meta = self.meta();
    let now = Utc::now();

    if !force_refresh && !self.freshness.is_stale(&meta, now) {
      let cached = self.cached_all();
      if !cached.is_empty() {
        let age_secs = self.freshness.age(&meta, now).map_or(0, |age| age.num_seconds());
        tracing::debug!(kind = %T::kind(), age_secs, "using cached records");
        self.set_items(visible(cached));
        return LoadSource::Cache;
      }
      tracing::debug!(kind = %T::kind(), "cache empty despite fresh timestamp, fetching");
    }

    self.fetch_remote().await
  }

  async fn fetch_remote(&self) -> LoadSource {
    match self.remote.fetch_all().await {
      Ok(records) => {
        let merged = merge_remote(records, self.cached_all());
        if self.cache_write(
          "replace_all",
          self.cache.replace_all(Self::partition(), &merged),
        ) {
          self.stamp();
        }
        tracing::info!(kind = %T::kind(), count = merged.len(), "loaded from remote");
        self.set_items(visible(merged));
        LoadSource::Network
      }
      Err(e) => {
        tracing::error!(kind = %T::kind(), error = %e, "failed to load from remote");
        self.record_error(format!("{:#}", e));

        let cached = self.cached_all();
        if !cached.is_empty() {
          tracing::info!(kind = %T::kind(), "using cached records after fetch error");
          self.set_items(visible(cached));
        }
        LoadSource::Fallback
      }
    }
  }

  /// Create a record. Offline, the record gets a provisional id and is only
  /// written to the cache.
  pub async fn create(&self, draft: T::Draft) -> Result<Tracked<T>, SyncError> {
    let online = self.begin();
    T::validate(&draft).map_err(|msg| self.fail(SyncError::Invalid(msg)))?;

    if !online {
      let id = provisional_id(T::kind());
      let record = Tracked::with_mark(
        T::from_draft(id.clone(), Utc::now(), draft),
        OfflineMark::Offline,
      );
      self.state.send_modify(|s| s.items.push(record.clone()));
      self.cache_write("save", self.cache.save(Self::partition(), &record));
      tracing::info!(kind = %T::kind(), id = %id, "created provisional record offline");
      return Ok(record);
    }

    let created = self
      .remote
      .create(&draft)
      .await
      .map_err(|e| self.fail(SyncError::Remote(e)))?;

    let record = Tracked::synced(created);
    self.upsert_item(record.id(), record.clone());
    self.cache_write("save", self.cache.save(Self::partition(), &record));
    self.stamp();
    Ok(record)
  }

  /// Apply a partial update.
  ///
  /// Returns the updated record, or `None` when it had to be reloaded from the
  /// remote and did not come back.
  pub async fn update(&self, id: &str, patch: T::Patch) -> Result<Option<Tracked<T>>, SyncError> {
    let online = self.begin();
    let cached = self.cached_by_id(id);

    // A soft-deleted record is gone for the caller until its delete replays
    if cached.as_ref().is_some_and(|t| t.is_offline_deleted()) {
      return Err(self.fail(SyncError::NotFound {
        kind: T::kind(),
        id: id.to_string(),
      }));
    }

    // Provisional records are unknown to the remote; edit them in place
    if !online || cached.as_ref().is_some_and(|t| t.is_offline()) {
      let Some(mut local) = cached else {
        return Err(self.fail(SyncError::NotFound {
          kind: T::kind(),
          id: id.to_string(),
        }));
      };
      local.record.apply(&patch);
      if local.mark == OfflineMark::Synced {
        local.mark = OfflineMark::OfflineUpdated;
      }
      self.cache_write("save", self.cache.save(Self::partition(), &local));
      self.upsert_item(id, local.clone());
      return Ok(Some(local));
    }

    let returned = self
      .remote
      .update(id, &patch)
      .await
      .map_err(|e| self.fail(SyncError::Remote(e)))?;

    let Some(mut local) = cached else {
      // Not cached yet: reload everything rather than patch blindly
      self.load(true).await;
      return Ok(returned.map(Tracked::synced));
    };

    let refreshed = if local.is_offline_updated() {
      // Earlier offline edits still need replaying; keep them pending
      local.record.apply(&patch);
      local
    } else if let Some(row) = returned {
      Tracked::synced(row)
    } else {
      local.record.apply(&patch);
      local.mark = OfflineMark::Synced;
      local
    };

    self.cache_write("save", self.cache.save(Self::partition(), &refreshed));
    self.upsert_item(id, refreshed.clone());
    self.stamp();
    Ok(Some(refreshed))
  }

  /// Delete a record. Offline, remote records are soft-deleted in the cache
  /// and hidden; provisional ones are dropped outright.
  pub async fn delete(&self, id: &str) -> Result<(), SyncError> {
    let online = self.begin();
    let cached = self.cached_by_id(id);

    if let Some(local) = cached.as_ref().filter(|t| t.is_offline()) {
      self.remove_item(local.id());
      self.cache_write("remove", self.cache.remove(Self::partition(), id));
      tracing::info!(kind = %T::kind(), id, "discarded provisional record");
      return Ok(());
    }

    if !online {
      let Some(mut local) = cached else {
        return Err(self.fail(SyncError::NotFound {
          kind: T::kind(),
          id: id.to_string(),
        }));
      };
      local.mark = OfflineMark::OfflineDeleted;
      self.cache_write("save", self.cache.save(Self::partition(), &local));
      self.remove_item(id);
      return Ok(());
    }

    self
      .remote
      .delete(id)
      .await
      .map_err(|e| self.fail(SyncError::Remote(e)))?;

    self.remove_item(id);
    self.cache_write("remove", self.cache.remove(Self::partition(), id));
    self.stamp();
    Ok(())
  }
}
