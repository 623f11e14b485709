use super::store::SyncStore;
use crate::cache::{CacheStorage, EntityKind, OfflineMark, Record, Tracked};
use crate::remote::{is_missing_row, RemoteService};

/// Outcome of pushing pending offline work to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
  pub created: usize,
  pub updated: usize,
  pub deleted: usize,
  /// Offline edits dropped because the record was deleted remotely
  pub discarded: usize,
  /// Ids whose replay failed; they stay pending
  pub failed: Vec<String>,
}

impl ReplayReport {
  /// Whether anything was attempted at all.
  pub fn is_empty(&self) -> bool {
    self.synced() == 0 && self.failed.is_empty()
  }

  /// Changes that no longer need replaying.
  pub fn synced(&self) -> usize {
    self.created + self.updated + self.deleted + self.discarded
  }

  fn failure_message(&self, kind: EntityKind) -> Option<String> {
    if self.failed.is_empty() {
      return None;
    }
    Some(format!(
      "Failed to sync {} offline change(s) for {}",
      self.failed.len(),
      kind
    ))
  }
}

impl<T, R, S> SyncStore<T, R, S>
where
  T: Record,
  R: RemoteService<T>,
  S: CacheStorage + 'static,
{
  /// Push every pending offline change to the remote, oldest first.
  ///
  /// Provisional records are created remotely and swapped for the confirmed
  /// row. Edited records are sent in full; an edit whose record was deleted
  /// remotely in the meantime is dropped. Soft-deleted records are deleted
  /// and removed from the cache. A failed record stays pending for the next
  /// replay. Does nothing while offline.
  pub async fn replay(&self) -> ReplayReport {
    let mut report = ReplayReport::default();
    if !self.is_online() {
      return report;
    }

    let pending: Vec<Tracked<T>> = self
      .cached_all()
      .into_iter()
      .filter(|t| t.is_pending())
      .collect();
    if pending.is_empty() {
      return report;
    }

    tracing::info!(kind = %T::kind(), count = pending.len(), "replaying offline changes");
    let partition = T::kind().partition();

    for local in pending {
      let id = local.id().to_string();
      let mark = local.mark;
      let result = match mark {
        OfflineMark::Offline => {
          self
            .remote
            .create(&local.record.to_draft())
            .await
            .map(|created| {
              let confirmed = Tracked::synced(created);
              self.cache_write("remove", self.cache.remove(partition, &id));
              self.cache_write("save", self.cache.save(partition, &confirmed));
              self.upsert_item(&id, confirmed);
              report.created += 1;
            })
        }
        OfflineMark::OfflineUpdated => {
          match self.remote.update(&id, &local.record.to_patch()).await {
            Ok(returned) => {
              let confirmed = Tracked::synced(returned.unwrap_or(local.record));
              self.cache_write("save", self.cache.save(partition, &confirmed));
              self.upsert_item(&id, confirmed);
              report.updated += 1;
              Ok(())
            }
            Err(e) if is_missing_row(&e) => {
              tracing::info!(
                kind = %T::kind(),
                id = %id,
                "record deleted remotely, dropping offline edit"
              );
              self.cache_write("remove", self.cache.remove(partition, &id));
              self.remove_item(&id);
              report.discarded += 1;
              Ok(())
            }
            Err(e) => Err(e),
          }
        }
        OfflineMark::OfflineDeleted => self.remote.delete(&id).await.map(|()| {
          self.cache_write("remove", self.cache.remove(partition, &id));
          report.deleted += 1;
        }),
        OfflineMark::Synced => Ok(()),
      };

      if let Err(e) = result {
        tracing::warn!(kind = %T::kind(), id = %id, error = %e, "offline change not replayed");
        report.failed.push(id);
      }
    }

    if let Some(message) = report.failure_message(T::kind()) {
      self.record_error(message);
    }

    tracing::info!(
      kind = %T::kind(),
      created = report.created,
      updated = report.updated,
      deleted = report.deleted,
      discarded = report.discarded,
      failed = report.failed.len(),
      "replay finished"
    );
    report
  }

  /// Replay pending work, then reload the collection.
  ///
  /// The reload is forced when anything was replayed. A replay failure stays
  /// in `last_error` unless the reload records an error of its own.
  pub async fn sync_pending(&self) -> ReplayReport {
    let report = self.replay().await;
    self.load(report.synced() > 0).await;
    if let Some(message) = report.failure_message(T::kind()) {
      if self.snapshot().last_error.is_none() {
        self.record_error(message);
      }
    }
    report
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{NewTeacher, Teacher, TeacherPatch};
  use crate::sync::testing::{setup, teacher};

  #[tokio::test]
  async fn test_replay_pushes_every_kind_of_change() {
    let (store, remote, cache, connectivity) = setup(true);
    remote.seed(vec![teacher("1", "Ada"), teacher("2", "Grace")]);
    store.load(false).await;

    connectivity.set_online(false);
    let provisional = store.create(NewTeacher::named("Linus")).await.unwrap();
    let patch = TeacherPatch {
      department: Some(Some("CSE".to_string())),
      ..TeacherPatch::default()
    };
    store.update("1", patch).await.unwrap();
    store.delete("2").await.unwrap();

    assert_eq!(store.replay().await, ReplayReport::default());

    connectivity.set_online(true);
    let report = store.replay().await;
    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert!(report.failed.is_empty());

    let names: Vec<String> = remote.rows().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Ada", "Linus"]);
    assert_eq!(remote.rows()[0].department.as_deref(), Some("CSE"));

    let cached: Vec<Tracked<Teacher>> = cache.get_all("teachers").unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|t| !t.is_pending()));
    assert!(cached.iter().all(|t| t.id() != provisional.id()));

    let snap = store.snapshot();
    assert_eq!(snap.len(), 2);
    assert_eq!(snap.provisional_count(), 0);
    assert!(snap.items.iter().any(|t| t.id().starts_with("srv-")));
  }

  #[tokio::test]
  async fn test_failed_replay_keeps_records_pending() {
    let (store, remote, cache, connectivity) = setup(false);
    let provisional = store.create(NewTeacher::named("Linus")).await.unwrap();

    connectivity.set_online(true);
    remote.fail_with("service unavailable");
    let report = store.replay().await;
    assert_eq!(report.failed, vec![provisional.id().to_string()]);
    assert!(store.snapshot().last_error.is_some());

    let stored: Tracked<Teacher> = cache.get_by_id("teachers", provisional.id()).unwrap().unwrap();
    assert!(stored.is_offline());

    remote.recover();
    assert_eq!(store.replay().await.created, 1);
    assert_eq!(remote.rows().len(), 1);
  }

  #[tokio::test]
  async fn test_edit_of_remotely_deleted_record_is_discarded() {
    let (store, remote, cache, connectivity) = setup(true);
    remote.seed(vec![teacher("1", "Ada"), teacher("2", "Grace")]);
    store.load(false).await;

    connectivity.set_online(false);
    let patch = TeacherPatch {
      name: Some("Countess".to_string()),
      ..TeacherPatch::default()
    };
    store.update("1", patch).await.unwrap();
    remote.seed(vec![teacher("2", "Grace")]);

    connectivity.set_online(true);
    let report = store.replay().await;
    assert_eq!(report.discarded, 1);
    assert_eq!(report.updated, 0);
    assert!(report.failed.is_empty());
    assert_eq!(store.snapshot().last_error, None);

    assert!(cache.get_by_id::<Teacher>("teachers", "1").unwrap().is_none());
    let snap = store.snapshot();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.items[0].id(), "2");

    // Nothing left to push on the next reconnect
    assert!(store.replay().await.is_empty());
    assert_eq!(remote.update_calls(), 1);
  }

  #[tokio::test]
  async fn test_sync_pending_keeps_replay_error_after_reload() {
    let (store, remote, _, connectivity) = setup(true);
    remote.seed(vec![teacher("1", "Ada")]);
    store.load(false).await;

    connectivity.set_online(false);
    store.create(NewTeacher::named("Linus")).await.unwrap();

    connectivity.set_online(true);
    remote.fail_writes_with("row level security");
    let report = store.sync_pending().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(remote.fetch_calls(), 1);

    let snap = store.snapshot();
    assert_eq!(
      snap.last_error.as_deref(),
      Some("Failed to sync 1 offline change(s) for teachers")
    );
    assert_eq!(snap.provisional_count(), 1);
    assert!(!snap.is_loading);

    remote.recover();
    let report = store.sync_pending().await;
    assert_eq!(report.created, 1);
    assert_eq!(remote.fetch_calls(), 2);
    assert_eq!(store.snapshot().last_error, None);
  }
}
