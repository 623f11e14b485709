use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::store::SyncStore;
use crate::cache::{CacheStorage, Record};
use crate::realtime::{ChangeEvent, ChangeNotifier, Subscription};
use crate::remote::RemoteService;

impl<T, R, S> SyncStore<T, R, S>
where
  T: Record,
  R: RemoteService<T>,
  S: CacheStorage + 'static,
{
  /// Drive the store for as long as the returned task runs.
  ///
  /// Performs the initial load, then follows connectivity: while online it
  /// listens for change events on the entity's channel and refetches on each
  /// one; on reconnect it replays offline work before loading; on disconnect
  /// it drops the subscription and serves the cache. Aborting the task
  /// releases the subscription.
  pub fn spawn_bridge<N: ChangeNotifier>(self: Arc<Self>, notifier: Arc<N>) -> JoinHandle<()> {
    tokio::spawn(async move { self.run_bridge(notifier.as_ref()).await })
  }

  async fn run_bridge<N: ChangeNotifier>(&self, notifier: &N) {
    let mut status = self.connectivity.subscribe();
    let (tx, mut events) = mpsc::unbounded_channel::<ChangeEvent>();

    let mut online = *status.borrow_and_update();
    let mut subscription = self.enter(online, notifier, &tx).await;

    loop {
      tokio::select! {
        changed = status.changed() => {
          if changed.is_err() {
            break;
          }
          let now = *status.borrow_and_update();
          if now == online {
            continue;
          }
          online = now;
          // Release before resubscribing so a channel is never held twice
          drop(subscription.take());
          subscription = self.enter(online, notifier, &tx).await;
        }
        Some(event) = events.recv() => {
          if !online {
            continue;
          }
          tracing::debug!(channel = %event.channel, kind = ?event.kind, "change received, refreshing");
          self.load(true).await;
        }
      }
    }
  }

  async fn enter<N: ChangeNotifier>(
    &self,
    online: bool,
    notifier: &N,
    tx: &mpsc::UnboundedSender<ChangeEvent>,
  ) -> Option<Subscription> {
    if !online {
      self.load(false).await;
      return None;
    }

    let subscription = notifier.subscribe(T::kind(), tx.clone());
    self.sync_pending().await;
    Some(subscription)
  }
}
