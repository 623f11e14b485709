//! Online/offline signal shared by every sync store.

use reqwest::Method;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::RestClient;

/// Current connectivity plus a stream of transitions.
///
/// Cloning gives another handle to the same signal.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Publish a new state. Only real transitions wake subscribers.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    });

    if changed {
      if online {
        tracing::info!("connectivity restored");
      } else {
        tracing::warn!("connectivity lost, switching to offline mode");
      }
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Periodically run `health` and publish its verdict.
  pub fn spawn_health_check<P: HealthCheck>(
    &self,
    health: P,
    interval: Duration,
  ) -> JoinHandle<()> {
    let monitor = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let online = health.check().await;
        monitor.set_online(online);
      }
    })
  }
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new(true)
  }
}

/// A reachability check.
pub trait HealthCheck: Send + Sync + 'static {
  fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Checks the backend's auth health endpoint.
pub struct HttpHealthCheck {
  client: RestClient,
  timeout: Duration,
}

impl HttpHealthCheck {
  pub fn new(client: RestClient, timeout: Duration) -> Self {
    Self { client, timeout }
  }
}

impl HealthCheck for HttpHealthCheck {
  async fn check(&self) -> bool {
    let request = match self.client.request(Method::GET, "auth/v1/health") {
      Ok(request) => request.timeout(self.timeout),
      Err(_) => return false,
    };

    match self.client.send(request).await {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!(error = %e, "health check failed");
        false
      }
    }
  }
}
