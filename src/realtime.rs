//! Change notifications for remote tables.
//!
//! A notifier only says "something changed on this channel"; listeners are
//! expected to refetch rather than apply the event.

use reqwest::Method;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cache::EntityKind;
use crate::remote::RestClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
  /// Something changed but the notifier can't tell what
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
  pub channel: String,
  pub kind: ChangeKind,
}

/// Live subscription to a change channel. Dropping it unsubscribes.
pub struct Subscription {
  channel: String,
  task: Option<JoinHandle<()>>,
}

impl Subscription {
  fn new(channel: &str, task: JoinHandle<()>) -> Self {
    Self {
      channel: channel.to_string(),
      task: Some(task),
    }
  }

  pub fn channel(&self) -> &str {
    &self.channel
  }

  pub fn unsubscribe(mut self) {
    self.release();
  }

  fn release(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
      tracing::debug!(channel = %self.channel, "unsubscribed");
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.release();
  }
}

/// Source of change events for entity tables.
pub trait ChangeNotifier: Send + Sync + 'static {
  /// Forward every change on `kind`'s channel to `events` until the
  /// subscription is released or the receiver goes away.
  fn subscribe(&self, kind: EntityKind, events: mpsc::UnboundedSender<ChangeEvent>)
    -> Subscription;
}

/// In-process notifier; whoever writes to the backend publishes here.
#[derive(Clone)]
pub struct LocalNotifier {
  bus: broadcast::Sender<ChangeEvent>,
}

impl Default for LocalNotifier {
  fn default() -> Self {
    let (bus, _) = broadcast::channel(256);
    Self { bus }
  }
}

impl LocalNotifier {
  pub fn publish(&self, channel: &str, kind: ChangeKind) {
    // No subscribers is fine
    let _ = self.bus.send(ChangeEvent {
      channel: channel.to_string(),
      kind,
    });
  }
}

impl ChangeNotifier for LocalNotifier {
  fn subscribe(
    &self,
    kind: EntityKind,
    events: mpsc::UnboundedSender<ChangeEvent>,
  ) -> Subscription {
    let channel = kind.channel();
    let mut rx = self.bus.subscribe();

    let task = tokio::spawn(async move {
      loop {
        let event = match rx.recv().await {
          Ok(event) if event.channel == channel => event,
          Ok(_) => continue,
          // Missed events still mean the table changed
          Err(broadcast::error::RecvError::Lagged(_)) => ChangeEvent {
            channel: channel.to_string(),
            kind: ChangeKind::Unknown,
          },
          Err(broadcast::error::RecvError::Closed) => break,
        };
        if events.send(event).is_err() {
          break;
        }
      }
    });

    tracing::debug!(channel, "subscribed to local change bus");
    Subscription::new(channel, task)
  }
}

/// Detects remote changes by polling each table and comparing fingerprints.
#[derive(Clone)]
pub struct PollingNotifier {
  client: RestClient,
  interval: Duration,
}

impl PollingNotifier {
  pub fn new(client: RestClient, interval: Duration) -> Self {
    Self { client, interval }
  }
}

/// SHA256 of a table listing, hex encoded.
pub fn fingerprint(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}

async fn poll_once(client: &RestClient, table: &str) -> color_eyre::Result<String> {
  let request = client
    .request(Method::GET, &format!("rest/v1/{}", table))?
    .query(&[("select", "*"), ("order", "id.asc")]);
  let res = client.send(request).await?;
  let body = res.bytes().await?;
  Ok(fingerprint(&body))
}

impl ChangeNotifier for PollingNotifier {
  fn subscribe(
    &self,
    kind: EntityKind,
    events: mpsc::UnboundedSender<ChangeEvent>,
  ) -> Subscription {
    let client = self.client.clone();
    let interval = self.interval;
    let channel = kind.channel();
    let table = kind.table();

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      let mut last: Option<String> = None;

      loop {
        ticker.tick().await;
        let current = match poll_once(&client, table).await {
          Ok(fp) => fp,
          Err(e) => {
            tracing::debug!(table, error = %e, "change poll failed");
            continue;
          }
        };

        let changed = last.as_ref().is_some_and(|prev| *prev != current);
        last = Some(current);

        if changed {
          tracing::debug!(channel, "remote change detected");
          let event = ChangeEvent {
            channel: channel.to_string(),
            kind: ChangeKind::Unknown,
          };
          if events.send(event).is_err() {
            break;
          }
        }
      }
    });

    tracing::debug!(channel, table, "polling for remote changes");
    Subscription::new(channel, task)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_local_notifier_filters_by_channel() {
    let notifier = LocalNotifier::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = notifier.subscribe(EntityKind::Course, tx);
    assert_eq!(sub.channel(), "courses");
    tokio::task::yield_now().await;

    notifier.publish("teachers", ChangeKind::Insert);
    notifier.publish("courses", ChangeKind::Delete);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.channel, "courses");
    assert_eq!(event.kind, ChangeKind::Delete);
  }

  #[tokio::test]
  async fn test_unsubscribe_stops_delivery() {
    let notifier = LocalNotifier::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = notifier.subscribe(EntityKind::Teacher, tx);
    sub.unsubscribe();
    tokio::task::yield_now().await;

    notifier.publish("teachers", ChangeKind::Update);
    // The forwarding task owned the only sender, so the channel closes
    assert_eq!(rx.recv().await, None);
  }

  #[test]
  fn test_fingerprint_is_stable() {
    assert_eq!(fingerprint(b"[]"), fingerprint(b"[]"));
    assert_ne!(fingerprint(b"[]"), fingerprint(b"[{}]"));
    assert_eq!(fingerprint(b"").len(), 64);
  }

  #[tokio::test]
  async fn test_polling_notifier_reports_changes_only() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/teachers"))
      .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
      .up_to_n_times(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/teachers"))
      .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":"1"}]"#))
      .mount(&server)
      .await;

    let client = RestClient::new(&server.uri(), "anon").unwrap();
    let notifier = PollingNotifier::new(client, Duration::from_millis(10));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = notifier.subscribe(EntityKind::Teacher, tx);

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(event.channel, "teachers");
    assert_eq!(event.kind, ChangeKind::Unknown);
  }
}
