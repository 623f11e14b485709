//! In-memory remote and store fixtures shared by the sync tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::SyncStore;
use crate::cache::{Record, SqliteStorage};
use crate::connectivity::ConnectivityMonitor;
use crate::domain::{NewTeacher, Teacher};
use crate::remote::{MissingRow, RemoteService};

struct Inner<T> {
  rows: Mutex<Vec<T>>,
  failure: Mutex<Option<String>>,
  write_failure: Mutex<Option<String>>,
  next_id: AtomicUsize,
  fetches: AtomicUsize,
  creates: AtomicUsize,
  updates: AtomicUsize,
  deletes: AtomicUsize,
}

/// Scripted remote table that counts every call.
pub struct FakeRemote<T> {
  inner: Arc<Inner<T>>,
}

impl<T> Clone for FakeRemote<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T> Default for FakeRemote<T> {
  fn default() -> Self {
    Self {
      inner: Arc::new(Inner {
        rows: Mutex::new(Vec::new()),
        failure: Mutex::new(None),
        write_failure: Mutex::new(None),
        next_id: AtomicUsize::new(1),
        fetches: AtomicUsize::new(0),
        creates: AtomicUsize::new(0),
        updates: AtomicUsize::new(0),
        deletes: AtomicUsize::new(0),
      }),
    }
  }
}

impl<T: Clone> FakeRemote<T> {
  pub fn seed(&self, rows: Vec<T>) {
    *self.inner.rows.lock().unwrap() = rows;
  }

  pub fn rows(&self) -> Vec<T> {
    self.inner.rows.lock().unwrap().clone()
  }

  /// Make every following call fail with `message`.
  pub fn fail_with(&self, message: &str) {
    *self.inner.failure.lock().unwrap() = Some(message.to_string());
  }

  /// Make creates, updates and deletes fail while fetches keep working.
  pub fn fail_writes_with(&self, message: &str) {
    *self.inner.write_failure.lock().unwrap() = Some(message.to_string());
  }

  pub fn recover(&self) {
    *self.inner.failure.lock().unwrap() = None;
    *self.inner.write_failure.lock().unwrap() = None;
  }

  pub fn fetch_calls(&self) -> usize {
    self.inner.fetches.load(Ordering::SeqCst)
  }

  pub fn create_calls(&self) -> usize {
    self.inner.creates.load(Ordering::SeqCst)
  }

  pub fn update_calls(&self) -> usize {
    self.inner.updates.load(Ordering::SeqCst)
  }

  pub fn delete_calls(&self) -> usize {
    self.inner.deletes.load(Ordering::SeqCst)
  }

  fn check(&self, counter: &AtomicUsize) -> Result<()> {
    counter.fetch_add(1, Ordering::SeqCst);
    match self.inner.failure.lock().unwrap().as_ref() {
      Some(message) => Err(eyre!("{}", message)),
      None => Ok(()),
    }
  }

  fn check_write(&self, counter: &AtomicUsize) -> Result<()> {
    self.check(counter)?;
    match self.inner.write_failure.lock().unwrap().as_ref() {
      Some(message) => Err(eyre!("{}", message)),
      None => Ok(()),
    }
  }
}

impl<T: Record> RemoteService<T> for FakeRemote<T> {
  async fn fetch_all(&self) -> Result<Vec<T>> {
    self.check(&self.inner.fetches)?;
    Ok(self.rows())
  }

  async fn create(&self, draft: &T::Draft) -> Result<T> {
    self.check_write(&self.inner.creates)?;
    let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
    let record = T::from_draft(format!("srv-{}", n), Utc::now(), draft.clone());
    self.inner.rows.lock().unwrap().push(record.clone());
    Ok(record)
  }

  async fn update(&self, id: &str, patch: &T::Patch) -> Result<Option<T>> {
    self.check_write(&self.inner.updates)?;
    let mut rows = self.inner.rows.lock().unwrap();
    match rows.iter_mut().find(|r| r.id() == id) {
      Some(row) => {
        row.apply(patch);
        Ok(Some(row.clone()))
      }
      None => Err(
        MissingRow {
          kind: T::kind(),
          id: id.to_string(),
        }
        .into(),
      ),
    }
  }

  async fn delete(&self, id: &str) -> Result<()> {
    self.check_write(&self.inner.deletes)?;
    self.inner.rows.lock().unwrap().retain(|r| r.id() != id);
    Ok(())
  }
}

pub type TestStore = SyncStore<Teacher, FakeRemote<Teacher>, SqliteStorage>;

/// Teacher store over an in-memory cache.
pub fn setup(
  online: bool,
) -> (
  TestStore,
  FakeRemote<Teacher>,
  Arc<SqliteStorage>,
  ConnectivityMonitor,
) {
  let remote = FakeRemote::default();
  let cache = Arc::new(SqliteStorage::open_in_memory().unwrap());
  let connectivity = ConnectivityMonitor::new(online);
  let store = SyncStore::new(remote.clone(), cache.clone(), connectivity.clone());
  (store, remote, cache, connectivity)
}

pub fn teacher(id: &str, name: &str) -> Teacher {
  Teacher::from_draft(id.to_string(), Utc::now(), NewTeacher::named(name))
}
