//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheMeta, OfflineMark, Record, Tracked};

/// Trait for local cache backends.
///
/// Records live in named partitions, one per entity type. Freshness metadata
/// is kept apart from the partitions so clearing a partition never touches it.
pub trait CacheStorage: Send + Sync {
  /// Upsert records, keeping the position of ids already present.
  fn save_all<T: Record>(&self, partition: &str, records: &[Tracked<T>]) -> Result<()>;

  /// Upsert a single record.
  fn save<T: Record>(&self, partition: &str, record: &Tracked<T>) -> Result<()> {
    self.save_all(partition, std::slice::from_ref(record))
  }

  /// Replace the whole partition with `records`, in order.
  fn replace_all<T: Record>(&self, partition: &str, records: &[Tracked<T>]) -> Result<()>;

  /// All records of a partition in insertion order.
  fn get_all<T: Record>(&self, partition: &str) -> Result<Vec<Tracked<T>>>;

  /// A single record by id.
  fn get_by_id<T: Record>(&self, partition: &str, id: &str) -> Result<Option<Tracked<T>>>;

  /// Remove a record. Removing an unknown id is not an error.
  fn remove(&self, partition: &str, id: &str) -> Result<()>;

  fn get_meta(&self, partition: &str) -> Result<Option<CacheMeta>>;

  fn set_meta(&self, partition: &str, meta: &CacheMeta) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway cache that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cached record; rowid preserves insertion order
CREATE TABLE IF NOT EXISTS records (
    partition TEXT NOT NULL,
    id TEXT NOT NULL,
    data BLOB NOT NULL,
    mark TEXT NOT NULL DEFAULT 'synced',
    PRIMARY KEY (partition, id)
);

-- Freshness metadata, one row per partition
CREATE TABLE IF NOT EXISTS cache_meta (
    partition TEXT PRIMARY KEY,
    last_fetched_ms INTEGER
);
"#;

const UPSERT_RECORD: &str = "INSERT INTO records (partition, id, data, mark) VALUES (?, ?, ?, ?)
   ON CONFLICT (partition, id) DO UPDATE SET data = excluded.data, mark = excluded.mark";

fn upsert<T: Record>(conn: &Connection, partition: &str, record: &Tracked<T>) -> Result<()> {
  let data = serde_json::to_vec(&record.record)
    .map_err(|e| eyre!("Failed to serialize record: {}", e))?;

  conn
    .execute(
      UPSERT_RECORD,
      params![partition, record.id(), data, record.mark.as_str()],
    )
    .map_err(|e| eyre!("Failed to store record {}: {}", record.id(), e))?;

  Ok(())
}

fn decode<T: Record>(data: &[u8], mark: &str) -> Result<Tracked<T>> {
  let record: T =
    serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize record: {}", e))?;
  let mark = OfflineMark::parse(mark).ok_or_else(|| eyre!("Unknown record mark '{}'", mark))?;
  Ok(Tracked::with_mark(record, mark))
}

impl CacheStorage for SqliteStorage {
  fn save_all<T: Record>(&self, partition: &str, records: &[Tracked<T>]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for record in records {
      upsert(&tx, partition, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn replace_all<T: Record>(&self, partition: &str, records: &[Tracked<T>]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM records WHERE partition = ?", params![partition])
      .map_err(|e| eyre!("Failed to clear partition {}: {}", partition, e))?;

    for record in records {
      upsert(&tx, partition, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn get_all<T: Record>(&self, partition: &str) -> Result<Vec<Tracked<T>>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT data, mark FROM records WHERE partition = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(Vec<u8>, String)> = stmt
      .query_map(params![partition], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read records: {}", e))?;

    // A row that no longer matches the record shape is skipped, not fatal
    let records = rows
      .iter()
      .filter_map(|(data, mark)| match decode(data, mark) {
        Ok(record) => Some(record),
        Err(e) => {
          tracing::warn!(partition, error = %e, "skipping unreadable cached record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  fn get_by_id<T: Record>(&self, partition: &str, id: &str) -> Result<Option<Tracked<T>>> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, mark FROM records WHERE partition = ? AND id = ?",
        params![partition, id],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query record {}: {}", id, e))?;

    row.map(|(data, mark)| decode(&data, &mark)).transpose()
  }

  fn remove(&self, partition: &str, id: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM records WHERE partition = ? AND id = ?",
        params![partition, id],
      )
      .map_err(|e| eyre!("Failed to remove record {}: {}", id, e))?;

    Ok(())
  }

  fn get_meta(&self, partition: &str) -> Result<Option<CacheMeta>> {
    let conn = self.lock()?;

    let row: Option<Option<i64>> = conn
      .query_row(
        "SELECT last_fetched_ms FROM cache_meta WHERE partition = ?",
        params![partition],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache metadata: {}", e))?;

    Ok(row.map(|ms| CacheMeta {
      last_fetched: ms.and_then(DateTime::<Utc>::from_timestamp_millis),
    }))
  }

  fn set_meta(&self, partition: &str, meta: &CacheMeta) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_meta (partition, last_fetched_ms) VALUES (?, ?)",
        params![partition, meta.last_fetched.map(|t| t.timestamp_millis())],
      )
      .map_err(|e| eyre!("Failed to store cache metadata: {}", e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Teacher, NewTeacher};

  fn teacher(id: &str, name: &str) -> Teacher {
    Teacher::from_draft(
      id.to_string(),
      Utc::now(),
      NewTeacher {
        name: name.to_string(),
        ..NewTeacher::default()
      },
    )
  }

  #[test]
  fn test_save_and_read_back_in_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let records = vec![
      Tracked::synced(teacher("b", "Second")),
      Tracked::synced(teacher("a", "First")),
    ];
    storage.save_all("teachers", &records).unwrap();

    let all: Vec<Tracked<Teacher>> = storage.get_all("teachers").unwrap();
    assert_eq!(all, records);
    assert!(storage.get_all::<Teacher>("courses").unwrap().is_empty());
  }

  #[test]
  fn test_upsert_keeps_position_and_updates_mark() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .save_all(
        "teachers",
        &[
          Tracked::synced(teacher("a", "A")),
          Tracked::synced(teacher("b", "B")),
        ],
      )
      .unwrap();

    let edited = Tracked::with_mark(teacher("a", "A2"), OfflineMark::OfflineUpdated);
    storage.save("teachers", &edited).unwrap();

    let all: Vec<Tracked<Teacher>> = storage.get_all("teachers").unwrap();
    assert_eq!(all[0], edited);
    assert_eq!(all[1].id(), "b");
  }

  #[test]
  fn test_get_by_id_and_remove() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .save("teachers", &Tracked::synced(teacher("a", "A")))
      .unwrap();

    assert!(storage
      .get_by_id::<Teacher>("teachers", "a")
      .unwrap()
      .is_some());
    storage.remove("teachers", "a").unwrap();
    storage.remove("teachers", "missing").unwrap();
    assert!(storage
      .get_by_id::<Teacher>("teachers", "a")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_replace_all_only_touches_one_partition() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .save("teachers", &Tracked::synced(teacher("a", "A")))
      .unwrap();
    storage
      .save("other", &Tracked::synced(teacher("x", "X")))
      .unwrap();

    storage
      .replace_all("teachers", &[Tracked::synced(teacher("c", "C"))])
      .unwrap();

    let ids: Vec<String> = storage
      .get_all::<Teacher>("teachers")
      .unwrap()
      .iter()
      .map(|t| t.id().to_string())
      .collect();
    assert_eq!(ids, vec!["c"]);
    assert_eq!(storage.get_all::<Teacher>("other").unwrap().len(), 1);
  }

  #[test]
  fn test_meta_absent_until_set() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.get_meta("courses").unwrap(), None);

    let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
    storage
      .set_meta("courses", &CacheMeta::fetched_at(at))
      .unwrap();
    assert_eq!(
      storage.get_meta("courses").unwrap(),
      Some(CacheMeta::fetched_at(at))
    );
  }

  #[test]
  fn test_open_on_disk_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(Some(&path)).unwrap();
      storage
        .save("teachers", &Tracked::synced(teacher("a", "A")))
        .unwrap();
    }
    let storage = SqliteStorage::open(Some(&path)).unwrap();
    assert_eq!(storage.get_all::<Teacher>("teachers").unwrap().len(), 1);
  }
}
