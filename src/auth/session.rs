use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config;

/// The auth user as returned by GoTrue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub user_metadata: Value,
}

impl AuthUser {
  pub fn metadata_str(&self, key: &str) -> Option<&str> {
    self
      .user_metadata
      .get(key)
      .and_then(Value::as_str)
      .filter(|s| !s.is_empty())
  }
}

/// Signed-in session tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub expires_at: Option<i64>,
  pub user: AuthUser,
}

/// Session persisted between CLI invocations.
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn open_default() -> Result<Self> {
    Ok(Self::new(config::data_dir()?.join("session.json")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<Option<Session>> {
    if !self.path.exists() {
      return Ok(None);
    }
    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read session {}: {}", self.path.display(), e))?;
    let session = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Corrupt session file {}: {}", self.path.display(), e))?;
    Ok(Some(session))
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create {}: {}", parent.display(), e))?;
    }
    let contents = serde_json::to_string_pretty(session)?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write session {}: {}", self.path.display(), e))
  }

  /// Forget the stored session. Missing files are fine.
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove session {}: {}", self.path.display(), e)),
    }
  }
}
