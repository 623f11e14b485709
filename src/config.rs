use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Public site URL used for auth redirect links
  #[serde(default = "default_site_url")]
  pub site_url: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub realtime: RealtimeConfig,
  #[serde(default)]
  pub auth: AuthConfig,
}

fn default_site_url() -> String {
  "https://nesttask.vercel.app".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://abcd.supabase.co
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Minutes before cached remote data is considered stale
  #[serde(default = "default_freshness_minutes")]
  pub freshness_minutes: i64,
  /// Cache database location (defaults to the data directory)
  pub path: Option<PathBuf>,
}

fn default_freshness_minutes() -> i64 {
  60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      freshness_minutes: default_freshness_minutes(),
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  #[serde(default = "default_check_interval")]
  pub check_interval_secs: u64,
  #[serde(default = "default_check_timeout")]
  pub check_timeout_secs: u64,
}

fn default_check_interval() -> u64 {
  15
}

fn default_check_timeout() -> u64 {
  5
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      check_interval_secs: default_check_interval(),
      check_timeout_secs: default_check_timeout(),
    }
  }
}

impl ConnectivityConfig {
  pub fn check_interval(&self) -> Duration {
    Duration::from_secs(self.check_interval_secs)
  }

  pub fn check_timeout(&self) -> Duration {
    Duration::from_secs(self.check_timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
  /// How often table fingerprints are polled for changes
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
  10
}

impl Default for RealtimeConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: default_poll_interval(),
    }
  }
}

impl RealtimeConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  /// Pause after sign-in/sign-up so the backend trigger can create the profile row
  #[serde(default = "default_profile_delay")]
  pub profile_delay_ms: u64,
}

fn default_profile_delay() -> u64 {
  1000
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      profile_delay_ms: default_profile_delay(),
    }
  }
}

impl AuthConfig {
  pub fn profile_delay(&self) -> Duration {
    Duration::from_millis(self.profile_delay_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./nestsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/nestsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/nestsync/config.yaml\n\
                 with at least `backend: {{ url: https://<project>.supabase.co }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("nestsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("nestsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.freshness_minutes < 0 {
      return Err(eyre!("cache.freshness_minutes must not be negative"));
    }
    Ok(config)
  }

  pub fn freshness(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.cache.freshness_minutes)
  }

  /// Absolute URL the password-reset email should send the user to.
  pub fn auth_redirect_url(&self, path: &str) -> String {
    let base = self.site_url.trim_end_matches('/');
    if path.starts_with('/') {
      format!("{}{}", base, path)
    } else {
      format!("{}/{}", base, path)
    }
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks NESTSYNC_SUPABASE_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("NESTSYNC_SUPABASE_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!(
          "Backend API key not found. Set NESTSYNC_SUPABASE_KEY or SUPABASE_ANON_KEY environment variable."
        )
      })
  }
}

/// Directory for the cache database, session file and logs.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("nestsync"))
}
