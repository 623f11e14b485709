//! CLI subcommands and their handlers.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::auth::{recovery_token, AuthClient, SessionStore, SignedIn, SignupRequest};
use crate::cache::{CacheStorage, Freshness, LoadSource, Record, SqliteStorage};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, HealthCheck, HttpHealthCheck};
use crate::domain::NewCourse;
use crate::realtime::PollingNotifier;
use crate::remote::{RemoteService, RestClient, TableService};
use crate::sync::{CourseStore, MaterialStore, SyncSnapshot, SyncStore, TeacherStore};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in and remember the session
  Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Create an account
  Signup {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    student_id: String,
  },
  /// Sign out and forget the session
  Logout,
  /// Email a password-reset link
  ResetPassword {
    #[arg(long)]
    email: String,
  },
  /// Set a new password, using the reset link or the current session
  UpdatePassword {
    #[arg(long)]
    password: String,
    /// Link from the password-reset email
    #[arg(long)]
    link: Option<String>,
  },
  /// Manage courses
  Courses {
    #[command(subcommand)]
    action: EntityAction,
  },
  /// Manage teachers
  Teachers {
    #[command(subcommand)]
    action: EntityAction,
  },
  /// Manage study materials
  Materials {
    #[command(subcommand)]
    action: EntityAction,
  },
  /// Push offline changes and refresh every collection
  Sync,
  /// Keep every collection in sync until interrupted
  Watch,
}

#[derive(Subcommand, Debug)]
pub enum EntityAction {
  /// Print the collection
  List {
    /// Ignore the freshness window
    #[arg(long)]
    refresh: bool,
  },
  /// Create a record from a JSON document (or @file)
  Add { json: String },
  /// Apply a partial JSON update (or @file)
  Update { id: String, json: String },
  Delete { id: String },
  /// Refetch from the backend
  Refresh,
}

/// Everything the entity commands work against.
struct Services {
  client: RestClient,
  connectivity: ConnectivityMonitor,
  courses: Arc<CourseStore>,
  teachers: Arc<TeacherStore>,
  materials: Arc<MaterialStore>,
}

impl Services {
  async fn open(config: &Config, sessions: &SessionStore) -> Result<Self> {
    let mut client = RestClient::from_config(config)?;
    if let Some(session) = sessions.load()? {
      client = client.with_access_token(session.access_token);
    }

    let health = HttpHealthCheck::new(client.clone(), config.connectivity.check_timeout());
    let connectivity = ConnectivityMonitor::new(health.check().await);
    if !connectivity.is_online() {
      tracing::warn!("backend unreachable, working offline");
    }

    let cache = Arc::new(SqliteStorage::open(config.cache.path.as_deref())?);
    let freshness = Freshness::new(config.freshness());

    Ok(Self {
      courses: Arc::new(
        SyncStore::new(
          TableService::new(client.clone()),
          cache.clone(),
          connectivity.clone(),
        )
        .with_freshness(freshness),
      ),
      teachers: Arc::new(
        SyncStore::new(
          TableService::new(client.clone()),
          cache.clone(),
          connectivity.clone(),
        )
        .with_freshness(freshness),
      ),
      materials: Arc::new(
        SyncStore::new(TableService::new(client.clone()), cache, connectivity.clone())
          .with_freshness(freshness),
      ),
      client,
      connectivity,
    })
  }
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  let sessions = SessionStore::open_default()?;

  match command {
    Command::Login { email, password } => {
      let signed_in = AuthClient::from_config(config)?
        .login(&email, &password)
        .await?;
      remember(&sessions, &signed_in)?;
      println!("Logged in as {}", signed_in.profile.name);
    }
    Command::Signup {
      email,
      password,
      name,
      phone,
      student_id,
    } => {
      let req = SignupRequest {
        email,
        password,
        name,
        phone,
        student_id,
      };
      let signed_in = AuthClient::from_config(config)?.signup(&req).await?;
      remember(&sessions, &signed_in)?;
      if signed_in.session.is_some() {
        println!("Signed up and logged in as {}", signed_in.profile.name);
      } else {
        println!("Signed up. Confirm your email address, then log in.");
      }
    }
    Command::Logout => {
      let Some(session) = sessions.load()? else {
        println!("You are not logged in.");
        return Ok(());
      };
      AuthClient::from_config(config)?.logout(&session).await?;
      sessions.clear()?;
      println!("You are logged out!");
    }
    Command::ResetPassword { email } => {
      AuthClient::from_config(config)?
        .reset_password(&email)
        .await?;
      println!("Password reset link sent to {}", email);
    }
    Command::UpdatePassword { password, link } => {
      let token = match link {
        Some(link) => recovery_token(&link),
        None => sessions.load()?.map(|s| s.access_token),
      }
      .unwrap_or_default();
      AuthClient::from_config(config)?
        .update_password(&password, &token)
        .await?;
      println!("Password updated");
    }
    Command::Courses {
      action: EntityAction::Add { json },
    } => {
      let services = Services::open(config, &sessions).await?;
      services.teachers.load(false).await;
      let teachers: Vec<_> = services
        .teachers
        .snapshot()
        .items
        .into_iter()
        .map(|t| t.record)
        .collect();
      let draft: NewCourse = parse_json(&json)?;
      let created = services.courses.create(draft.with_teacher(&teachers)).await?;
      print_json(&created)?;
    }
    Command::Courses { action } => {
      let services = Services::open(config, &sessions).await?;
      run_action(&services.courses, action).await?;
    }
    Command::Teachers { action } => {
      let services = Services::open(config, &sessions).await?;
      run_action(&services.teachers, action).await?;
    }
    Command::Materials { action } => {
      let services = Services::open(config, &sessions).await?;
      run_action(&services.materials, action).await?;
    }
    Command::Sync => {
      let services = Services::open(config, &sessions).await?;
      if !services.connectivity.is_online() {
        return Err(eyre!("Backend unreachable; offline changes stay queued"));
      }
      sync_one(&services.teachers).await;
      sync_one(&services.courses).await;
      sync_one(&services.materials).await;
    }
    Command::Watch => {
      let services = Services::open(config, &sessions).await?;
      watch_all(services, config).await?;
    }
  }

  Ok(())
}

fn remember(sessions: &SessionStore, signed_in: &SignedIn) -> Result<()> {
  if let Some(session) = &signed_in.session {
    sessions.save(session)?;
  }
  Ok(())
}

async fn run_action<T, R, S>(store: &SyncStore<T, R, S>, action: EntityAction) -> Result<()>
where
  T: Record,
  T::Draft: DeserializeOwned,
  T::Patch: DeserializeOwned,
  R: RemoteService<T>,
  S: CacheStorage + 'static,
{
  match action {
    EntityAction::List { refresh } => {
      let source = store.load(refresh).await;
      print_snapshot(&store.snapshot(), source)?;
    }
    EntityAction::Refresh => {
      let source = store.force_refresh().await;
      print_snapshot(&store.snapshot(), source)?;
    }
    EntityAction::Add { json } => {
      let created = store.create(parse_json(&json)?).await?;
      print_json(&created)?;
    }
    EntityAction::Update { id, json } => {
      store.load(false).await;
      match store.update(&id, parse_json(&json)?).await? {
        Some(updated) => print_json(&updated)?,
        None => println!("{} {} updated", T::kind().label(), id),
      }
    }
    EntityAction::Delete { id } => {
      store.load(false).await;
      store.delete(&id).await?;
      println!("{} {} deleted", T::kind().label(), id);
    }
  }
  Ok(())
}

async fn sync_one<T, R, S>(store: &SyncStore<T, R, S>)
where
  T: Record,
  R: RemoteService<T>,
  S: CacheStorage + 'static,
{
  let report = store.sync_pending().await;
  println!(
    "{}: {} created, {} updated, {} deleted, {} discarded, {} failed",
    T::kind(),
    report.created,
    report.updated,
    report.deleted,
    report.discarded,
    report.failed.len()
  );
  for id in &report.failed {
    println!("  still pending: {}", id);
  }
}

async fn watch_all(services: Services, config: &Config) -> Result<()> {
  let Services {
    client,
    connectivity,
    courses,
    teachers,
    materials,
  } = services;

  let health = HttpHealthCheck::new(client.clone(), config.connectivity.check_timeout());
  let mut tasks = vec![
    connectivity.spawn_health_check(health, config.connectivity.check_interval()),
  ];

  let notifier = Arc::new(PollingNotifier::new(
    client,
    config.realtime.poll_interval(),
  ));
  tasks.push(report_changes(teachers.subscribe()));
  tasks.push(report_changes(courses.subscribe()));
  tasks.push(report_changes(materials.subscribe()));
  tasks.push(teachers.spawn_bridge(notifier.clone()));
  tasks.push(courses.spawn_bridge(notifier.clone()));
  tasks.push(materials.spawn_bridge(notifier));

  println!("Watching for changes, press Ctrl-C to stop");
  tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

  for task in tasks {
    task.abort();
  }
  Ok(())
}

fn report_changes<T: Record>(
  mut rx: watch::Receiver<SyncSnapshot<T>>,
) -> tokio::task::JoinHandle<()> {
  tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      let snap = rx.borrow_and_update().clone();
      if snap.is_loading {
        continue;
      }
      tracing::info!(
        kind = %T::kind(),
        count = snap.len(),
        provisional = snap.provisional_count(),
        offline = snap.is_offline,
        "collection updated"
      );
      if let Some(err) = &snap.last_error {
        println!("{}: {}", T::kind(), err);
      } else {
        println!(
          "{}: {} item(s){}",
          T::kind(),
          snap.len(),
          if snap.is_offline { " (offline)" } else { "" }
        );
      }
    }
  })
}

/// Parse a JSON argument; `@path` reads the document from a file.
fn parse_json<D: DeserializeOwned>(input: &str) -> Result<D> {
  let text = match input.strip_prefix('@') {
    Some(path) => std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read {}: {}", path, e))?,
    None => input.to_string(),
  };
  serde_json::from_str(&text).map_err(|e| eyre!("Invalid JSON: {}", e))
}

fn print_json<V: Serialize>(value: &V) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_snapshot<T: Record>(snap: &SyncSnapshot<T>, source: LoadSource) -> Result<()> {
  if let Some(err) = &snap.last_error {
    eprintln!("warning: {}", err);
  }
  let origin = match source {
    LoadSource::Network => "backend",
    LoadSource::Cache => "cache",
    LoadSource::Fallback => "cache (backend failed)",
    LoadSource::Offline => "cache (offline)",
  };
  eprintln!("{} {} from {}", snap.len(), T::kind(), origin);
  print_json(&snap.items)
}
