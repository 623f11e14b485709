use color_eyre::Report;

use crate::cache::EntityKind;

/// Failure of a single sync store operation.
#[derive(Debug)]
pub enum SyncError {
  /// The remote service rejected the call or could not be reached.
  Remote(Report),
  /// The target record is not in the local cache.
  NotFound { kind: EntityKind, id: String },
  /// The draft failed validation before any remote call.
  Invalid(String),
}

impl std::fmt::Display for SyncError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SyncError::Remote(e) => write!(f, "{:#}", e),
      SyncError::NotFound { kind, id } => write!(f, "{} not found: {}", kind.label(), id),
      SyncError::Invalid(msg) => f.write_str(msg),
    }
  }
}

impl std::error::Error for SyncError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      SyncError::Remote(e) => Some(AsRef::<dyn std::error::Error>::as_ref(e)),
      _ => None,
    }
  }
}

impl SyncError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, SyncError::NotFound { .. })
  }
}
