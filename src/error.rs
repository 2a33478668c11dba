//! Error taxonomy shared by the store, the cache tiers and the sync layer.

use thiserror::Error;

/// Faults raised inside the offline engine.
///
/// Storage and network faults are caught at the strategy executor and sync
/// reconciler boundaries and turned into fallbacks; only the reconciler's
/// final verdict (`NotFound`, `Unauthenticated`) is meant to reach a user.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OfflineError {
  /// The durable store could not be opened (disabled, unwritable, corrupt).
  #[error("durable storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A write transaction aborted. `id` names the first offending entity.
  #[error("storage write failed for '{id}': {reason}")]
  StorageWriteFailed { id: String, reason: String },

  /// The network attempt rejected before producing a response.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// No entity at any layer.
  #[error("not found: {0}")]
  NotFound(String),

  /// No bearer credential present.
  #[error("authentication required")]
  Unauthenticated,

  /// The remote API answered with `{error: true, message}`.
  #[error("api error ({status}): {message}")]
  Api { status: u16, message: String },

  /// A success body that lacks the expected field.
  #[error("malformed api response: {0}")]
  MalformedResponse(String),

  /// Reverse geocoding failed for a single entity.
  #[error("location lookup failed: {0}")]
  Geocoding(String),

  /// Activation was requested before this version's shell was installed.
  #[error("worker cannot activate from state {0}")]
  NotInstalled(String),

  /// The worker event loop has shut down.
  #[error("worker host is not running")]
  HostStopped,
}

impl OfflineError {
  pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
    Self::StorageUnavailable(e.to_string())
  }

  pub(crate) fn network(e: impl std::fmt::Display) -> Self {
    Self::NetworkUnavailable(e.to_string())
  }

  /// Whether this fault means the durable store is absent, in which case
  /// callers degrade to network-only behavior.
  pub fn is_storage_unavailable(&self) -> bool {
    matches!(self, Self::StorageUnavailable(_))
  }
}

pub type Result<T, E = OfflineError> = std::result::Result<T, E>;
