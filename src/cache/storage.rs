//! Cache storage trait with in-memory and SQLite implementations.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::warn;

use crate::error::{OfflineError, Result};
use crate::http::Response;

/// Trait for tier storage backends.
///
/// Tiers are flat namespaces of `key -> response`. Writing into a tier that
/// does not exist yet creates it.
pub trait CacheStorage: Send + Sync {
  /// Names of every tier present, including ones this subsystem does not own.
  fn tier_names(&self) -> Result<Vec<String>>;

  /// Create an empty tier if absent.
  fn create_tier(&self, name: &str) -> Result<()>;

  /// Drop a tier and all its entries. Returns whether it existed.
  fn delete_tier(&self, name: &str) -> Result<bool>;

  fn get_entry(&self, tier: &str, key: &str) -> Result<Option<Response>>;

  fn put_entry(&self, tier: &str, key: &str, response: &Response) -> Result<()>;

  fn entry_count(&self, tier: &str) -> Result<usize>;
}

/// Process-local storage; tiers vanish with the process.
#[derive(Default)]
pub struct MemoryStorage {
  tiers: RwLock<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

fn poisoned(e: impl std::fmt::Display) -> OfflineError {
  OfflineError::storage(format!("lock poisoned: {}", e))
}

impl CacheStorage for MemoryStorage {
  fn tier_names(&self) -> Result<Vec<String>> {
    Ok(self.tiers.read().map_err(poisoned)?.keys().cloned().collect())
  }

  fn create_tier(&self, name: &str) -> Result<()> {
    self
      .tiers
      .write()
      .map_err(poisoned)?
      .entry(name.to_string())
      .or_default();
    Ok(())
  }

  fn delete_tier(&self, name: &str) -> Result<bool> {
    Ok(self.tiers.write().map_err(poisoned)?.remove(name).is_some())
  }

  fn get_entry(&self, tier: &str, key: &str) -> Result<Option<Response>> {
    Ok(
      self
        .tiers
        .read()
        .map_err(poisoned)?
        .get(tier)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put_entry(&self, tier: &str, key: &str, response: &Response) -> Result<()> {
    self
      .tiers
      .write()
      .map_err(poisoned)?
      .entry(tier.to_string())
      .or_default()
      .insert(key.to_string(), response.clone());
    Ok(())
  }

  fn entry_count(&self, tier: &str) -> Result<usize> {
    Ok(
      self
        .tiers
        .read()
        .map_err(poisoned)?
        .get(tier)
        .map_or(0, |entries| entries.len()),
    )
  }
}

/// SQLite-based tier storage, surviving restarts like the story store.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tiers (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses, keyed by a hash of the normalized request key
CREATE TABLE IF NOT EXISTS tier_entries (
    tier TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    response BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tier, key_hash)
);
"#;

impl SqliteStorage {
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        OfflineError::storage(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      OfflineError::storage(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(OfflineError::storage)?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| OfflineError::storage(format!("failed to create cache tables: {}", e)))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(poisoned)
  }
}

/// SHA256 of the request key, for stable fixed-length primary keys.
fn key_hash(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStorage for SqliteStorage {
  fn tier_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM tiers ORDER BY name")
      .map_err(OfflineError::storage)?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(OfflineError::storage)?
      .filter_map(|r| {
        r.inspect_err(|e| warn!(error = %e, "skipping unreadable tier row"))
          .ok()
      })
      .collect();
    Ok(names)
  }

  fn create_tier(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("INSERT OR IGNORE INTO tiers (name) VALUES (?)", params![name])
      .map_err(|e| OfflineError::StorageWriteFailed {
        id: name.to_string(),
        reason: e.to_string(),
      })?;
    Ok(())
  }

  fn delete_tier(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let write_failed = |e: rusqlite::Error| OfflineError::StorageWriteFailed {
      id: name.to_string(),
      reason: e.to_string(),
    };

    let tx = conn.transaction().map_err(write_failed)?;
    tx.execute("DELETE FROM tier_entries WHERE tier = ?", params![name])
      .map_err(write_failed)?;
    let removed = tx
      .execute("DELETE FROM tiers WHERE name = ?", params![name])
      .map_err(write_failed)?;
    tx.commit().map_err(write_failed)?;

    Ok(removed > 0)
  }

  fn get_entry(&self, tier: &str, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT response FROM tier_entries WHERE tier = ? AND key_hash = ?",
        params![tier, key_hash(key)],
        |row| row.get(0),
      )
      .optional()
      .map_err(OfflineError::storage)?;

    data
      .map(|data| {
        serde_json::from_slice(&data)
          .map_err(|e| OfflineError::storage(format!("failed to decode cached response: {}", e)))
      })
      .transpose()
  }

  fn put_entry(&self, tier: &str, key: &str, response: &Response) -> Result<()> {
    let mut conn = self.lock()?;
    let write_failed = |reason: String| OfflineError::StorageWriteFailed {
      id: key.to_string(),
      reason,
    };

    let data = serde_json::to_vec(response)
      .map_err(|e| write_failed(format!("failed to serialize response: {}", e)))?;

    let tx = conn.transaction().map_err(|e| write_failed(e.to_string()))?;
    tx.execute("INSERT OR IGNORE INTO tiers (name) VALUES (?)", params![tier])
      .map_err(|e| write_failed(e.to_string()))?;
    tx.execute(
      "INSERT OR REPLACE INTO tier_entries (tier, key_hash, request_key, response, cached_at)
       VALUES (?, ?, ?, ?, datetime('now'))",
      params![tier, key_hash(key), key, data],
    )
    .map_err(|e| write_failed(e.to_string()))?;
    tx.commit().map_err(|e| write_failed(e.to_string()))?;

    Ok(())
  }

  fn entry_count(&self, tier: &str) -> Result<usize> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT COUNT(*) FROM tier_entries WHERE tier = ?",
        params![tier],
        |row| row.get::<_, i64>(0),
      )
      .map(|n| n as usize)
      .map_err(OfflineError::storage)
  }
}
