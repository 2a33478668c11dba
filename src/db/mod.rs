//! Durable entity store for stories.
//!
//! Survives restarts, migrates its schema on open, and is the single choke
//! point for upserts: every writer goes through [`StoryStore::put_all`].

pub mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{OfflineError, Result};
use crate::stories::Story;

/// Handle to the opened store. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct StoryStore {
  conn: Arc<Mutex<Connection>>,
}

impl StoryStore {
  /// Open or create the store at `path`, running pending migrations.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        OfflineError::storage(format!(
          "failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      OfflineError::storage(format!(
        "failed to open story store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Store that lives only as long as the process.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(OfflineError::storage)?;
    Self::from_connection(conn)
  }

  fn from_connection(mut conn: Connection) -> Result<Self> {
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(OfflineError::storage)?;
    schema::migrate(&mut conn)?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| OfflineError::storage(format!("lock poisoned: {}", e)))
  }

  pub fn schema_version(&self) -> Result<u32> {
    let conn = self.lock()?;
    schema::current_version(&conn)
  }

  /// Upsert a single story.
  pub fn put(&self, story: &Story) -> Result<()> {
    self.put_all(std::slice::from_ref(story))
  }

  /// Upsert every story by id inside one transaction. Either all become
  /// visible or none do.
  pub fn put_all(&self, stories: &[Story]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn.transaction().map_err(|e| OfflineError::StorageWriteFailed {
      id: stories.first().map(|s| s.id.clone()).unwrap_or_default(),
      reason: format!("failed to begin transaction: {}", e),
    })?;

    for story in stories {
      let write_failed = |reason: String| OfflineError::StorageWriteFailed {
        id: story.id.clone(),
        reason,
      };

      if story.id.is_empty() {
        return Err(write_failed("story id is empty".to_string()));
      }

      let data = serde_json::to_vec(story)
        .map_err(|e| write_failed(format!("failed to serialize story: {}", e)))?;

      tx.execute(
        "INSERT OR REPLACE INTO stories (id, data, stored_at) VALUES (?, ?, datetime('now'))",
        params![story.id, data],
      )
      .map_err(|e| write_failed(format!("failed to store story: {}", e)))?;
    }

    tx.commit().map_err(|e| OfflineError::StorageWriteFailed {
      id: stories.first().map(|s| s.id.clone()).unwrap_or_default(),
      reason: format!("failed to commit transaction: {}", e),
    })?;

    Ok(())
  }

  /// Every stored story, in no particular order.
  pub fn get_all(&self) -> Result<Vec<Story>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT id, data FROM stories")
      .map_err(OfflineError::storage)?;

    let rows: Vec<(String, Vec<u8>)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(OfflineError::storage)?
      .filter_map(|r| {
        r.inspect_err(|e| warn!(error = %e, "skipping unreadable story row"))
          .ok()
      })
      .collect();

    let stories = rows
      .into_iter()
      .filter_map(|(id, data)| match serde_json::from_slice::<Story>(&data) {
        Ok(story) => Some(story),
        Err(e) => {
          warn!(story_id = %id, error = %e, "skipping undecodable story");
          None
        }
      })
      .collect();

    Ok(stories)
  }

  pub fn get_by_id(&self, id: &str) -> Result<Story> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM stories WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(OfflineError::storage)?;

    match data {
      Some(data) => serde_json::from_slice(&data)
        .map_err(|e| OfflineError::storage(format!("failed to decode story {}: {}", id, e))),
      None => Err(OfflineError::NotFound(id.to_string())),
    }
  }

  pub fn delete_by_id(&self, id: &str) -> Result<()> {
    let conn = self.lock()?;

    let deleted = conn
      .execute("DELETE FROM stories WHERE id = ?", params![id])
      .map_err(|e| OfflineError::StorageWriteFailed {
        id: id.to_string(),
        reason: e.to_string(),
      })?;

    if deleted == 0 {
      return Err(OfflineError::NotFound(id.to_string()));
    }
    info!(story_id = %id, "story deleted from store");
    Ok(())
  }

  /// Remove every story. Cache tiers are untouched.
  pub fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM stories", [])
      .map_err(|e| OfflineError::StorageWriteFailed {
        id: String::new(),
        reason: e.to_string(),
      })?;
    info!("all stories cleared from store");
    Ok(())
  }
}

/// Opens the store once per process; concurrent callers await the same
/// initialization and receive clones of one handle.
pub struct StoreOpener {
  path: Option<PathBuf>,
  cell: OnceCell<StoryStore>,
}

impl StoreOpener {
  pub fn new(path: PathBuf) -> Self {
    Self {
      path: Some(path),
      cell: OnceCell::new(),
    }
  }

  /// Opener for a platform without durable storage; `open` always fails.
  pub fn disabled() -> Self {
    Self {
      path: None,
      cell: OnceCell::new(),
    }
  }

  pub async fn open(&self) -> Result<StoryStore> {
    let path = self
      .path
      .clone()
      .ok_or_else(|| OfflineError::StorageUnavailable("durable storage is disabled".to_string()))?;

    let store = self
      .cell
      .get_or_try_init(|| async move {
        tokio::task::spawn_blocking(move || StoryStore::open_at(&path))
          .await
          .map_err(OfflineError::storage)?
      })
      .await?;

    Ok(store.clone())
  }
}

/// Default on-disk location of the story store.
pub fn default_path() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| OfflineError::storage("could not determine data directory"))?;

  Ok(data_dir.join("sosmed").join("stories.db"))
}
