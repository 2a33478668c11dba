use rusqlite::Connection;
use tracing::info;

use crate::error::{OfflineError, Result};

/// Ordered schema migrations. Entry `i` upgrades the store to version `i + 1`.
/// Every statement must be safe to run against an already-migrated store.
pub const MIGRATIONS: &[&str] = &[
  r#"
-- Stories keyed by id, serialized as JSON
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
  r#"
CREATE INDEX IF NOT EXISTS idx_stories_stored_at ON stories(stored_at);
"#,
];

/// Version the code expects the on-disk store to be at.
pub fn target_version() -> u32 {
  MIGRATIONS.len() as u32
}

pub fn current_version(conn: &Connection) -> Result<u32> {
  conn
    .pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))
    .map_err(OfflineError::storage)
}

/// Bring the store up to `target_version()`, one transaction per step.
pub fn migrate(conn: &mut Connection) -> Result<()> {
  let current = current_version(conn)?;

  for (index, sql) in MIGRATIONS.iter().enumerate() {
    let version = index as u32 + 1;
    if current >= version {
      continue;
    }

    let tx = conn.transaction().map_err(OfflineError::storage)?;
    tx.execute_batch(sql)
      .map_err(|e| OfflineError::storage(format!("migration v{} failed: {}", version, e)))?;
    tx.pragma_update(None, "user_version", version)
      .map_err(OfflineError::storage)?;
    tx.commit().map_err(OfflineError::storage)?;

    info!(version, "story store migrated");
  }

  Ok(())
}
