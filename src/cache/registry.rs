use std::path::Path;
use std::sync::Arc;

use super::storage::{CacheStorage, MemoryStorage, SqliteStorage};
use super::tier::{TierHandle, TierRole};
use crate::error::Result;
use crate::http::Response;

/// Every cache tier the process can see, owned explicitly and passed to
/// whoever needs it.
#[derive(Clone)]
pub struct CacheRegistry {
  storage: Arc<dyn CacheStorage>,
}

impl CacheRegistry {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage }
  }

  pub fn in_memory() -> Self {
    Self::new(Arc::new(MemoryStorage::new()))
  }

  pub fn open_sqlite(path: &Path) -> Result<Self> {
    Ok(Self::new(Arc::new(SqliteStorage::open(path)?)))
  }

  /// Handle to `role`'s tier at `version`, creating the tier if absent.
  pub(crate) fn open(&self, role: TierRole, version: u32) -> Result<TierHandle> {
    let handle = TierHandle::new(role, version);
    self.storage.create_tier(handle.name())?;
    Ok(handle)
  }

  pub fn tier_names(&self) -> Result<Vec<String>> {
    self.storage.tier_names()
  }

  pub fn contains(&self, name: &str) -> Result<bool> {
    Ok(self.tier_names()?.iter().any(|n| n == name))
  }

  pub(crate) fn delete(&self, name: &str) -> Result<bool> {
    self.storage.delete_tier(name)
  }

  pub(crate) fn get(&self, tier: &TierHandle, key: &str) -> Result<Option<Response>> {
    self.storage.get_entry(tier.name(), key)
  }

  pub(crate) fn put(&self, tier: &TierHandle, key: &str, response: &Response) -> Result<()> {
    self.storage.put_entry(tier.name(), key, response)
  }

  pub fn entry_count(&self, tier: &TierHandle) -> Result<usize> {
    self.storage.entry_count(tier.name())
  }
}
