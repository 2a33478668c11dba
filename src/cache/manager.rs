//! Tier lifecycle: creation, population, eviction and lookup.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use url::Url;

use super::registry::CacheRegistry;
use super::tier::{TierHandle, TierRole, TierState, TierVersions};
use crate::error::Result;
use crate::http::{CacheMode, Request, Response};
use crate::net::Fetcher;

/// One URL that could not be cached during population.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateFailure {
  pub url: Url,
  pub reason: String,
}

/// Outcome of populating a tier. Successful entries stay cached even when
/// others failed.
#[derive(Debug, Clone, Default)]
pub struct PopulateReport {
  pub succeeded: Vec<Url>,
  pub failed: Vec<PopulateFailure>,
}

impl PopulateReport {
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Owns the shell and dynamic tiers for the running code version.
pub struct CacheTierManager {
  registry: CacheRegistry,
  fetcher: Arc<dyn Fetcher>,
  versions: TierVersions,
  states: Mutex<HashMap<String, TierState>>,
}

impl CacheTierManager {
  pub fn new(registry: CacheRegistry, fetcher: Arc<dyn Fetcher>, versions: TierVersions) -> Self {
    Self {
      registry,
      fetcher,
      versions,
      states: Mutex::new(HashMap::new()),
    }
  }

  pub fn versions(&self) -> TierVersions {
    self.versions
  }

  pub fn registry(&self) -> &CacheRegistry {
    &self.registry
  }

  fn set_state(&self, name: &str, state: TierState) {
    self
      .states
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(name.to_string(), state);
  }

  /// Handle to `role`'s tier at `version`; creates it if absent.
  pub fn ensure_tier(&self, role: TierRole, version: u32) -> Result<TierHandle> {
    let handle = self.registry.open(role, version)?;
    debug!(tier = handle.name(), "tier ready");
    Ok(handle)
  }

  /// Where `role`'s tier at `version` sits in its lifecycle.
  pub fn state(&self, role: TierRole, version: u32) -> Result<TierState> {
    let name = role.tier_name(version);
    let recorded = self
      .states
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .get(&name)
      .copied();

    if recorded == Some(TierState::Evicted) {
      return Ok(TierState::Evicted);
    }
    if !self.registry.contains(&name)? {
      return Ok(TierState::Absent);
    }
    if version != self.versions.get(role) {
      return Ok(TierState::Stale);
    }
    Ok(recorded.unwrap_or(TierState::Current))
  }

  /// Fetch every request and cache the successful answers.
  ///
  /// Shell requests bypass intermediate caches so a stale copy upstream
  /// cannot poison the tier. Failures are reported per URL; the rest are
  /// kept.
  pub async fn populate(&self, tier: &TierHandle, requests: Vec<Request>) -> PopulateReport {
    self.set_state(tier.name(), TierState::Populating);

    let requests: Vec<Request> = requests
      .into_iter()
      .map(|r| match tier.role() {
        TierRole::Shell => r.with_cache(CacheMode::Reload),
        TierRole::Dynamic => r,
      })
      .collect();

    let outcomes = join_all(requests.iter().map(|request| async move {
      let response = self.fetcher.fetch(request).await.map_err(|e| e.to_string())?;
      if !response.is_success() {
        return Err(format!("answered with status {}", response.status));
      }
      self
        .write(tier, request, response)
        .await
        .map_err(|e| e.to_string())
    }))
    .await;

    let mut report = PopulateReport::default();
    for (request, outcome) in requests.into_iter().zip(outcomes) {
      match outcome {
        Ok(()) => report.succeeded.push(request.url),
        Err(reason) => {
          error!(tier = tier.name(), url = %request.url, reason = %reason, "failed to cache asset");
          report.failed.push(PopulateFailure {
            url: request.url,
            reason,
          });
        }
      }
    }

    self.set_state(tier.name(), TierState::Current);
    info!(
      tier = tier.name(),
      cached = report.succeeded.len(),
      failed = report.failed.len(),
      "tier populated"
    );
    report
  }

  /// Delete every tier of a known role whose version is not `current`.
  /// Tiers with unrecognized names are left alone.
  pub fn evict_stale(&self, current: &TierVersions) -> Result<Vec<String>> {
    let mut evicted = Vec::new();

    for name in self.registry.tier_names()? {
      let Some(role) = TierRole::owning(&name) else {
        continue;
      };
      if name == current.current_name(role) {
        continue;
      }

      if self.registry.delete(&name)? {
        info!(tier = %name, role = %role, "removed stale tier");
        self.set_state(&name, TierState::Evicted);
        evicted.push(name);
      }
    }

    Ok(evicted)
  }

  pub async fn lookup(&self, tier: &TierHandle, request: &Request) -> Result<Option<Response>> {
    if request.method != reqwest::Method::GET {
      return Ok(None);
    }
    self.registry.get(tier, &request.cache_key())
  }

  /// Store `response` under the request's key. Non-GET requests are never
  /// keyed. Callers decide which statuses are cacheable.
  pub async fn write(&self, tier: &TierHandle, request: &Request, response: Response) -> Result<()> {
    if request.method != reqwest::Method::GET {
      debug!(url = %request.url, method = %request.method, "not caching non-GET request");
      return Ok(());
    }
    self.registry.put(tier, &request.cache_key(), &response)
  }
}
