use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::classify::Classifier;
use super::manifest::ShellManifest;
use super::strategy::{FetchOutcome, StrategyExecutor};
use crate::cache::{CacheTierManager, PopulateReport, TierRole, TierState};
use crate::error::{OfflineError, Result};
use crate::http::Request;
use crate::net::Fetcher;

/// Where a worker sits between being loaded and serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install or activation could not open its tiers.
  Redundant,
}

#[derive(Debug, Clone)]
pub struct ActivateReport {
  pub evicted: Vec<String>,
}

/// One code version of the offline layer: installs its shell tier, evicts
/// what older versions left behind, then routes fetches.
pub struct ServiceWorker {
  app_origin: Url,
  api_origin: Url,
  manifest: Arc<ShellManifest>,
  tiers: Arc<CacheTierManager>,
  fetcher: Arc<dyn Fetcher>,
  state: Mutex<WorkerState>,
  executor: RwLock<Option<Arc<StrategyExecutor>>>,
}

impl ServiceWorker {
  pub fn new(
    app_origin: Url,
    api_origin: Url,
    manifest: ShellManifest,
    tiers: Arc<CacheTierManager>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    Self {
      app_origin,
      api_origin,
      manifest: Arc::new(manifest),
      tiers,
      fetcher,
      state: Mutex::new(WorkerState::Parsed),
      executor: RwLock::new(None),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    debug!(?state, "worker state");
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  pub fn tiers(&self) -> &Arc<CacheTierManager> {
    &self.tiers
  }

  /// Populate the current shell tier. Per-URL failures are reported but do
  /// not fail the install; only an unusable tier does.
  pub async fn install(&self) -> Result<PopulateReport> {
    self.set_state(WorkerState::Installing);

    let version = self.tiers.versions().shell;
    let shell = match self.tiers.ensure_tier(TierRole::Shell, version) {
      Ok(shell) => shell,
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        return Err(e);
      }
    };

    let requests = self
      .manifest
      .install_urls(&self.app_origin)
      .into_iter()
      .map(Request::get)
      .collect();
    let report = self.tiers.populate(&shell, requests).await;

    if !report.is_complete() {
      warn!(
        tier = shell.name(),
        missing = report.failed.len(),
        "shell tier is incomplete"
      );
    }
    self.set_state(WorkerState::Installed);
    Ok(report)
  }

  /// Whether this version's shell tier already exists, populated by an
  /// earlier process running the same version.
  pub fn shell_installed(&self) -> Result<bool> {
    let state = self.tiers.state(TierRole::Shell, self.tiers.versions().shell)?;
    Ok(state == TierState::Current)
  }

  /// Evict superseded tiers, then start routing fetches through the current
  /// ones. Routing never starts before eviction has finished.
  ///
  /// Only an installed worker activates. A freshly parsed worker counts as
  /// installed when its shell tier is already present; otherwise nothing is
  /// evicted and the previous version's tiers stay usable.
  pub async fn activate(&self) -> Result<ActivateReport> {
    let state = self.state();
    let ready = match state {
      WorkerState::Installed | WorkerState::Activated => true,
      WorkerState::Parsed => self.shell_installed()?,
      WorkerState::Installing | WorkerState::Activating | WorkerState::Redundant => false,
    };
    if !ready {
      warn!(?state, "refusing to activate before install");
      return Err(OfflineError::NotInstalled(format!("{:?}", state)));
    }

    self.set_state(WorkerState::Activating);

    let versions = self.tiers.versions();
    let prepared = self.tiers.evict_stale(&versions).and_then(|evicted| {
      let shell = self.tiers.ensure_tier(TierRole::Shell, versions.shell)?;
      let dynamic = self.tiers.ensure_tier(TierRole::Dynamic, versions.dynamic)?;
      Ok((evicted, shell, dynamic))
    });
    let (evicted, shell, dynamic) = match prepared {
      Ok(prepared) => prepared,
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        return Err(e);
      }
    };

    let entry_point = self
      .app_origin
      .join(self.manifest.entry_point())
      .unwrap_or_else(|_| self.app_origin.clone());
    let executor = StrategyExecutor::new(
      Classifier::new(&self.app_origin, &self.api_origin, Arc::clone(&self.manifest)),
      Arc::clone(&self.tiers),
      Arc::clone(&self.fetcher),
      shell,
      dynamic,
      Request::get(entry_point),
    );
    *self.executor.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(executor));

    self.set_state(WorkerState::Activated);
    info!(evicted = evicted.len(), "worker activated");
    Ok(ActivateReport { evicted })
  }

  /// Route one request. Until activation the worker does not intercept.
  pub async fn fetch(&self, request: Request) -> FetchOutcome {
    let executor = self
      .executor
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone();

    match executor {
      Some(executor) => executor.execute(request).await,
      None => FetchOutcome::Passthrough,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheRegistry, TierVersions};
  use crate::http::Response;
  use crate::testing::FakeFetcher;

  const APP: &str = "https://app.example";

  fn worker(fetcher: Arc<FakeFetcher>, registry: CacheRegistry, shell: u32) -> ServiceWorker {
    let manifest = ShellManifest::new(
      [
        "/index.html",
        "/favicon.png",
        "/manifest.json",
        "/icon-72.png",
        "/icon-144.png",
      ]
      .iter()
      .map(|p| p.to_string())
      .collect(),
      "/index.html",
    );
    let tiers = Arc::new(CacheTierManager::new(
      registry,
      fetcher.clone(),
      TierVersions { shell, dynamic: 1 },
    ));
    ServiceWorker::new(
      Url::parse(APP).unwrap(),
      Url::parse("https://api.example/v1").unwrap(),
      manifest,
      tiers,
      fetcher,
    )
  }

  fn serve_shell(fetcher: &FakeFetcher, skip: &str) {
    for path in ["/", "/index.html", "/favicon.png", "/manifest.json", "/icon-72.png", "/icon-144.png"] {
      if path != skip {
        fetcher.respond(&format!("{}{}", APP, path), Response::new(200, path));
      }
    }
  }

  #[tokio::test]
  async fn test_install_keeps_partial_shell() {
    let fetcher = Arc::new(FakeFetcher::new());
    serve_shell(&fetcher, "/icon-144.png");
    let worker = worker(fetcher, CacheRegistry::in_memory(), 5);

    let report = worker.install().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].url.path(), "/icon-144.png");
    // five manifest entries plus the root alias
    assert_eq!(report.succeeded.len(), 5);
  }

  #[tokio::test]
  async fn test_fetch_before_activation_is_not_intercepted() {
    let fetcher = Arc::new(FakeFetcher::new());
    serve_shell(&fetcher, "");
    let worker = worker(fetcher.clone(), CacheRegistry::in_memory(), 5);
    worker.install().await.unwrap();
    let before = fetcher.requests().len();

    let outcome = worker
      .fetch(Request::get(Url::parse("https://app.example/favicon.png").unwrap()))
      .await;

    assert_eq!(outcome, FetchOutcome::Passthrough);
    assert_eq!(fetcher.requests().len(), before);
  }

  #[tokio::test]
  async fn test_activate_before_install_keeps_previous_shell() {
    let fetcher = Arc::new(FakeFetcher::new());
    serve_shell(&fetcher, "");
    let registry = CacheRegistry::in_memory();

    let old = worker(fetcher.clone(), registry.clone(), 4);
    old.install().await.unwrap();
    old.activate().await.unwrap();

    let new = worker(fetcher.clone(), registry.clone(), 5);
    let err = new.activate().await.unwrap_err();

    assert!(matches!(err, OfflineError::NotInstalled(_)));
    assert_eq!(new.state(), WorkerState::Parsed);
    assert!(registry.contains("shell-v4").unwrap());
    assert!(!registry.contains("shell-v5").unwrap());

    fetcher.set_offline(true);
    let outcome = old
      .fetch(Request::navigate(Url::parse("https://app.example/stories").unwrap()))
      .await;
    assert_eq!(outcome, FetchOutcome::Respond(Response::new(200, "/index.html")));
  }

  #[tokio::test]
  async fn test_later_process_activates_installed_version() {
    let fetcher = Arc::new(FakeFetcher::new());
    serve_shell(&fetcher, "");
    let registry = CacheRegistry::in_memory();

    let first = worker(fetcher.clone(), registry.clone(), 5);
    first.install().await.unwrap();

    let second = worker(fetcher.clone(), registry.clone(), 5);
    assert!(second.shell_installed().unwrap());
    second.activate().await.unwrap();
    assert_eq!(second.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_activation_evicts_previous_version_and_serves_shell() {
    let fetcher = Arc::new(FakeFetcher::new());
    serve_shell(&fetcher, "");
    let registry = CacheRegistry::in_memory();

    let old = worker(fetcher.clone(), registry.clone(), 4);
    old.install().await.unwrap();
    old.activate().await.unwrap();

    let new = worker(fetcher.clone(), registry.clone(), 5);
    new.install().await.unwrap();
    let report = new.activate().await.unwrap();

    assert_eq!(report.evicted, vec!["shell-v4".to_string()]);
    assert_eq!(new.state(), WorkerState::Activated);

    fetcher.set_offline(true);
    let outcome = new
      .fetch(Request::get(Url::parse("https://app.example/favicon.png").unwrap()))
      .await;
    assert_eq!(outcome, FetchOutcome::Respond(Response::new(200, "/favicon.png")));

    let outcome = new
      .fetch(Request::navigate(Url::parse("https://app.example/stories").unwrap()))
      .await;
    assert_eq!(outcome, FetchOutcome::Respond(Response::new(200, "/index.html")));
  }
}
