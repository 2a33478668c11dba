//! One fetch strategy per resource class.
//!
//! | class            | strategy                          | last resort              |
//! |------------------|-----------------------------------|--------------------------|
//! | Navigation       | network first, mirror to dynamic  | shell entry point, then offline document |
//! | ShellAsset       | shell cache first                 | error propagates         |
//! | ApiResource      | network first, mirror to dynamic  | dynamic copy, then 503 payload |
//! | SameOriginStatic | dynamic cache first               | no response              |
//! | Other            | not intercepted                   |                          |
//!
//! The network attempt always completes before any fallback read. Only 2xx
//! responses are written to a tier, and the caller always gets its own copy.

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::classify::{Classifier, ResourceClass};
use crate::cache::{CacheTierManager, TierHandle};
use crate::error::OfflineError;
use crate::http::{Request, Response};
use crate::net::Fetcher;

const OFFLINE_API_MESSAGE: &str = "You are offline and this data is not available in the cache.";

/// What the host should do with an intercepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
  /// Not intercepted; the host goes to the network itself.
  Passthrough,
  Respond(Response),
  /// Intercepted, but neither network nor cache could answer. The caller
  /// treats this as a failed load.
  NoResponse,
  /// The failure propagates to the caller.
  Failed(OfflineError),
}

pub struct StrategyExecutor {
  classifier: Classifier,
  tiers: Arc<CacheTierManager>,
  fetcher: Arc<dyn Fetcher>,
  shell: TierHandle,
  dynamic: TierHandle,
  entry_point: Request,
}

impl StrategyExecutor {
  pub fn new(
    classifier: Classifier,
    tiers: Arc<CacheTierManager>,
    fetcher: Arc<dyn Fetcher>,
    shell: TierHandle,
    dynamic: TierHandle,
    entry_point: Request,
  ) -> Self {
    Self {
      classifier,
      tiers,
      fetcher,
      shell,
      dynamic,
      entry_point,
    }
  }

  pub fn classify(&self, request: &Request) -> ResourceClass {
    self.classifier.classify(request)
  }

  pub async fn execute(&self, request: Request) -> FetchOutcome {
    let class = self.classifier.classify(&request);
    debug!(url = %request.url, ?class, "routing request");

    match class {
      ResourceClass::Navigation => self.navigation(request).await,
      ResourceClass::ShellAsset => self.shell_asset(request).await,
      ResourceClass::ApiResource => self.api_resource(request).await,
      ResourceClass::SameOriginStatic => self.same_origin_static(request).await,
      ResourceClass::Other => FetchOutcome::Passthrough,
    }
  }

  /// Cache miss and storage faults look the same to a strategy.
  async fn cached(&self, tier: &TierHandle, request: &Request) -> Option<Response> {
    match self.tiers.lookup(tier, request).await {
      Ok(hit) => hit,
      Err(e) => {
        warn!(tier = tier.name(), url = %request.url, error = %e, "tier lookup failed");
        None
      }
    }
  }

  /// Write a copy of a successful response into `tier`. The write runs as
  /// its own task, so it completes even if the caller stops waiting.
  async fn mirror(&self, tier: &TierHandle, request: &Request, response: &Response) {
    if !response.is_success() {
      return;
    }

    let tiers = Arc::clone(&self.tiers);
    let tier = tier.clone();
    let request = request.clone();
    let response = response.clone();

    let write = tokio::spawn(async move {
      if let Err(e) = tiers.write(&tier, &request, response).await {
        warn!(tier = tier.name(), url = %request.url, error = %e, "tier write failed");
      }
    });
    if let Err(e) = write.await {
      warn!(error = %e, "tier write task aborted");
    }
  }

  async fn navigation(&self, request: Request) -> FetchOutcome {
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        if request.url.path() != "/" {
          self.mirror(&self.dynamic, &request, &response).await;
        }
        FetchOutcome::Respond(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "navigation failed, serving entry point from shell");
        match self.cached(&self.shell, &self.entry_point).await {
          Some(entry) => FetchOutcome::Respond(entry),
          None => {
            error!(
              entry_point = %self.entry_point.url,
              "entry point missing from shell tier, serving offline document"
            );
            FetchOutcome::Respond(Response::offline_document())
          }
        }
      }
    }
  }

  async fn shell_asset(&self, request: Request) -> FetchOutcome {
    if let Some(hit) = self.cached(&self.shell, &request).await {
      return FetchOutcome::Respond(hit);
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        self.mirror(&self.shell, &request, &response).await;
        FetchOutcome::Respond(response)
      }
      Err(e) => FetchOutcome::Failed(e),
    }
  }

  async fn api_resource(&self, request: Request) -> FetchOutcome {
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        self.mirror(&self.dynamic, &request, &response).await;
        FetchOutcome::Respond(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "api request failed, trying dynamic tier");
        let response = self
          .cached(&self.dynamic, &request)
          .await
          .unwrap_or_else(|| Response::offline_api(OFFLINE_API_MESSAGE));
        FetchOutcome::Respond(response)
      }
    }
  }

  async fn same_origin_static(&self, request: Request) -> FetchOutcome {
    if let Some(hit) = self.cached(&self.dynamic, &request).await {
      return FetchOutcome::Respond(hit);
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        self.mirror(&self.dynamic, &request, &response).await;
        FetchOutcome::Respond(response)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "static asset unavailable from network and cache");
        FetchOutcome::NoResponse
      }
    }
  }
}
