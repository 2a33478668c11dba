//! Network collaborator: `fetch(request) -> response or failure`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{OfflineError, Result};
use crate::http::{CacheMode, Request, Response};

/// Performs a single network round-trip.
///
/// A returned `Response` may carry any status; only transport-level failure
/// is an `Err`, always `NetworkUnavailable`.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(OfflineError::network)?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if request.cache == CacheMode::Reload {
      builder = builder
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache");
    }

    debug!(url = %request.url, method = %request.method, "network fetch");
    let response = builder.send().await.map_err(OfflineError::network)?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response.bytes().await.map_err(OfflineError::network)?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

/// Host-owned online/offline flag, shared by every component that needs to
/// know whether attempting the network is worthwhile.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
  online: Arc<AtomicBool>,
}

impl NetworkStatus {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

impl Default for NetworkStatus {
  fn default() -> Self {
    Self::new(true)
  }
}
