//! Reverse geocoding and the shared rate limiter in front of it.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::api_types::ApiReverseGeocode;
use crate::error::{OfflineError, Result};
use crate::http::Request;
use crate::net::Fetcher;

/// Resolves coordinates to a human-readable place name.
#[async_trait]
pub trait Geocoder: Send + Sync {
  async fn reverse(&self, lat: f64, lon: f64) -> Result<String>;
}

/// Nominatim-compatible `reverse` endpoint.
pub struct NominatimGeocoder {
  endpoint: Url,
  user_agent: String,
  fetcher: Arc<dyn Fetcher>,
}

impl NominatimGeocoder {
  pub fn new(endpoint: Url, user_agent: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
    Self {
      endpoint,
      user_agent: user_agent.into(),
      fetcher,
    }
  }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
  async fn reverse(&self, lat: f64, lon: f64) -> Result<String> {
    let mut url = self.endpoint.clone();
    url
      .query_pairs_mut()
      .append_pair("format", "jsonv2")
      .append_pair("lat", &lat.to_string())
      .append_pair("lon", &lon.to_string());

    let request = Request::get(url).with_header("User-Agent", self.user_agent.as_str());
    let response = self
      .fetcher
      .fetch(&request)
      .await
      .map_err(|e| OfflineError::Geocoding(e.to_string()))?;

    if !response.is_success() {
      return Err(OfflineError::Geocoding(format!(
        "reverse lookup for {},{} answered {}",
        lat, lon, response.status
      )));
    }

    let parsed: ApiReverseGeocode = serde_json::from_slice(&response.body)
      .map_err(|e| OfflineError::Geocoding(format!("invalid response: {}", e)))?;
    Ok(parsed.place_name())
  }
}

/// Hands out evenly spaced time slots to every caller sharing it.
///
/// A caller reserves its slot immediately and only sleeps until that slot,
/// so unrelated work scheduled around enrichment is never held behind it.
pub struct RateLimiter {
  interval: Duration,
  next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      next_slot: Mutex::new(None),
    }
  }

  pub fn per_second() -> Self {
    Self::new(Duration::from_secs(1))
  }

  pub async fn acquire(&self) {
    let slot = {
      let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
      let now = Instant::now();
      let slot = next.map_or(now, |n| n.max(now));
      *next = Some(slot + self.interval);
      slot
    };
    tokio::time::sleep_until(slot).await;
  }
}
