use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geotagged photo story as served by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub photo_url: String,
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lon: Option<f64>,
  pub created_at: DateTime<Utc>,
  /// Resolved place name; only ever set locally, never by the API.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location_name: Option<String>,
}

impl Story {
  pub fn coordinates(&self) -> Option<(f64, f64)> {
    match (self.lat, self.lon) {
      (Some(lat), Some(lon)) => Some((lat, lon)),
      _ => None,
    }
  }
}

/// Where reconciled data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  /// Fresh from the remote API
  Network,
  /// Network failed or was skipped; served from the durable store
  Store,
}

/// Result of a data load, tagged with its source.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
  pub data: T,
  pub source: DataSource,
  /// Why the network was not authoritative, when it wasn't.
  pub network_error: Option<String>,
}

impl<T> Loaded<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: DataSource::Network,
      network_error: None,
    }
  }

  pub fn from_store(data: T, network_error: Option<String>) -> Self {
    Self {
      data,
      source: DataSource::Store,
      network_error,
    }
  }
}

/// What the presentation layer should show as a story's place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationLabel {
  /// No coordinates at all
  None,
  Known(String),
  /// A reverse-geocoding attempt has been scheduled
  Pending,
  /// Coordinates exist but no lookup will be made
  CoordinatesOnly,
}

/// A story as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedStory {
  pub story: Story,
  pub location: LocationLabel,
}

impl DisplayedStory {
  pub fn needs_enrichment(&self) -> bool {
    self.location == LocationLabel::Pending
  }
}
