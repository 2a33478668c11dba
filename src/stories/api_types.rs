//! Serde-deserializable types matching story API responses.
//!
//! Every response shares one envelope: `{error, message}` plus the payload
//! field for the endpoint, if any.

use serde::Deserialize;

use super::types::Story;
use crate::error::OfflineError;

// ============================================================================
// Common envelope
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(rename = "listStory")]
  pub list_story: Option<Vec<Story>>,
  pub story: Option<Story>,
}

impl ApiEnvelope {
  /// Parse a response body, turning `{error: true}` into an `Api` error.
  pub fn parse(status: u16, body: &[u8]) -> Result<Self, OfflineError> {
    let envelope: ApiEnvelope = serde_json::from_slice(body)
      .map_err(|e| OfflineError::MalformedResponse(format!("invalid json: {}", e)))?;

    if envelope.error {
      return Err(OfflineError::Api {
        status,
        message: envelope.message,
      });
    }
    Ok(envelope)
  }

  pub fn into_list(self) -> Result<Vec<Story>, OfflineError> {
    self
      .list_story
      .ok_or_else(|| OfflineError::MalformedResponse("'listStory' missing from response".into()))
  }

  pub fn into_story(self) -> Result<Story, OfflineError> {
    self
      .story
      .ok_or_else(|| OfflineError::MalformedResponse("'story' missing from response".into()))
  }
}

// ============================================================================
// Reverse geocoding response (Nominatim jsonv2)
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiAddress {
  pub city: Option<String>,
  pub town: Option<String>,
  pub village: Option<String>,
  pub county: Option<String>,
  pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiReverseGeocode {
  #[serde(default)]
  pub address: Option<ApiAddress>,
}

pub const UNKNOWN_LOCATION: &str = "Unknown location";

impl ApiReverseGeocode {
  /// Most specific place name available.
  pub fn place_name(self) -> String {
    self
      .address
      .and_then(|a| a.city.or(a.town).or(a.village).or(a.county).or(a.state))
      .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
  }
}
