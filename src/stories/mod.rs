//! Story domain: remote API client, enrichment and the sync reconciler.

mod api_types;
mod client;
mod enrich;
mod geocode;
mod reconciler;
mod types;

pub use api_types::UNKNOWN_LOCATION;
pub use client::{StoryApi, StoryClient};
pub use enrich::{Enricher, SyncEvent};
pub use geocode::{Geocoder, NominatimGeocoder, RateLimiter};
pub use reconciler::SyncReconciler;
pub use types::{DataSource, DisplayedStory, Loaded, LocationLabel, Story};

#[cfg(test)]
pub(crate) fn test_story(id: &str, name: &str) -> Story {
  Story {
    id: id.to_string(),
    name: name.to_string(),
    description: format!("{}'s story", name),
    photo_url: format!("https://cdn.example/{}.jpg", id),
    lat: None,
    lon: None,
    created_at: chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
      .unwrap()
      .with_timezone(&chrono::Utc),
    location_name: None,
  }
}
