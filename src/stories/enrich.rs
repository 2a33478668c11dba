//! Best-effort background work kicked off by data loads: write-after-read
//! persistence and reverse-geocoding enrichment.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::geocode::{Geocoder, RateLimiter};
use super::types::Story;
use crate::db::StoryStore;
use crate::error::OfflineError;

/// Notifications for the presentation layer about work that finished after
/// a load already returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
  LocationResolved { story_id: String, name: String },
  LocationFailed { story_id: String, message: String },
  Persisted { count: usize },
  PersistFailed { error: OfflineError },
}

/// Handles of spawned background tasks, so a host can wait for them to
/// drain before shutting down.
#[derive(Clone, Default)]
pub(crate) struct BackgroundTasks {
  handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
  pub fn spawn<F>(&self, fut: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let handle = tokio::spawn(fut);
    self
      .handles
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(handle);
  }

  /// Wait until every task, including ones spawned by tasks, has finished.
  pub async fn settle(&self) {
    loop {
      let batch: Vec<_> = {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.drain(..).collect()
      };
      if batch.is_empty() {
        return;
      }
      for handle in batch {
        if let Err(e) = handle.await {
          warn!(error = %e, "background sync task aborted");
        }
      }
    }
  }
}

/// Schedules one reverse-geocoding attempt per story through a limiter
/// shared by every enrichment.
#[derive(Clone)]
pub struct Enricher {
  geocoder: Arc<dyn Geocoder>,
  limiter: Arc<RateLimiter>,
  events: mpsc::UnboundedSender<SyncEvent>,
}

impl Enricher {
  pub fn new(
    geocoder: Arc<dyn Geocoder>,
    limiter: Arc<RateLimiter>,
    events: mpsc::UnboundedSender<SyncEvent>,
  ) -> Self {
    Self {
      geocoder,
      limiter,
      events,
    }
  }

  pub(crate) fn schedule(&self, tasks: &BackgroundTasks, story: Story, store: Option<StoryStore>) {
    let Some((lat, lon)) = story.coordinates() else {
      return;
    };
    let this = self.clone();

    tasks.spawn(async move {
      this.limiter.acquire().await;
      debug!(story_id = %story.id, lat, lon, "resolving location");

      match this.geocoder.reverse(lat, lon).await {
        Ok(name) => {
          if let Some(store) = store {
            remember_location(store, &story, &name).await;
          }
          let _ = this.events.send(SyncEvent::LocationResolved {
            story_id: story.id,
            name,
          });
        }
        Err(e) => {
          warn!(story_id = %story.id, error = %e, "location lookup failed");
          let _ = this.events.send(SyncEvent::LocationFailed {
            story_id: story.id,
            message: e.to_string(),
          });
        }
      }
    });
  }
}

/// Upsert the story with its resolved name so later offline loads skip the
/// lookup.
async fn remember_location(store: StoryStore, story: &Story, name: &str) {
  let mut enriched = story.clone();
  enriched.location_name = Some(name.to_string());
  let id = enriched.id.clone();

  match tokio::task::spawn_blocking(move || store.put(&enriched)).await {
    Ok(Ok(())) => info!(story_id = %id, location = name, "location name stored"),
    Ok(Err(e)) => warn!(story_id = %id, error = %e, "failed to store location name"),
    Err(e) => warn!(story_id = %id, error = %e, "location write task aborted"),
  }
}
