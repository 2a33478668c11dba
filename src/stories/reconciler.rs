//! Decides, per data load, whether the network or the durable store is
//! authoritative.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::client::StoryApi;
use super::enrich::{BackgroundTasks, Enricher, SyncEvent};
use super::types::{DisplayedStory, Loaded, LocationLabel, Story};
use crate::db::{StoreOpener, StoryStore};
use crate::error::{OfflineError, Result};
use crate::net::NetworkStatus;

/// Coordinates the list and detail loads.
///
/// Network successes are returned immediately and persisted in the
/// background; network failures fall back to the durable store. The store
/// being unavailable only ever degrades to network-only behavior.
pub struct SyncReconciler {
  api: Arc<dyn StoryApi>,
  store: Arc<StoreOpener>,
  network: NetworkStatus,
  enricher: Option<Enricher>,
  events: mpsc::UnboundedSender<SyncEvent>,
  tasks: BackgroundTasks,
}

impl SyncReconciler {
  pub fn new(
    api: Arc<dyn StoryApi>,
    store: Arc<StoreOpener>,
    network: NetworkStatus,
    events: mpsc::UnboundedSender<SyncEvent>,
  ) -> Self {
    Self {
      api,
      store,
      network,
      enricher: None,
      events,
      tasks: BackgroundTasks::default(),
    }
  }

  /// Enable reverse-geocoding of stories that have coordinates.
  pub fn with_enricher(mut self, enricher: Enricher) -> Self {
    self.enricher = Some(enricher);
    self
  }

  /// Wait for background persistence and enrichment to finish.
  pub async fn settle(&self) {
    self.tasks.settle().await;
  }

  async fn open_store(&self) -> Option<StoryStore> {
    match self.store.open().await {
      Ok(store) => Some(store),
      Err(e) => {
        warn!(error = %e, "durable store absent, continuing network-only");
        None
      }
    }
  }

  fn label_for(&self, story: &Story) -> LocationLabel {
    if let Some(name) = &story.location_name {
      return LocationLabel::Known(name.clone());
    }
    match (story.coordinates(), &self.enricher) {
      (None, _) => LocationLabel::None,
      (Some(_), Some(_)) if self.network.is_online() => LocationLabel::Pending,
      (Some(_), _) => LocationLabel::CoordinatesOnly,
    }
  }

  /// Load the story feed.
  pub async fn load_list(&self, token: Option<&str>) -> Result<Loaded<Vec<DisplayedStory>>> {
    let token = match token {
      Some(t) if !t.is_empty() => t,
      _ => return Err(OfflineError::Unauthenticated),
    };

    let network_error = match self.api.list_stories(token).await {
      Ok(stories) if !stories.is_empty() => {
        let displayed: Vec<DisplayedStory> = stories
          .iter()
          .map(|story| DisplayedStory {
            story: story.clone(),
            location: self.label_for(story),
          })
          .collect();
        let to_enrich = displayed
          .iter()
          .filter(|d| d.needs_enrichment())
          .map(|d| d.story.clone())
          .collect();

        self.persist_then_enrich(stories, to_enrich);
        return Ok(Loaded::from_network(displayed));
      }
      Ok(_) => {
        info!("remote api returned no stories, trying durable store");
        None
      }
      Err(e) => {
        warn!(error = %e, "failed to load stories from api, trying durable store");
        Some(e)
      }
    };

    self.list_from_store(network_error).await
  }

  async fn list_from_store(
    &self,
    network_error: Option<OfflineError>,
  ) -> Result<Loaded<Vec<DisplayedStory>>> {
    let unavailable = |network_error: Option<OfflineError>| match network_error {
      Some(e) => Err(e),
      None => Ok(Loaded::from_network(Vec::new())),
    };

    let Some(store) = self.open_store().await else {
      return unavailable(network_error);
    };

    let reader = store.clone();
    let stories = match tokio::task::spawn_blocking(move || reader.get_all()).await {
      Ok(Ok(stories)) => stories,
      Ok(Err(e)) => {
        warn!(error = %e, "failed to read stories from durable store");
        return unavailable(network_error);
      }
      Err(e) => {
        warn!(error = %e, "durable store read aborted");
        return unavailable(network_error);
      }
    };

    let mut displayed: Vec<DisplayedStory> = stories
      .into_iter()
      .map(|story| {
        let location = self.label_for(&story);
        DisplayedStory { story, location }
      })
      .collect();
    displayed.sort_by(|a, b| b.story.created_at.cmp(&a.story.created_at));

    if let Some(enricher) = &self.enricher {
      for entry in displayed.iter().filter(|d| d.needs_enrichment()) {
        enricher.schedule(&self.tasks, entry.story.clone(), Some(store.clone()));
      }
    }

    info!(count = displayed.len(), "stories loaded from durable store");
    Ok(Loaded::from_store(
      displayed,
      network_error.map(|e| e.to_string()),
    ))
  }

  /// Load a single story for the detail view.
  pub async fn load_one(&self, token: Option<&str>, id: &str) -> Result<Loaded<Story>> {
    if id.is_empty() {
      return Err(OfflineError::NotFound("story id is empty".to_string()));
    }

    let token = match token {
      Some(t) if !t.is_empty() => t,
      _ if !self.network.is_online() => {
        info!(story_id = %id, "offline and unauthenticated, reading durable store");
        return self.one_from_store(id, None).await;
      }
      _ => return Err(OfflineError::Unauthenticated),
    };

    match self.api.get_story(token, id).await {
      Ok(story) => {
        self.persist_then_enrich(vec![story.clone()], Vec::new());
        Ok(Loaded::from_network(story))
      }
      Err(e) => {
        if matches!(e, OfflineError::MalformedResponse(_)) {
          // A success body without a story is indistinguishable from a miss.
          warn!(story_id = %id, error = %e, "api answered without a story, treating as not found");
        } else {
          warn!(story_id = %id, error = %e, "failed to load story from api");
        }
        self.one_from_store(id, Some(e)).await
      }
    }
  }

  async fn one_from_store(
    &self,
    id: &str,
    network_error: Option<OfflineError>,
  ) -> Result<Loaded<Story>> {
    let not_found = || OfflineError::NotFound(id.to_string());
    let store = self.open_store().await.ok_or_else(not_found)?;

    let key = id.to_string();
    match tokio::task::spawn_blocking(move || store.get_by_id(&key)).await {
      Ok(Ok(story)) => Ok(Loaded::from_store(
        story,
        network_error.map(|e| e.to_string()),
      )),
      Ok(Err(OfflineError::NotFound(_))) => {
        info!(story_id = %id, "story not found in durable store");
        Err(not_found())
      }
      Ok(Err(e)) => {
        warn!(story_id = %id, error = %e, "failed to read story from durable store");
        Err(not_found())
      }
      Err(e) => {
        warn!(story_id = %id, error = %e, "durable store read aborted");
        Err(not_found())
      }
    }
  }

  /// Write-after-read: persist in the background, then start enrichment so
  /// resolved names land on top of the fresh copy.
  fn persist_then_enrich(&self, stories: Vec<Story>, to_enrich: Vec<Story>) {
    let opener = Arc::clone(&self.store);
    let events = self.events.clone();
    let enricher = self.enricher.clone();
    let tasks = self.tasks.clone();

    self.tasks.spawn(async move {
      let store = opener.open().await.ok();

      if let Some(store) = store.clone() {
        let count = stories.len();
        let event = match tokio::task::spawn_blocking(move || store.put_all(&stories)).await {
          Ok(Ok(())) => {
            info!(count, "stories from api saved to durable store");
            SyncEvent::Persisted { count }
          }
          Ok(Err(e)) => {
            warn!(error = %e, "failed to save stories to durable store");
            SyncEvent::PersistFailed { error: e }
          }
          Err(e) => SyncEvent::PersistFailed {
            error: OfflineError::storage(e),
          },
        };
        let _ = events.send(event);
      }

      if let Some(enricher) = enricher {
        for story in to_enrich {
          enricher.schedule(&tasks, story, store.clone());
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stories::geocode::RateLimiter;
  use crate::stories::{test_story, DataSource};
  use crate::testing::{FakeApi, FakeGeocoder};
  use std::time::Duration;

  struct Harness {
    api: Arc<FakeApi>,
    geocoder: Arc<FakeGeocoder>,
    store: StoryStore,
    network: NetworkStatus,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    reconciler: SyncReconciler,
    _dir: tempfile::TempDir,
  }

  fn harness(api: FakeApi, geocoder: FakeGeocoder) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stories.db");
    let store = StoryStore::open_at(&path).unwrap();
    let opener = Arc::new(StoreOpener::new(path));

    let api = Arc::new(api);
    let geocoder = Arc::new(geocoder);
    let network = NetworkStatus::default();
    let (tx, rx) = mpsc::unbounded_channel();

    let enricher = Enricher::new(
      geocoder.clone(),
      Arc::new(RateLimiter::new(Duration::from_millis(1))),
      tx.clone(),
    );
    let reconciler = SyncReconciler::new(api.clone(), opener, network.clone(), tx)
      .with_enricher(enricher);

    Harness {
      api,
      geocoder,
      store,
      network,
      events: rx,
      reconciler,
      _dir: dir,
    }
  }

  fn geotagged(id: &str, name: &str, lat: f64, lon: f64) -> Story {
    Story {
      lat: Some(lat),
      lon: Some(lon),
      ..test_story(id, name)
    }
  }

  #[tokio::test]
  async fn test_offline_detail_reads_store_without_network() {
    let h = harness(FakeApi::new(), FakeGeocoder::new());
    h.store.put(&geotagged("s1", "Ana", -6.2, 106.8)).unwrap();
    h.network.set_online(false);

    let loaded = h.reconciler.load_one(None, "s1").await.unwrap();

    assert_eq!(loaded.source, DataSource::Store);
    assert_eq!(loaded.data.id, "s1");
    assert_eq!(loaded.data.coordinates(), Some((-6.2, 106.8)));
    assert_eq!(h.api.call_count(), 0);
  }

  #[tokio::test]
  async fn test_online_detail_without_token_is_unauthenticated() {
    let h = harness(FakeApi::new(), FakeGeocoder::new());
    h.store.put(&test_story("s1", "Ana")).unwrap();

    let err = h.reconciler.load_one(None, "s1").await.unwrap_err();
    assert_eq!(err, OfflineError::Unauthenticated);
    assert_eq!(h.api.call_count(), 0);
  }

  #[tokio::test]
  async fn test_detail_success_is_persisted() {
    let fresh = test_story("s1", "Ana");
    let h = harness(
      FakeApi::new().with_detail("s1", Ok(fresh.clone())),
      FakeGeocoder::new(),
    );

    let loaded = h.reconciler.load_one(Some("tok"), "s1").await.unwrap();
    assert_eq!(loaded.source, DataSource::Network);

    h.reconciler.settle().await;
    assert_eq!(h.store.get_by_id("s1").unwrap(), fresh);
  }

  #[tokio::test]
  async fn test_detail_api_error_falls_back_then_not_found() {
    let h = harness(
      FakeApi::new()
        .with_detail(
          "s1",
          Err(OfflineError::MalformedResponse("'story' missing".into())),
        )
        .with_detail(
          "s2",
          Err(OfflineError::Api {
            status: 404,
            message: "not found".into(),
          }),
        ),
      FakeGeocoder::new(),
    );
    h.store.put(&test_story("s1", "Ana")).unwrap();

    let loaded = h.reconciler.load_one(Some("tok"), "s1").await.unwrap();
    assert_eq!(loaded.source, DataSource::Store);
    assert!(loaded.network_error.is_some());

    let err = h.reconciler.load_one(Some("tok"), "s2").await.unwrap_err();
    assert_eq!(err, OfflineError::NotFound("s2".to_string()));
  }

  #[tokio::test]
  async fn test_list_without_token_touches_nothing() {
    let h = harness(FakeApi::new(), FakeGeocoder::new());
    h.store.put(&test_story("s1", "Ana")).unwrap();

    let err = h.reconciler.load_list(None).await.unwrap_err();
    assert_eq!(err, OfflineError::Unauthenticated);
    assert_eq!(h.api.call_count(), 0);
  }

  #[tokio::test]
  async fn test_list_failure_falls_back_with_single_enrichment() {
    let mut h = harness(
      FakeApi::new().with_list(Err(OfflineError::NetworkUnavailable("down".into()))),
      FakeGeocoder::new().with_place(-6.2, 106.8, "Jakarta"),
    );
    let mut known = geotagged("s2", "Budi", -8.5, 115.2);
    known.location_name = Some("Bali".to_string());
    h.store
      .put_all(&[geotagged("s1", "Ana", -6.2, 106.8), known])
      .unwrap();

    let loaded = h.reconciler.load_list(Some("tok")).await.unwrap();

    assert_eq!(loaded.source, DataSource::Store);
    assert_eq!(loaded.data.len(), 2);
    let ana = loaded.data.iter().find(|d| d.story.id == "s1").unwrap();
    let budi = loaded.data.iter().find(|d| d.story.id == "s2").unwrap();
    assert_eq!(ana.location, LocationLabel::Pending);
    assert_eq!(budi.location, LocationLabel::Known("Bali".to_string()));

    h.reconciler.settle().await;
    assert_eq!(h.geocoder.lookup_count(), 1);
    assert_eq!(
      h.events.recv().await,
      Some(SyncEvent::LocationResolved {
        story_id: "s1".to_string(),
        name: "Jakarta".to_string()
      })
    );
    assert_eq!(
      h.store.get_by_id("s1").unwrap().location_name.as_deref(),
      Some("Jakarta")
    );
  }

  #[tokio::test]
  async fn test_offline_store_fallback_skips_location_lookup() {
    let h = harness(
      FakeApi::new().with_list(Err(OfflineError::NetworkUnavailable("down".into()))),
      FakeGeocoder::new().with_place(-6.2, 106.8, "Jakarta"),
    );
    h.store.put(&geotagged("s1", "Ana", -6.2, 106.8)).unwrap();
    h.network.set_online(false);

    let loaded = h.reconciler.load_list(Some("tok")).await.unwrap();

    assert_eq!(loaded.source, DataSource::Store);
    assert_eq!(loaded.data[0].location, LocationLabel::CoordinatesOnly);
    h.reconciler.settle().await;
    assert_eq!(h.geocoder.lookup_count(), 0);
    assert_eq!(h.store.get_by_id("s1").unwrap().location_name, None);
  }

  #[tokio::test]
  async fn test_detail_without_store_reports_not_found() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let reconciler = SyncReconciler::new(
      Arc::new(FakeApi::new()),
      Arc::new(StoreOpener::disabled()),
      NetworkStatus::default(),
      tx,
    );

    let err = reconciler.load_one(Some("tok"), "s1").await.unwrap_err();
    assert_eq!(err, OfflineError::NotFound("s1".to_string()));

    reconciler.settle().await;
  }

  #[tokio::test]
  async fn test_offline_detail_without_store_reports_not_found() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let api = Arc::new(FakeApi::new());
    let network = NetworkStatus::new(false);
    let reconciler =
      SyncReconciler::new(api.clone(), Arc::new(StoreOpener::disabled()), network, tx);

    let err = reconciler.load_one(None, "s1").await.unwrap_err();
    assert_eq!(err, OfflineError::NotFound("s1".to_string()));
    assert_eq!(api.call_count(), 0);
  }

  #[tokio::test]
  async fn test_detail_success_without_store_still_returns_story() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let api = FakeApi::new().with_detail("s1", Ok(test_story("s1", "Ana")));
    let reconciler = SyncReconciler::new(
      Arc::new(api),
      Arc::new(StoreOpener::disabled()),
      NetworkStatus::default(),
      tx,
    );

    let loaded = reconciler.load_one(Some("tok"), "s1").await.unwrap();
    assert_eq!(loaded.source, DataSource::Network);
    reconciler.settle().await;
  }

  #[tokio::test]
  async fn test_enrichment_failure_only_degrades_one_story() {
    let mut h = harness(
      FakeApi::new().with_list(Err(OfflineError::NetworkUnavailable("down".into()))),
      FakeGeocoder::new(),
    );
    h.store.put(&geotagged("s1", "Ana", 1.0, 2.0)).unwrap();

    let loaded = h.reconciler.load_list(Some("tok")).await.unwrap();
    assert_eq!(loaded.data.len(), 1);

    h.reconciler.settle().await;
    assert_eq!(h.geocoder.lookup_count(), 1);
    assert!(matches!(
      h.events.recv().await,
      Some(SyncEvent::LocationFailed { ref story_id, .. }) if story_id == "s1"
    ));
  }

  #[tokio::test]
  async fn test_list_success_returns_before_persisting() {
    let stories = vec![
      geotagged("s1", "Ana", -6.2, 106.8),
      test_story("s2", "Budi"),
    ];
    let mut h = harness(
      FakeApi::new().with_list(Ok(stories.clone())),
      FakeGeocoder::new().with_place(-6.2, 106.8, "Jakarta"),
    );

    let loaded = h.reconciler.load_list(Some("tok")).await.unwrap();
    assert_eq!(loaded.source, DataSource::Network);
    assert_eq!(loaded.data[0].location, LocationLabel::Pending);
    assert_eq!(loaded.data[1].location, LocationLabel::None);

    h.reconciler.settle().await;
    assert_eq!(h.events.recv().await, Some(SyncEvent::Persisted { count: 2 }));
    assert_eq!(h.store.get_all().unwrap().len(), 2);
    assert_eq!(h.geocoder.lookup_count(), 1);
  }

  #[tokio::test]
  async fn test_list_store_fallback_is_newest_first() {
    let h = harness(FakeApi::new().with_list(Ok(Vec::new())), FakeGeocoder::new());
    let mut older = test_story("old", "Ana");
    older.created_at = older.created_at - chrono::Duration::days(1);
    h.store
      .put_all(&[older, test_story("new", "Budi")])
      .unwrap();

    let loaded = h.reconciler.load_list(Some("tok")).await.unwrap();
    let ids: Vec<_> = loaded.data.iter().map(|d| d.story.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
  }

  #[tokio::test]
  async fn test_list_without_store_degrades_to_network_error() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let reconciler = SyncReconciler::new(
      Arc::new(FakeApi::new()),
      Arc::new(StoreOpener::disabled()),
      NetworkStatus::default(),
      tx,
    );

    let err = reconciler.load_list(Some("tok")).await.unwrap_err();
    assert!(matches!(err, OfflineError::NetworkUnavailable(_)));
  }
}
