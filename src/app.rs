use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use sosmed_offline::cache::{CacheRegistry, CacheTierManager, TierRole, TierState};
use sosmed_offline::config::Config;
use sosmed_offline::db::StoreOpener;
use sosmed_offline::http::Request;
use sosmed_offline::net::{Fetcher, HttpFetcher, NetworkStatus};
use sosmed_offline::stories::{
  DataSource, DisplayedStory, Enricher, LocationLabel, NominatimGeocoder, RateLimiter, StoryClient,
  SyncEvent, SyncReconciler,
};
use sosmed_offline::worker::{FetchOutcome, ServiceWorker, WorkerHost};

use crate::Command;

/// Every component of the offline engine, wired from one config.
pub struct App {
  tiers: Arc<CacheTierManager>,
  host: WorkerHost,
  reconciler: SyncReconciler,
  store: Arc<StoreOpener>,
  events: mpsc::UnboundedReceiver<SyncEvent>,
  token: Option<String>,
}

impl App {
  pub fn new(config: Config, offline: bool) -> Result<Self> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);

    let registry = CacheRegistry::open_sqlite(&Config::cache_path()?)?;
    let tiers = Arc::new(CacheTierManager::new(
      registry,
      Arc::clone(&fetcher),
      config.tier_versions(),
    ));
    let worker = ServiceWorker::new(
      config.app.origin.clone(),
      config.api.url.clone(),
      config.shell_manifest(),
      Arc::clone(&tiers),
      Arc::clone(&fetcher),
    );
    let (host, _) = WorkerHost::spawn(Arc::new(worker));

    let store = Arc::new(if config.storage.enabled {
      StoreOpener::new(config.story_store_path()?)
    } else {
      StoreOpener::disabled()
    });

    let (tx, events) = mpsc::unbounded_channel();
    let api = Arc::new(StoryClient::new(config.api.url.clone(), Arc::clone(&fetcher)));
    let mut reconciler =
      SyncReconciler::new(api, Arc::clone(&store), NetworkStatus::new(!offline), tx.clone());

    if config.geocoding.enabled {
      let geocoder = NominatimGeocoder::new(
        config.geocoding.url.clone(),
        config.geocoding.user_agent.clone(),
        Arc::clone(&fetcher),
      );
      let limiter = Arc::new(RateLimiter::new(config.geocoding.min_interval()));
      reconciler = reconciler.with_enricher(Enricher::new(Arc::new(geocoder), limiter, tx));
    }

    Ok(Self {
      tiers,
      host,
      reconciler,
      store,
      events,
      token: Config::get_api_token(),
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Install => self.install().await,
      Command::Activate => self.activate().await,
      Command::Fetch {
        url,
        navigate,
        method,
      } => self.fetch(&url, navigate, &method).await,
      Command::Stories => self.stories().await,
      Command::Story { id } => self.story(&id).await,
      Command::Tiers => self.list_tiers(),
      Command::Clear => self.clear().await,
    }
  }

  async fn install(&self) -> Result<()> {
    let report = self.host.install().await?;
    println!("cached {} shell assets", report.succeeded.len());
    for failure in &report.failed {
      println!("  failed {}: {}", failure.url, failure.reason);
    }
    Ok(())
  }

  async fn activate(&self) -> Result<()> {
    let report = self.host.activate().await?;
    if report.evicted.is_empty() {
      println!("no stale tiers");
    }
    for name in &report.evicted {
      println!("evicted {}", name);
    }
    Ok(())
  }

  async fn fetch(&self, url: &str, navigate: bool, method: &str) -> Result<()> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
    let request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url)
    }
    .with_method(method);

    // Each process is a fresh worker; it only intercepts once activated, and
    // only activates once this version's shell exists.
    let shell = self.tiers.versions().shell;
    if self.tiers.state(TierRole::Shell, shell)? == TierState::Absent {
      info!(version = shell, "shell tier absent, installing before activation");
      self.install().await?;
    }
    self.host.activate().await?;

    match self.host.fetch(request).await? {
      FetchOutcome::Respond(response) => {
        println!("{} {}", response.status, response.status_text);
        for (name, value) in &response.headers {
          println!("{}: {}", name, value);
        }
        println!();
        println!("{}", response.text());
      }
      FetchOutcome::Passthrough => println!("not intercepted"),
      FetchOutcome::NoResponse => return Err(eyre!("No response from network or cache")),
      FetchOutcome::Failed(e) => return Err(e.into()),
    }
    Ok(())
  }

  async fn stories(&mut self) -> Result<()> {
    let loaded = self.reconciler.load_list(self.token.as_deref()).await?;
    print_source(loaded.source, loaded.network_error.as_deref());
    for entry in &loaded.data {
      print_story(entry);
    }

    self.reconciler.settle().await;
    self.drain_events();
    Ok(())
  }

  async fn story(&mut self, id: &str) -> Result<()> {
    let loaded = self.reconciler.load_one(self.token.as_deref(), id).await?;
    print_source(loaded.source, loaded.network_error.as_deref());

    let story = &loaded.data;
    println!("{} by {}", story.id, story.name);
    println!("  created {}", story.created_at.to_rfc3339());
    println!("  photo   {}", story.photo_url);
    if let Some(name) = &story.location_name {
      println!("  at      {}", name);
    } else if let Some((lat, lon)) = story.coordinates() {
      println!("  at      {:.5}, {:.5}", lat, lon);
    }
    println!();
    println!("{}", story.description);

    self.reconciler.settle().await;
    self.drain_events();
    Ok(())
  }

  fn list_tiers(&self) -> Result<()> {
    let versions = self.tiers.versions();
    for name in self.tiers.registry().tier_names()? {
      match TierRole::owning(&name) {
        Some(role) if name == versions.current_name(role) => println!("{} ({}, current)", name, role),
        Some(role) => println!("{} ({}, stale)", name, role),
        None => println!("{} (foreign)", name),
      }
    }
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    let store = self.store.open().await?;
    tokio::task::spawn_blocking(move || store.clear()).await??;
    info!("durable store cleared");
    println!("story store cleared");
    Ok(())
  }

  fn drain_events(&mut self) {
    while let Ok(event) = self.events.try_recv() {
      match event {
        SyncEvent::LocationResolved { story_id, name } => println!("{}: located at {}", story_id, name),
        SyncEvent::LocationFailed { story_id, message } => {
          println!("{}: location unavailable ({})", story_id, message)
        }
        SyncEvent::Persisted { count } => println!("saved {} stories for offline use", count),
        SyncEvent::PersistFailed { error } => println!("could not save stories: {}", error),
      }
    }
  }
}

fn print_source(source: DataSource, network_error: Option<&str>) {
  match (source, network_error) {
    (DataSource::Network, _) => {}
    (DataSource::Store, Some(err)) => println!("offline copy ({})", err),
    (DataSource::Store, None) => println!("offline copy"),
  }
}

fn print_story(entry: &DisplayedStory) {
  let place = match &entry.location {
    LocationLabel::None => String::new(),
    LocationLabel::Known(name) => format!(" @ {}", name),
    LocationLabel::Pending => " @ (locating...)".to_string(),
    LocationLabel::CoordinatesOnly => " @ coordinates available".to_string(),
  };
  println!(
    "{}  {}  {}{}",
    entry.story.created_at.format("%Y-%m-%d"),
    entry.story.id,
    entry.story.name,
    place
  );
}
