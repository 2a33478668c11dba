//! In-crate fakes for the network-facing collaborators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{OfflineError, Result};
use crate::http::{Request, Response};
use crate::net::Fetcher;
use crate::stories::{Geocoder, Story, StoryApi};

/// Answers from a URL table; unknown URLs behave like a dropped connection.
#[derive(Default)]
pub struct FakeFetcher {
  routes: Mutex<HashMap<String, Response>>,
  seen: Mutex<Vec<Request>>,
  offline: AtomicBool,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.seen.lock().unwrap().clone()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self
      .seen
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }
}

#[async_trait]
impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.seen.lock().unwrap().push(request.clone());
    if self.offline.load(Ordering::SeqCst) {
      return Err(OfflineError::NetworkUnavailable("offline".into()));
    }
    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| OfflineError::NetworkUnavailable(format!("no route to {}", request.url)))
  }
}

/// Story API whose answers are set per test.
#[derive(Default)]
pub struct FakeApi {
  pub list: Mutex<Option<Result<Vec<Story>>>>,
  pub detail: Mutex<HashMap<String, Result<Story>>>,
  pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_list(self, list: Result<Vec<Story>>) -> Self {
    *self.list.lock().unwrap() = Some(list);
    self
  }

  pub fn with_detail(self, id: &str, story: Result<Story>) -> Self {
    self.detail.lock().unwrap().insert(id.to_string(), story);
    self
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl StoryApi for FakeApi {
  async fn list_stories(&self, _token: &str) -> Result<Vec<Story>> {
    self.calls.lock().unwrap().push("list".to_string());
    self
      .list
      .lock()
      .unwrap()
      .clone()
      .unwrap_or_else(|| Err(OfflineError::NetworkUnavailable("offline".into())))
  }

  async fn get_story(&self, _token: &str, id: &str) -> Result<Story> {
    self.calls.lock().unwrap().push(format!("get:{}", id));
    self
      .detail
      .lock()
      .unwrap()
      .get(id)
      .cloned()
      .unwrap_or_else(|| Err(OfflineError::NetworkUnavailable("offline".into())))
  }
}

/// Geocoder that records every lookup.
#[derive(Default)]
pub struct FakeGeocoder {
  pub names: Mutex<HashMap<String, String>>,
  pub lookups: Mutex<Vec<(f64, f64)>>,
}

impl FakeGeocoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_place(self, lat: f64, lon: f64, name: &str) -> Self {
    self
      .names
      .lock()
      .unwrap()
      .insert(format!("{},{}", lat, lon), name.to_string());
    self
  }

  pub fn lookup_count(&self) -> usize {
    self.lookups.lock().unwrap().len()
  }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
  async fn reverse(&self, lat: f64, lon: f64) -> Result<String> {
    self.lookups.lock().unwrap().push((lat, lon));
    self
      .names
      .lock()
      .unwrap()
      .get(&format!("{},{}", lat, lon))
      .cloned()
      .ok_or_else(|| OfflineError::Geocoding("lookup failed".into()))
  }
}
