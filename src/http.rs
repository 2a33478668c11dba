//! Request and response values exchanged between the host, the fetch
//! collaborator and the cache tiers.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// How the host intends to use a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level document load.
  Navigate,
  #[default]
  Subresource,
}

/// Whether intermediate caches may answer the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
  #[default]
  Default,
  /// Bypass any intermediate cache.
  Reload,
}

#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub cache: CacheMode,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Subresource,
      cache: CacheMode::Default,
      headers: Vec::new(),
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_cache(mut self, cache: CacheMode) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Normalized cache key: method plus URL, query included, fragment dropped.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    format!("{} {}", self.method.as_str(), url)
  }
}

/// A captured response. Bodies are owned bytes, so handing one copy to the
/// caller and another to a tier is an explicit `clone()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

const OFFLINE_DOCUMENT: &str = "<h1>The application cannot be loaded while offline.</h1>\
<p>Please check your internet connection.</p>";

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// 2xx
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Minimal document served for navigations when neither the network nor
  /// the shell tier can answer.
  pub fn offline_document() -> Self {
    Self::new(200, OFFLINE_DOCUMENT).with_header("Content-Type", "text/html")
  }

  /// Structured payload for API requests with no network and no cached copy.
  pub fn offline_api(message: &str) -> Self {
    let body = serde_json::json!({ "error": true, "message": message });
    Self {
      status: 503,
      status_text: "Service Unavailable".to_string(),
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: body.to_string().into_bytes(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_keeps_query_and_drops_fragment() {
    let url = Url::parse("https://app.example/stories?page=2#top").unwrap();
    let request = Request::get(url);
    assert_eq!(request.cache_key(), "GET https://app.example/stories?page=2");
  }

  #[test]
  fn test_offline_api_payload_shape() {
    let response = Response::offline_api("offline");
    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], serde_json::Value::Bool(true));
    assert_eq!(body["message"], "offline");
  }

  #[test]
  fn test_success_range() {
    assert!(Response::new(204, "").is_success());
    assert!(!Response::new(301, "").is_success());
    assert!(!Response::new(404, "").is_success());
  }
}
