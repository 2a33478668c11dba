use reqwest::Method;
use std::sync::Arc;
use url::{Origin, Url};

use super::manifest::ShellManifest;
use crate::http::Request;

/// Which fetch strategy an inbound request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
  Navigation,
  ShellAsset,
  ApiResource,
  SameOriginStatic,
  /// Never intercepted
  Other,
}

/// Maps requests to resource classes. Rules apply in a fixed priority order.
#[derive(Debug, Clone)]
pub struct Classifier {
  app_origin: Origin,
  api_origin: Origin,
  manifest: Arc<ShellManifest>,
}

impl Classifier {
  pub fn new(app_origin: &Url, api_origin: &Url, manifest: Arc<ShellManifest>) -> Self {
    Self {
      app_origin: app_origin.origin(),
      api_origin: api_origin.origin(),
      manifest,
    }
  }

  pub fn classify(&self, request: &Request) -> ResourceClass {
    if request.method != Method::GET {
      return ResourceClass::Other;
    }
    if request.is_navigation() {
      return ResourceClass::Navigation;
    }

    // Manifest entries are matched by path alone, whatever the origin.
    if self.manifest.contains(request.url.path()) {
      return ResourceClass::ShellAsset;
    }

    let origin = request.url.origin();
    if origin == self.api_origin {
      ResourceClass::ApiResource
    } else if origin == self.app_origin {
      ResourceClass::SameOriginStatic
    } else {
      ResourceClass::Other
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    let manifest = ShellManifest::new(
      vec!["/index.html".to_string(), "/favicon.png".to_string()],
      "/index.html",
    );
    Classifier::new(
      &Url::parse("https://app.example").unwrap(),
      &Url::parse("https://api.example/v1").unwrap(),
      Arc::new(manifest),
    )
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_priority_order() {
    let c = classifier();

    assert_eq!(
      c.classify(&get("https://api.example/v1/stories").with_method(Method::POST)),
      ResourceClass::Other
    );
    assert_eq!(
      c.classify(&Request::navigate(
        Url::parse("https://app.example/favicon.png").unwrap()
      )),
      ResourceClass::Navigation
    );
    assert_eq!(
      c.classify(&get("https://app.example/favicon.png")),
      ResourceClass::ShellAsset
    );
    assert_eq!(
      c.classify(&get("https://api.example/v1/stories?page=1")),
      ResourceClass::ApiResource
    );
    assert_eq!(
      c.classify(&get("https://app.example/app.bundle.js")),
      ResourceClass::SameOriginStatic
    );
    assert_eq!(
      c.classify(&get("https://tiles.example/1/2/3.png")),
      ResourceClass::Other
    );
  }

  #[test]
  fn test_navigation_to_foreign_origin_is_still_navigation() {
    let c = classifier();
    let request = Request::navigate(Url::parse("https://elsewhere.example/").unwrap());
    assert_eq!(c.classify(&request), ResourceClass::Navigation);
  }

  #[test]
  fn test_manifest_match_is_exact() {
    let c = classifier();
    assert_eq!(
      c.classify(&get("https://app.example/index.html?v=2")),
      ResourceClass::ShellAsset
    );
    assert_eq!(
      c.classify(&get("https://app.example/index.htm")),
      ResourceClass::SameOriginStatic
    );
  }

  #[test]
  fn test_manifest_path_wins_on_any_origin() {
    let c = classifier();
    assert_eq!(
      c.classify(&get("https://api.example/favicon.png")),
      ResourceClass::ShellAsset
    );
    assert_eq!(
      c.classify(&get("https://cdn.example/favicon.png")),
      ResourceClass::ShellAsset
    );
    assert_eq!(
      c.classify(&get("https://cdn.example/other.png")),
      ResourceClass::Other
    );
  }
}
