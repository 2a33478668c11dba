use url::Url;

/// The application's minimum bootable asset set, known at build time.
#[derive(Debug, Clone)]
pub struct ShellManifest {
  paths: Vec<String>,
  entry_point: String,
}

impl ShellManifest {
  pub fn new(paths: Vec<String>, entry_point: impl Into<String>) -> Self {
    Self {
      paths,
      entry_point: entry_point.into(),
    }
  }

  pub fn paths(&self) -> &[String] {
    &self.paths
  }

  /// Exact path match against the manifest.
  pub fn contains(&self, path: &str) -> bool {
    self.paths.iter().any(|p| p == path)
  }

  /// Document served for navigations when the network is gone.
  pub fn entry_point(&self) -> &str {
    &self.entry_point
  }

  /// URLs fetched at install time. When the manifest lists `/index.html`
  /// but not `/`, the root is cached too so a bare-origin load boots
  /// offline; it does not become a manifest entry.
  pub fn install_urls(&self, origin: &Url) -> Vec<Url> {
    let mut urls: Vec<Url> = self
      .paths
      .iter()
      .filter_map(|p| origin.join(p).ok())
      .collect();

    if !self.contains("/") && self.contains("/index.html") {
      if let Ok(root) = origin.join("/") {
        urls.push(root);
      }
    }
    urls
  }
}
