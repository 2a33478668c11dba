use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::TierVersions;
use crate::worker::ShellManifest;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub app: AppConfig,
  pub api: ApiConfig,
  pub shell: ShellConfig,
  pub dynamic: DynamicConfig,
  pub storage: StorageConfig,
  pub geocoding: GeocodingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Origin the application is served from
  pub origin: Url,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: parse_default("http://localhost:8080"),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the story API; every request to its origin is an API request
  pub url: Url,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: parse_default("https://story-api.dicoding.dev/v1/"),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
  pub version: u32,
  pub entry_point: String,
  /// Paths of the minimum bootable asset set, relative to the app origin
  pub assets: Vec<String>,
}

impl Default for ShellConfig {
  fn default() -> Self {
    let mut assets = vec![
      "/index.html".to_string(),
      "/favicon.png".to_string(),
      "/manifest.json".to_string(),
    ];
    assets.extend(
      ["72x72", "144x144", "192x192", "512x512"]
        .iter()
        .map(|size| format!("/images/icons/icon-{}.png", size)),
    );

    Self {
      version: 5,
      entry_point: "/index.html".to_string(),
      assets,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
  pub version: u32,
}

impl Default for DynamicConfig {
  fn default() -> Self {
    Self { version: 4 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// When false the durable store is treated as unavailable
  pub enabled: bool,
  /// Story store location (default: $XDG_DATA_HOME/sosmed/stories.db)
  pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
  pub enabled: bool,
  pub url: Url,
  /// Minimum spacing between lookups, in milliseconds
  pub min_interval_ms: u64,
  pub user_agent: String,
}

impl Default for GeocodingConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      url: parse_default("https://nominatim.openstreetmap.org/reverse"),
      min_interval_ms: 1100,
      user_agent: concat!("sosmed-offline/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

impl GeocodingConfig {
  pub fn min_interval(&self) -> Duration {
    Duration::from_millis(self.min_interval_ms)
  }
}

/// Only ever called with the literal defaults above.
fn parse_default(s: &str) -> Url {
  Url::parse(s).expect("built-in default URLs are valid")
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sosmed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sosmed/config.yaml
  ///
  /// Without a file the built-in defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("sosmed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sosmed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.shell.version == 0 || config.dynamic.version == 0 {
      return Err(eyre!("tier versions start at 1"));
    }
    if !config.shell.assets.contains(&config.shell.entry_point) {
      return Err(eyre!(
        "shell entry point {} is not among the shell assets",
        config.shell.entry_point
      ));
    }
    Ok(config)
  }

  pub fn tier_versions(&self) -> TierVersions {
    TierVersions {
      shell: self.shell.version,
      dynamic: self.dynamic.version,
    }
  }

  pub fn shell_manifest(&self) -> ShellManifest {
    ShellManifest::new(self.shell.assets.clone(), self.shell.entry_point.clone())
  }

  /// Directory for the story store, the cache tiers and the log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;
    Ok(data_dir.join("sosmed"))
  }

  pub fn story_store_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("stories.db")),
    }
  }

  pub fn cache_path() -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("cache.db"))
  }

  /// Get the story API bearer token from environment variables.
  ///
  /// Checks SOSMED_TOKEN first, then STORY_API_TOKEN as fallback. Absence is
  /// not an error here; loads without a token degrade as unauthenticated.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SOSMED_TOKEN")
      .or_else(|_| std::env::var("STORY_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
