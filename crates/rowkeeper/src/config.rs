use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::intent::IntentRouterConfig;

pub const HOME_ENV: &str = "ROWKEEPER_DIR";
pub const SERVER_URL_ENV: &str = "ROWKEEPER_SERVER_URL";
pub const TIMEOUT_ENV: &str = "ROWKEEPER_TIMEOUT_SECS";

const CONFIG_PATHS: [&str; 2] = [".rowkeeper.json", "rowkeeper.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RowkeeperConfig {
  #[serde(default)]
  pub backend: BackendConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub archive: ArchiveConfig,
  #[serde(default)]
  pub intent: IntentRouterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
  /// Base URL of the shopping backend (e.g., "http://localhost:8000")
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
  /// Minimum spacing between issued manual refreshes of one row
  #[serde(default = "default_refresh_cooldown_ms")]
  pub refresh_cooldown_ms: u64,
  #[serde(default = "default_providers")]
  pub default_providers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
  #[serde(default = "default_undo_window_ms")]
  pub undo_window_ms: u64,
}

fn default_base_url() -> String {
  "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_refresh_cooldown_ms() -> u64 {
  5_000
}

fn default_providers() -> Vec<String> {
  vec!["amazon".to_string(), "ebay".to_string(), "vendor_directory".to_string()]
}

fn default_undo_window_ms() -> u64 {
  6_000
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self { base_url: default_base_url(), timeout_secs: default_timeout_secs() }
  }
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { refresh_cooldown_ms: default_refresh_cooldown_ms(), default_providers: default_providers() }
  }
}

impl Default for ArchiveConfig {
  fn default() -> Self {
    Self { undo_window_ms: default_undo_window_ms() }
  }
}

impl BackendConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl SearchConfig {
  pub fn refresh_cooldown(&self) -> Duration {
    Duration::from_millis(self.refresh_cooldown_ms)
  }
}

impl ArchiveConfig {
  pub fn undo_window(&self) -> Duration {
    Duration::from_millis(self.undo_window_ms)
  }
}

/// `$ROWKEEPER_DIR`, or `~/.rowkeeper`
pub fn rowkeeper_home() -> Option<PathBuf> {
  match std::env::var(HOME_ENV) {
    Ok(dir) if !dir.trim().is_empty() => Some(PathBuf::from(dir)),
    _ => dirs::home_dir().map(|home| home.join(".rowkeeper")),
  }
}

impl RowkeeperConfig {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: RowkeeperConfig = serde_json::from_str(&content)
      .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    config.validate()?;
    Ok(config)
  }

  /// Load configuration from the current directory, the rowkeeper home, or defaults,
  /// then apply environment overrides
  pub fn load() -> Result<Self, ConfigError> {
    let mut config = match Self::find_config_file() {
      Some(path) => {
        tracing::debug!(path = %path.display(), "loading config");
        Self::load_from_file(path)?
      }
      None => RowkeeperConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
      .iter()
      .map(PathBuf::from)
      .chain(rowkeeper_home().map(|home| home.join("config.json")))
      .find(|path| path.exists())
  }

  pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var(SERVER_URL_ENV) {
      if !url.trim().is_empty() {
        self.backend.base_url = url.trim().to_string();
      }
    }

    if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
      self.backend.timeout_secs = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("{TIMEOUT_ENV} must be a whole number, got '{raw}'")))?;
    }

    self.validate()
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.backend.base_url.trim().is_empty() {
      return Err(ConfigError::invalid("backend.base_url must not be empty"));
    }
    if url::Url::parse(&self.backend.base_url).is_err() {
      return Err(ConfigError::invalid(format!(
        "backend.base_url is not a valid URL: {}",
        self.backend.base_url
      )));
    }
    if self.backend.timeout_secs == 0 {
      return Err(ConfigError::invalid("backend.timeout_secs must be greater than zero"));
    }

    let intent = &self.intent;
    if !(0..=100).contains(&intent.min_aggressiveness) {
      return Err(ConfigError::invalid("intent.min_aggressiveness must be within 0-100"));
    }
    if intent.min_threshold > intent.max_threshold {
      return Err(ConfigError::invalid("intent.min_threshold must not exceed intent.max_threshold"));
    }
    Ok(())
  }

  /// Save configuration to a file
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(self)
      .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn test_config_default() {
    let config = RowkeeperConfig::default();
    assert_eq!(config.search.refresh_cooldown_ms, 5_000);
    assert_eq!(config.archive.undo_window_ms, 6_000);
    assert_eq!(config.intent.min_aggressiveness, 60);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_config_load_partial_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rowkeeper.json");
    fs::write(&config_path, r#"{ "search": { "refresh_cooldown_ms": 250 } }"#).unwrap();

    let config = RowkeeperConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.search.refresh_cooldown_ms, 250);
    assert_eq!(config.search.default_providers, default_providers());
    assert_eq!(config.backend, BackendConfig::default());
  }

  #[test]
  fn test_config_load_invalid_json() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("invalid.json");
    fs::write(&config_path, "{ invalid json }").unwrap();

    let result = RowkeeperConfig::load_from_file(&config_path);
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
  }

  #[test]
  fn test_inverted_thresholds_rejected() {
    let mut config = RowkeeperConfig::default();
    config.intent.min_threshold = 0.9;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
  }

  #[test]
  fn test_config_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("saved.json");
    let mut config = RowkeeperConfig::default();
    config.backend.base_url = "https://shop.example.com".to_string();

    config.save_to_file(&config_path).unwrap();
    assert_eq!(RowkeeperConfig::load_from_file(&config_path).unwrap(), config);
  }
}
