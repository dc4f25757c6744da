//! Configuration loader and validator for the playlist sync engine.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub spotify: Spotify,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Spotify Web API settings. The access token is obtained elsewhere and
/// consumed as-is; `SPOTIFY_ACCESS_TOKEN` overrides the file value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Spotify {
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Pause between two playlists of a batch request.
    pub batch_delay_ms: u64,
    /// Age after which an IN_PROGRESS claim is considered abandoned.
    pub stale_after_seconds: u64,
    /// Re-send a failed chunk track by track to count errors per track.
    pub precise_chunk_accounting: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_delay_ms: 1000,
            stale_after_seconds: 1800,
            precise_chunk_accounting: false,
        }
    }
}

/// Retry policy for remote calls. `max_retries: 0` disables retrying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            max_delay_seconds: 60,
        }
    }
}

fn default_api_base() -> String {
    crate::spotify::SPOTIFY_API_BASE.to_string()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Token to use for the remote platform, environment first.
    pub fn access_token(&self) -> Option<String> {
        std::env::var("SPOTIFY_ACCESS_TOKEN")
            .ok()
            .or_else(|| Some(self.spotify.access_token.clone()))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/playlist_sync.db", self.app.data_dir))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. An empty access token is allowed here;
/// it is rejected when the engine is built.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.spotify.api_base).is_err() {
        return Err(ConfigError::Invalid("spotify.api_base must be a valid URL"));
    }
    if cfg.sync.stale_after_seconds == 0 {
        return Err(ConfigError::Invalid("sync.stale_after_seconds must be > 0"));
    }
    if cfg.retry.max_retries > 0 && cfg.retry.base_delay_ms == 0 {
        return Err(ConfigError::Invalid(
            "retry.base_delay_ms must be > 0 when retries are enabled",
        ));
    }
    Ok(())
}

/// Example configuration file content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

spotify:
  access_token: "YOUR_SPOTIFY_ACCESS_TOKEN"
  api_base: "https://api.spotify.com/"

sync:
  batch_delay_ms: 1000
  stale_after_seconds: 1800
  precise_chunk_accounting: false

retry:
  max_retries: 0
  base_delay_ms: 1000
  max_delay_seconds: 60
"#
}
