//! User configuration.
//!
//! Read from `<config_dir>/scorebook/config.toml`; every field is optional
//! and a missing file yields the defaults. A few fields can be overridden
//! from the environment, which wins over the file.

use crate::thumbnail::{ThumbnailOptions, DEFAULT_JPEG_QUALITY, DEFAULT_THUMBNAIL_SCALE};
use scorebook_viewer_core::{Keymap, KeymapError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "scorebook";
const CONFIG_FILENAME: &str = "config.toml";

pub const ENV_WORKERS: &str = "SCOREBOOK_WORKERS";
pub const ENV_FULLSCREEN_TIMEOUT_MS: &str = "SCOREBOOK_FULLSCREEN_TIMEOUT_MS";
pub const ENV_DOWNLOAD_DIR: &str = "SCOREBOOK_DOWNLOAD_DIR";
pub const ENV_LIBRARY_DIR: &str = "SCOREBOOK_LIBRARY_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value `{value}` for {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid keymap override: {0}")]
    Keymap(#[from] KeymapError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    pub scale: f32,
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { scale: DEFAULT_THUMBNAIL_SCALE, quality: DEFAULT_JPEG_QUALITY }
    }
}

impl From<&ThumbnailConfig> for ThumbnailOptions {
    fn from(config: &ThumbnailConfig) -> Self {
        let scale = if config.scale > 0.0 { config.scale } else { DEFAULT_THUMBNAIL_SCALE };
        Self { scale, quality: config.quality.clamp(1, 100) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScorebookConfig {
    /// Background workers; `0` means one per available core.
    pub workers: usize,

    /// How long a fullscreen request waits for the platform's event.
    pub fullscreen_timeout_ms: u64,

    /// Defaults to the user's download directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_dir: Option<PathBuf>,

    pub thumbnails: ThumbnailConfig,

    /// Action name to chords, e.g. `next_page = ["ArrowRight", "space"]`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub keymap: BTreeMap<String, Vec<String>>,
}

impl Default for ScorebookConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            fullscreen_timeout_ms: 2_000,
            download_dir: None,
            library_dir: None,
            thumbnails: ThumbnailConfig::default(),
            keymap: BTreeMap::new(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(CONFIG_FILENAME))
}

impl ScorebookConfig {
    /// The default file plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) => Self::from_path(&path)?,
            None => {
                tracing::warn!("could not determine config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse `path`; a file that does not exist gives the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };

        let config = toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Override fields from variables `lookup` knows about.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_WORKERS) {
            self.workers = parse_env(ENV_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_FULLSCREEN_TIMEOUT_MS) {
            self.fullscreen_timeout_ms = parse_env(ENV_FULLSCREEN_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_DOWNLOAD_DIR).filter(|value| !value.is_empty()) {
            self.download_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_LIBRARY_DIR).filter(|value| !value.is_empty()) {
            self.library_dir = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn fullscreen_timeout(&self) -> Duration {
        Duration::from_millis(self.fullscreen_timeout_ms)
    }

    pub fn thumbnail_options(&self) -> ThumbnailOptions {
        ThumbnailOptions::from(&self.thumbnails)
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2)
    }

    /// Default shortcuts with this config's overrides applied.
    pub fn keymap(&self) -> Result<Keymap, ConfigError> {
        let mut keymap = Keymap::default();
        keymap.apply_overrides(&self.keymap)?;
        Ok(keymap)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value: value.to_owned() })
}
