//! Store configuration, read once at startup.
//!
//! ```toml
//! base_uri = "http://example.org/"
//! default_timeout_ms = 5000
//!
//! [cache]
//! default = "in_memory"
//!
//! [[cache.class]]
//! model = "plot"
//! kind = "lru"
//! options = [{ key = "capacity", value = "512" }]
//!
//! [[cache.class]]
//! model = "sensor"
//! enabled = false
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheKind, CacheOption, CacheSettings};
use crate::uri::Uri;

/// Environment variable overriding `base_uri`.
pub const BASE_URI_ENV: &str = "URI_STORE_BASE_URI";

pub const DEFAULT_BASE_URI: &str = "http://example.org/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Parse(String),
    #[error("invalid base URI {value:?}: {reason}")]
    InvalidBaseUri { value: String, reason: String },
    #[error("cache configured twice for model {0}")]
    DuplicateClass(String),
}

/// Cache section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Kind used by classes without their own entry.
    #[serde(default)]
    pub default: CacheKind,
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassCacheConfig>,
}

/// Cache settings of one model class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassCacheConfig {
    /// `GraphModel::NAME` of the class.
    pub model: String,
    /// Falls back to the section default.
    #[serde(default)]
    pub kind: Option<CacheKind>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub options: Vec<CacheOption>,
}

fn enabled_by_default() -> bool {
    true
}

impl CacheConfig {
    /// Effective settings of `class`.
    pub fn settings_for(&self, class: &str) -> CacheSettings {
        match self.classes.iter().find(|c| c.model == class) {
            Some(entry) => {
                let kind = entry.kind.unwrap_or(self.default);
                CacheSettings {
                    kind,
                    enabled: entry.enabled && kind != CacheKind::None,
                    options: entry.options.clone(),
                }
            }
            None => CacheSettings::of(self.default),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.classes {
            if !seen.insert(entry.model.as_str()) {
                return Err(ConfigError::DuplicateClass(entry.model.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_uri: Option<String>,
    default_timeout_ms: Option<u64>,
    cache: Option<CacheConfig>,
}

/// Top-level store configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Namespace every generated URI starts with.
    pub base_uri: Uri,
    /// Deadline applied by the typed accessor when the caller gives none.
    pub default_timeout: Option<Duration>,
    pub cache: CacheConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            base_uri: Uri::from_trusted(DEFAULT_BASE_URI.to_string()),
            default_timeout: None,
            cache: CacheConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_config_file(file)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&contents)?.with_env_overrides()
    }

    /// Apply `URI_STORE_BASE_URI` if set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_base_uri_override(std::env::var(BASE_URI_ENV).ok())
    }

    fn with_base_uri_override(mut self, base_uri: Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = base_uri.filter(|v| !v.trim().is_empty()) {
            self.base_uri = parse_base_uri(value)?;
        }
        Ok(self)
    }

    pub fn with_base_uri(mut self, base_uri: Uri) -> Self {
        self.base_uri = base_uri;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    fn from_config_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(base_uri) = file.base_uri {
            config.base_uri = parse_base_uri(base_uri)?;
        }
        config.default_timeout = file.default_timeout_ms.map(Duration::from_millis);
        if let Some(cache) = file.cache {
            cache.validate()?;
            config.cache = cache;
        }
        Ok(config)
    }
}

fn parse_base_uri(value: String) -> Result<Uri, ConfigError> {
    Uri::parse(value.trim()).map_err(|e| ConfigError::InvalidBaseUri {
        value,
        reason: e.to_string(),
    })
}
