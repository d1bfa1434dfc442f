//! Configuration types for the PTO store
//!
//! A configuration file (JSON or TOML, picked by extension) is layered with
//! `PTO__`-prefixed environment variables, e.g. `PTO__RAW__ROOT=/srv/raw`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Root configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the web service; every generated link resolves against it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Raw data store configuration
    #[serde(default)]
    pub raw: RawConfig,
    /// Observation store configuration
    #[serde(default)]
    pub obs: ObsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            raw: RawConfig::default(),
            obs: ObsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Raw data store configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawConfig {
    /// Root directory holding one subdirectory per campaign; unset disables
    /// the raw data store
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Filetype name to MIME type registry
    #[serde(default)]
    pub content_types: HashMap<String, String>,
}

/// Observation store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObsConfig {
    /// Path to the observation database file; unset disables the
    /// observation store
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Capacity of the conduit between the path producer and the bulk loader
    #[serde(default = "default_bulk_channel_capacity")]
    pub bulk_channel_capacity: usize,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            database: None,
            bulk_channel_capacity: default_bulk_channel_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/".to_string()
}

fn default_bulk_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file, with environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix("PTO").separator("__"))
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the raw data store root
    #[must_use]
    pub fn with_raw_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.raw.root = Some(root.into());
        self
    }

    /// Set the observation database path
    #[must_use]
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.obs.database = Some(path.into());
        self
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        self.base()?;
        if self.obs.bulk_channel_capacity == 0 {
            return Err(Error::Configuration(
                "obs.bulk_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed base URL, always ending in `/` so relative links append to it
    pub fn base(&self) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| Error::Configuration(format!("bad base_url {base:?}: {e}")))
    }

    /// Resolve a service-relative path (e.g. `raw/c/f/data`) to an absolute link
    pub fn link_to(&self, relative: &str) -> Result<String> {
        let link = self
            .base()?
            .join(relative)
            .map_err(|e| Error::internal(format!("cannot link to {relative:?}: {e}")))?;
        Ok(link.to_string())
    }

    /// MIME type registered for a filetype
    #[must_use]
    pub fn content_type(&self, file_type: &str) -> Option<&str> {
        self.raw.content_types.get(file_type).map(String::as_str)
    }
}
