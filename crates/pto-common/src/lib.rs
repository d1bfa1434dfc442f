//! PTO Common - Shared types and utilities
//!
//! This crate provides the error kinds, configuration, and timestamp and
//! value coercion helpers used by the raw data store and the observation
//! store.

pub mod coerce;
pub mod config;
pub mod error;

pub use config::{Config, LoggingConfig, ObsConfig, RawConfig};
pub use error::{Error, Result};

/// Media type of newline-delimited observation streams
pub const OBSERVATION_MEDIA_TYPE: &str = "application/vnd.mami.ndjson";
