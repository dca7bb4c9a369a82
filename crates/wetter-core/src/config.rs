use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable naming the storage root
pub const DATA_DIR_ENV: &str = "WETTER_DATA_DIR";

/// Capacity of a new 24h ring: one sample every 4 minutes
pub const DEFAULT_24H_CAPACITY: u32 = 360;

/// Capacity of a new 31d ring: 31 days of hourly rollups, rounded up
pub const DEFAULT_31D_CAPACITY: u32 = 930;

/// Minimum spacing between two accepted raw samples of one series
pub const DEFAULT_MIN_SAMPLE_SPACING_SECS: u64 = 4 * 60;

/// Settings of one storage root.
///
/// ```toml
/// data_dir = "/var/lib/wetter"
/// ring_24h_capacity = 360
/// ring_31d_capacity = 930
/// min_sample_spacing_secs = 240
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Only applied when a new 24h ring is created
    #[serde(default = "default_24h_capacity")]
    pub ring_24h_capacity: u32,
    /// Only applied when a new 31d ring is created
    #[serde(default = "default_31d_capacity")]
    pub ring_31d_capacity: u32,
    #[serde(default = "default_min_sample_spacing")]
    pub min_sample_spacing_secs: u64,
}

fn default_24h_capacity() -> u32 {
    DEFAULT_24H_CAPACITY
}

fn default_31d_capacity() -> u32 {
    DEFAULT_31D_CAPACITY
}

fn default_min_sample_spacing() -> u64 {
    DEFAULT_MIN_SAMPLE_SPACING_SECS
}

impl StoreConfig {
    /// Default settings for `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ring_24h_capacity: DEFAULT_24H_CAPACITY,
            ring_31d_capacity: DEFAULT_31D_CAPACITY,
            min_sample_spacing_secs: DEFAULT_MIN_SAMPLE_SPACING_SECS,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("could not read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Default settings for the root named by [`DATA_DIR_ENV`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_value(std::env::var_os(DATA_DIR_ENV))
    }

    fn from_env_value(value: Option<OsString>) -> Result<Self> {
        match value {
            Some(dir) if !dir.is_empty() => Ok(Self::new(dir)),
            _ => Err(Error::Configuration(format!("{DATA_DIR_ENV} is not set"))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ring_24h_capacity < 1 || self.ring_31d_capacity < 1 {
            return Err(Error::Configuration(
                "ring capacities must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
