//! Text cache configuration.
//!
//! Configuration can be loaded from environment variables, from a simple
//! `key = value` file, or created programmatically.

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Default number of preload workers when none is configured.
pub const DEFAULT_PRELOAD_WORKERS: usize = 4;

/// Configuration for the page text cache and its preload pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCacheConfig {
    /// Maximum number of cached pages, `None` for unlimited
    pub max_entries: Option<usize>,
    /// Number of background extraction workers
    pub preload_workers: usize,
}

impl Default for TextCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            preload_workers: default_workers(),
        }
    }
}

impl TextCacheConfig {
    pub fn new(max_entries: Option<usize>, preload_workers: usize) -> Self {
        Self {
            max_entries,
            preload_workers: preload_workers.max(1),
        }
    }

    /// Sets the page cap. Negative values mean unlimited.
    pub fn with_max_entries(mut self, max_entries: i64) -> Self {
        self.max_entries = usize::try_from(max_entries).ok();
        self
    }

    /// Sets the number of preload workers (at least one).
    pub fn with_preload_workers(mut self, workers: usize) -> Self {
        self.preload_workers = workers.max(1);
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_VIEWER_CACHE_MAX_PAGES`: page cap, negative or `unlimited` for no cap
    /// - `PDF_VIEWER_PRELOAD_WORKERS`: number of extraction workers
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PDF_VIEWER_CACHE_MAX_PAGES") {
            config.max_entries = parse_max_entries("PDF_VIEWER_CACHE_MAX_PAGES", &val)?;
        }

        if let Ok(val) = std::env::var("PDF_VIEWER_PRELOAD_WORKERS") {
            config.preload_workers = parse_workers("PDF_VIEWER_PRELOAD_WORKERS", &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a file.
    ///
    /// Expected file format:
    /// ```toml
    /// cache_max_pages = 500
    /// preload_workers = 4
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from `key = value` lines.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in config_entries(toml_str) {
            config.apply_key(key, value)?;
        }

        Ok(config)
    }

    /// Applies a single configuration key.
    ///
    /// Returns `Ok(false)` for keys this configuration does not own, so
    /// larger configurations can layer on top of it.
    pub fn apply_key(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        match key {
            "cache_max_pages" => self.max_entries = parse_max_entries(key, value)?,
            "preload_workers" => self.preload_workers = parse_workers(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Saves configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = format!("# PDF Viewer Text Cache Configuration\n{}", self.to_toml());
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Converts configuration to `key = value` lines.
    pub fn to_toml(&self) -> String {
        let max_pages = self
            .max_entries
            .map_or_else(|| "-1".to_string(), |n| n.to_string());

        format!(
            "cache_max_pages = {}\npreload_workers = {}\n",
            max_pages, self.preload_workers
        )
    }
}

/// Iterates over non-empty, non-comment `key = value` lines.
///
/// Values have surrounding whitespace and double quotes removed.
pub fn config_entries(contents: &str) -> impl Iterator<Item = (&str, &str)> {
    contents.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once('=')?;
        Some((key.trim(), value.trim().trim_matches('"')))
    })
}

fn parse_max_entries(key: &str, value: &str) -> Result<Option<usize>, ConfigError> {
    if value.eq_ignore_ascii_case("unlimited") {
        return Ok(None);
    }
    let parsed = value
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    Ok(usize::try_from(parsed).ok())
}

fn parse_workers(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(workers) if workers > 0 => Ok(workers),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(DEFAULT_PRELOAD_WORKERS))
        .unwrap_or(DEFAULT_PRELOAD_WORKERS)
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
