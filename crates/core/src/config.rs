//! Text subsystem configuration.
//!
//! Layers the OCR and tokenizer settings on top of [`TextCacheConfig`].
//! Like the cache configuration it loads from environment variables or a
//! `key = value` file.

use crate::ocr_coordinator::{DEFAULT_DEBOUNCE_MS, MAX_DEBOUNCE_MS};
use pdf_viewer_cache::{config_entries, ConfigError, TextCacheConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the whole text subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerTextConfig {
    /// Directory holding the OCR model files
    pub ocr_model_dir: PathBuf,

    /// Directory holding the segmentation dictionaries
    pub dictionary_dir: PathBuf,

    /// Hover OCR debounce delay in milliseconds (0 to 2000)
    pub debounce_ms: u64,

    /// Whether hovering triggers OCR
    pub ocr_hover_enabled: bool,

    /// Page text cache settings
    pub cache: TextCacheConfig,
}

impl Default for ViewerTextConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            ocr_model_dir: data_dir.join("ocr-models"),
            dictionary_dir: data_dir.join("dict"),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            ocr_hover_enabled: true,
            cache: TextCacheConfig::default(),
        }
    }
}

impl ViewerTextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ocr_model_dir = dir.into();
        self
    }

    pub fn with_dictionary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dictionary_dir = dir.into();
        self
    }

    /// Set the debounce delay, clamped to the accepted range
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms.min(MAX_DEBOUNCE_MS);
        self
    }

    pub fn with_ocr_hover_enabled(mut self, enabled: bool) -> Self {
        self.ocr_hover_enabled = enabled;
        self
    }

    pub fn with_cache(mut self, cache: TextCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_VIEWER_OCR_MODEL_DIR`: OCR model directory
    /// - `PDF_VIEWER_DICT_DIR`: segmentation dictionary directory
    /// - `PDF_VIEWER_OCR_DEBOUNCE_MS`: debounce delay (0 to 2000)
    /// - `PDF_VIEWER_OCR_HOVER`: `true`/`false` (also `1`/`0`, `on`/`off`)
    /// - plus the cache variables read by [`TextCacheConfig::from_env`]
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            cache: TextCacheConfig::from_env()?,
            ..Self::default()
        };

        if let Some(dir) = std::env::var_os("PDF_VIEWER_OCR_MODEL_DIR") {
            config.ocr_model_dir = PathBuf::from(dir);
        }

        if let Some(dir) = std::env::var_os("PDF_VIEWER_DICT_DIR") {
            config.dictionary_dir = PathBuf::from(dir);
        }

        if let Ok(val) = std::env::var("PDF_VIEWER_OCR_DEBOUNCE_MS") {
            config.debounce_ms = parse_debounce("PDF_VIEWER_OCR_DEBOUNCE_MS", &val)?;
        }

        if let Ok(val) = std::env::var("PDF_VIEWER_OCR_HOVER") {
            config.ocr_hover_enabled = parse_bool("PDF_VIEWER_OCR_HOVER", &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a file.
    ///
    /// Expected file format:
    /// ```toml
    /// ocr_model_dir = "/opt/viewer/models"
    /// dictionary_dir = "/opt/viewer/dict"
    /// ocr_debounce_ms = 300
    /// ocr_hover_enabled = true
    /// cache_max_pages = 500
    /// preload_workers = 4
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from `key = value` lines. Unknown keys are ignored.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in config_entries(toml_str) {
            match key {
                "ocr_model_dir" => config.ocr_model_dir = PathBuf::from(value),
                "dictionary_dir" => config.dictionary_dir = PathBuf::from(value),
                "ocr_debounce_ms" => config.debounce_ms = parse_debounce(key, value)?,
                "ocr_hover_enabled" => config.ocr_hover_enabled = parse_bool(key, value)?,
                _ => {
                    if !config.cache.apply_key(key, value)? {
                        tracing::debug!(key, "ignoring unknown configuration key");
                    }
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = format!("# PDF Viewer Text Configuration\n{}", self.to_toml());
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Converts configuration to `key = value` lines.
    pub fn to_toml(&self) -> String {
        format!(
            "ocr_model_dir = \"{}\"\ndictionary_dir = \"{}\"\nocr_debounce_ms = {}\nocr_hover_enabled = {}\n{}",
            self.ocr_model_dir.display(),
            self.dictionary_dir.display(),
            self.debounce_ms,
            self.ocr_hover_enabled,
            self.cache.to_toml()
        )
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pdf-viewer")
}

fn parse_debounce(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(ms) if ms <= MAX_DEBOUNCE_MS => Ok(ms),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}
