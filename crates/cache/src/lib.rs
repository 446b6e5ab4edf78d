//! PDF Viewer Text Cache Library
//!
//! Page text cache with a background preload sweep, plus the geometry and
//! page text types shared with OCR and tokenization.

pub mod config;
pub mod geometry;
pub mod page_text;
pub mod text_cache;

pub use config::{config_entries, ConfigError, TextCacheConfig, DEFAULT_PRELOAD_WORKERS};
pub use geometry::{Point, Quad, Rect};
pub use page_text::{ExtractError, PageExtractor, PageTextData, TextBlock, TextChar, TextLine};
pub use text_cache::{CacheEvent, CacheStatistics, PageSearchHit, TextCache};
