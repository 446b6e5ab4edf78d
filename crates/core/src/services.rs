//! Text subsystem composition root
//!
//! Owns one instance of every text service for an open viewer window, built
//! from a [`ViewerTextConfig`].

use crate::config::ViewerTextConfig;
use crate::hover::{HoverHit, HoverLookup};
use crate::ocr::{OcrEngine, OcrModelLoader};
use crate::ocr_coordinator::{OcrCoordinator, OcrEvent};
use crate::tokenizer::Tokenizer;
use pdf_viewer_cache::{PageExtractor, TextCache};
use pdf_viewer_scheduler::PoolError;
use std::sync::Arc;

/// Page text cache, OCR engine and coordinator, tokenizer and hover lookup.
pub struct TextServices {
    config: ViewerTextConfig,
    cache: TextCache,
    engine: Arc<OcrEngine>,
    coordinator: OcrCoordinator,
    tokenizer: Tokenizer,
    hover: HoverLookup,
}

impl TextServices {
    /// Build every service. Nothing is loaded until [`start`](Self::start).
    pub fn new(
        config: ViewerTextConfig,
        extractor: Arc<dyn PageExtractor>,
        loader: Arc<dyn OcrModelLoader>,
    ) -> Result<Self, PoolError> {
        let cache = TextCache::new(extractor, &config.cache)?;
        let engine = Arc::new(OcrEngine::new(loader));

        let coordinator = OcrCoordinator::with_engine(engine.clone())?;
        coordinator.set_debounce_delay(i64::try_from(config.debounce_ms).unwrap_or(i64::MAX));
        coordinator.set_ocr_hover_enabled(config.ocr_hover_enabled);

        Ok(Self {
            config,
            cache,
            engine,
            coordinator,
            tokenizer: Tokenizer::new(),
            hover: HoverLookup::new(),
        })
    }

    /// Load dictionaries, start loading the OCR model and begin preloading
    /// page text.
    ///
    /// Dictionary and model failures are logged and kept in the respective
    /// `last_error`; Latin tokenizing and the text cache work regardless.
    pub fn start(&mut self) {
        if let Err(error) = self.tokenizer.initialize(&self.config.dictionary_dir) {
            tracing::warn!(%error, "CJK tokenizing unavailable");
        }

        if let Err(error) = self.coordinator.initialize(&self.config.ocr_model_dir) {
            tracing::warn!(%error, "hover OCR unavailable");
        }

        self.cache.start_preload();
    }

    pub fn config(&self) -> &ViewerTextConfig {
        &self.config
    }

    pub fn cache(&self) -> &TextCache {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<OcrEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &OcrCoordinator {
        &self.coordinator
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn tokenizer_mut(&mut self) -> &mut Tokenizer {
        &mut self.tokenizer
    }

    pub fn set_hover_lookup(&mut self, hover: HoverLookup) {
        self.hover = hover;
    }

    /// Resolve a coordinator event to the word under the pointer.
    pub fn resolve_hover(&self, event: &OcrEvent) -> Option<HoverHit> {
        self.hover.lookup(&self.tokenizer, event)
    }
}

impl Drop for TextServices {
    fn drop(&mut self) {
        self.cache.cancel_preload();
        self.engine.shutdown();
    }
}
