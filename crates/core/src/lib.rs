//! PDF Viewer Text Core Library
//!
//! Hover OCR, word tokenizing and the composition root tying them to the
//! page text cache.
//!
//! Data flow for hover lookups:
//!
//! ```text
//! pointer hover -> OcrCoordinator (debounce) -> OcrEngine (worker)
//!               -> OcrEvent::Completed -> Tokenizer -> HoverLookup
//! ```

pub mod config;
pub mod hover;
pub mod ocr;
pub mod ocr_coordinator;
pub mod segmenter;
pub mod services;
pub mod tokenizer;

pub use config::ViewerTextConfig;
pub use hover::{HoverHit, HoverLookup};
pub use ocr::{
    EngineEvent, OcrEngine, OcrEngineState, OcrError, OcrModel, OcrModelLoader, OcrResult,
    RawOcrOutput, MIN_IMAGE_DIMENSION,
};
pub use ocr_coordinator::{OcrCoordinator, OcrEvent, DEFAULT_DEBOUNCE_MS, MAX_DEBOUNCE_MS};
pub use segmenter::{contains_cjk, is_cjk, DictionarySegmenter, Segment, Segmenter};
pub use services::TextServices;
pub use tokenizer::{closest_token, TokenWithPosition, Tokenizer, TokenizerError, DICTIONARY_FILES};
