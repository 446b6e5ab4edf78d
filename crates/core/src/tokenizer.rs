//! Word tokenizer for extracted and OCR text
//!
//! Splits Latin text on non-word characters and CJK text with a dictionary
//! [`Segmenter`]. For OCR output every token also gets an estimated
//! rectangle, interpolated from its character offsets within the line box,
//! so a pointer position can be resolved to the word under it.

use crate::ocr::OcrResult;
use crate::segmenter::{contains_cjk, DictionarySegmenter, Segment, Segmenter};
use pdf_viewer_cache::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Files a dictionary directory must provide.
pub const DICTIONARY_FILES: [&str; 5] = [
    "jieba.dict.utf8",
    "hmm_model.utf8",
    "user.dict.utf8",
    "idf.utf8",
    "stop_words.utf8",
];

/// Tokenizer error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("missing dictionary files: {}", .0.join(", "))]
    MissingDictionaryFiles(Vec<String>),

    #[error("segmenter failed: {0}")]
    SegmenterFailed(String),
}

/// A word located inside an OCR line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenWithPosition {
    pub word: String,
    /// Character offset of the first character within the line
    pub start_index: usize,
    /// Character offset one past the last character
    pub end_index: usize,
    pub line_index: usize,
    /// Rectangle interpolated from the line box, in image coordinates
    pub estimated_rect: Rect,
}

impl TokenWithPosition {
    /// The empty token returned when there is nothing to find
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        !self.word.is_empty()
    }
}

/// Latin and CJK word tokenizer.
pub struct Tokenizer {
    segmenter: Box<dyn Segmenter>,
    initialized: bool,
    last_error: Option<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Create a tokenizer backed by [`DictionarySegmenter`]
    pub fn new() -> Self {
        Self::with_segmenter(Box::new(DictionarySegmenter::new()))
    }

    /// Create a tokenizer backed by a custom segmenter
    pub fn with_segmenter(segmenter: Box<dyn Segmenter>) -> Self {
        Self {
            segmenter,
            initialized: false,
            last_error: None,
        }
    }

    /// Load segmentation dictionaries from `dict_dir`.
    ///
    /// Every file in [`DICTIONARY_FILES`] must exist; the error names the
    /// ones that do not. Latin tokenizing works without initialization.
    pub fn initialize(&mut self, dict_dir: impl AsRef<Path>) -> Result<(), TokenizerError> {
        let dict_dir = dict_dir.as_ref();

        let missing: Vec<String> = DICTIONARY_FILES
            .iter()
            .filter(|name| !dict_dir.join(name).is_file())
            .map(|name| name.to_string())
            .collect();

        let result = if missing.is_empty() {
            self.segmenter.initialize(dict_dir)
        } else {
            Err(TokenizerError::MissingDictionaryFiles(missing))
        };

        match result {
            Ok(()) => {
                tracing::info!(dict_dir = %dict_dir.display(), "tokenizer initialized");
                self.initialized = true;
                self.last_error = None;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(dict_dir = %dict_dir.display(), %error, "tokenizer initialization failed");
                self.initialized = false;
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Split text into maximal runs of letters, digits, `'` and `-`.
    pub fn tokenize_latin(&self, text: &str) -> Vec<String> {
        latin_runs(text)
            .into_iter()
            .map(|(word, _, _)| word)
            .collect()
    }

    /// Alias of [`tokenize_latin`](Self::tokenize_latin)
    pub fn tokenize_english(&self, text: &str) -> Vec<String> {
        self.tokenize_latin(text)
    }

    /// Segment CJK text into words. Empty until initialized.
    pub fn tokenize_cjk(&self, text: &str) -> Vec<String> {
        if !self.initialized {
            tracing::debug!("CJK tokenizing requested before initialization");
            return Vec::new();
        }

        self.cjk_segments(text)
            .into_iter()
            .map(|segment| segment.word)
            .collect()
    }

    /// Tokenize with the CJK path when the text has CJK characters and
    /// dictionaries are loaded, the Latin path otherwise.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if self.initialized && contains_cjk(text) {
            self.tokenize_cjk(text)
        } else {
            self.tokenize_latin(text)
        }
    }

    /// Tokenize every OCR line and estimate each token's rectangle.
    ///
    /// Lines are paired with boxes up to the shorter of the two lists. A
    /// token's horizontal extent is interpolated from its character offsets;
    /// it spans the full line height and is at least one unit wide.
    pub fn tokenize_with_position(&self, result: &OcrResult) -> Vec<TokenWithPosition> {
        let mut tokens = Vec::new();

        for (line_index, (text, quad)) in result.texts.iter().zip(&result.boxes).enumerate() {
            let line_len = text.chars().count();
            if line_len == 0 {
                continue;
            }

            let line_rect = quad.bounding_rect();
            let spans: Vec<(String, usize, usize)> = if self.initialized && contains_cjk(text) {
                self.cjk_segments(text)
                    .into_iter()
                    .map(|segment| {
                        let end = segment.offset + segment.char_len();
                        (segment.word, segment.offset, end)
                    })
                    .collect()
            } else {
                latin_runs(text)
            };

            tokens.extend(spans.into_iter().map(|(word, start, end)| TokenWithPosition {
                estimated_rect: interpolate_rect(&line_rect, start, end, line_len),
                word,
                start_index: start,
                end_index: end,
                line_index,
            }));
        }

        tokens
    }

    /// Nearest token to `point`, or the invalid token when `tokens` is empty.
    ///
    /// Distance is measured to the token rectangle (zero inside it). Ties go
    /// to the earliest token.
    pub fn find_closest_token(tokens: &[TokenWithPosition], point: &Point) -> TokenWithPosition {
        closest_token(tokens, point)
            .map(|(token, _)| token.clone())
            .unwrap_or_default()
    }

    /// Segments worth keeping as tokens: no whitespace, no lone punctuation.
    fn cjk_segments(&self, text: &str) -> Vec<Segment> {
        self.segmenter
            .cut(text)
            .into_iter()
            .filter(|segment| {
                let mut chars = segment.word.chars();
                match (chars.next(), chars.next()) {
                    (None, _) => false,
                    (Some(c), None) => c.is_alphanumeric(),
                    _ => !segment.word.trim().is_empty(),
                }
            })
            .collect()
    }
}

/// Nearest token and its distance, `None` for an empty slice.
pub fn closest_token<'a>(
    tokens: &'a [TokenWithPosition],
    point: &Point,
) -> Option<(&'a TokenWithPosition, f32)> {
    let mut best: Option<(&TokenWithPosition, f32)> = None;

    for token in tokens {
        let distance = token.estimated_rect.distance_to_point(point);
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((token, distance));
        }
    }

    best
}

fn is_latin_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\'' || c == '-'
}

/// Maximal word runs with their character offsets `(word, start, end)`.
fn latin_runs(text: &str) -> Vec<(String, usize, usize)> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut len = 0;

    for (index, c) in text.chars().enumerate() {
        if is_latin_word_char(c) {
            if current.is_empty() {
                start = index;
            }
            current.push(c);
        } else if !current.is_empty() {
            runs.push((std::mem::take(&mut current), start, index));
        }
        len = index + 1;
    }

    if !current.is_empty() {
        runs.push((current, start, len));
    }

    runs
}

fn interpolate_rect(line: &Rect, start: usize, end: usize, line_len: usize) -> Rect {
    let len = line_len as f32;
    let left = line.left() + start as f32 / len * line.width;
    let right = line.left() + end as f32 / len * line.width;

    Rect::new(left, line.top(), (right - left).max(1.0), line.height)
}
