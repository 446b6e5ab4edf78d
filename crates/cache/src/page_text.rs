//! Extracted page text with per-character geometry
//!
//! `PageTextData` is produced by a [`PageExtractor`] and is immutable once
//! built. The full page text is denormalized up front so substring search
//! never has to walk the block/line/char tree.

use crate::geometry::Rect;
use thiserror::Error;

/// A single character with its bounding box in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChar {
    pub ch: char,
    pub bbox: Rect,
}

impl TextChar {
    pub fn new(ch: char, bbox: Rect) -> Self {
        Self { ch, bbox }
    }
}

/// An ordered run of characters on one baseline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    pub chars: Vec<TextChar>,
}

impl TextLine {
    pub fn new(chars: Vec<TextChar>) -> Self {
        Self { chars }
    }

    /// Line text in character order
    pub fn text(&self) -> String {
        self.chars.iter().map(|c| c.ch).collect()
    }

    /// Union of all character boxes, `None` for an empty line
    pub fn bounds(&self) -> Option<Rect> {
        union_all(self.chars.iter().map(|c| c.bbox))
    }
}

/// A paragraph-like group of lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    pub fn new(lines: Vec<TextLine>) -> Self {
        Self { lines }
    }

    pub fn bounds(&self) -> Option<Rect> {
        union_all(self.lines.iter().filter_map(TextLine::bounds))
    }
}

fn union_all(rects: impl Iterator<Item = Rect>) -> Option<Rect> {
    rects.reduce(|acc, rect| acc.union(&rect))
}

/// Text content of one page.
///
/// `page_index` is `-1` for the invalid sentinel returned on cache misses.
/// A valid page may still be empty (blank or image-only page).
#[derive(Debug, Clone, PartialEq)]
pub struct PageTextData {
    page_index: i32,
    blocks: Vec<TextBlock>,
    full_text: String,
}

impl PageTextData {
    /// Build page data from extracted blocks.
    ///
    /// Lines are joined with `\n` in reading order to form the full text.
    pub fn new(page_index: usize, blocks: Vec<TextBlock>) -> Self {
        debug_assert!(
            i32::try_from(page_index).is_ok(),
            "page index {page_index} does not fit the i32 page index"
        );
        let full_text = blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            page_index: i32::try_from(page_index).unwrap_or(i32::MAX),
            blocks,
            full_text,
        }
    }

    /// The invalid sentinel (`page_index == -1`).
    pub fn invalid() -> Self {
        Self {
            page_index: -1,
            blocks: Vec::new(),
            full_text: String::new(),
        }
    }

    pub fn page_index(&self) -> i32 {
        self.page_index
    }

    /// Page index as `usize`, `None` for the invalid sentinel
    pub fn page(&self) -> Option<usize> {
        usize::try_from(self.page_index).ok()
    }

    pub fn is_valid(&self) -> bool {
        self.page_index >= 0
    }

    /// True when the page has no text blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Number of characters across all lines
    pub fn char_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .map(|line| line.chars.len())
            .sum()
    }
}

impl Default for PageTextData {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Page extraction failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("page {0} is out of range")]
    PageOutOfRange(usize),

    #[error("failed to extract text from page {page}: {message}")]
    Failed { page: usize, message: String },
}

/// Source of page text, typically backed by the PDF renderer.
///
/// Implementations must be callable from several worker threads at once;
/// each call is independent (e.g. uses its own renderer handle).
pub trait PageExtractor: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Extract text and geometry for one page. May block for a long time.
    fn extract(&self, page_index: usize) -> Result<PageTextData, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, x: f32, y: f32) -> TextLine {
        TextLine::new(
            text.chars()
                .enumerate()
                .map(|(i, ch)| TextChar::new(ch, Rect::new(x + i as f32 * 6.0, y, 6.0, 10.0)))
                .collect(),
        )
    }

    #[test]
    fn test_invalid_sentinel() {
        let data = PageTextData::invalid();
        assert_eq!(data.page_index(), -1);
        assert!(!data.is_valid());
        assert!(data.is_empty());
        assert_eq!(data.page(), None);
        assert_eq!(PageTextData::default(), data);
    }

    #[test]
    fn test_blank_page_is_valid_and_empty() {
        let data = PageTextData::new(3, Vec::new());
        assert!(data.is_valid());
        assert!(data.is_empty());
        assert_eq!(data.page(), Some(3));
        assert_eq!(data.full_text(), "");
    }

    #[test]
    fn test_full_text_joins_lines() {
        let blocks = vec![
            TextBlock::new(vec![line("Hello", 0.0, 0.0), line("world", 0.0, 12.0)]),
            TextBlock::new(vec![line("again", 0.0, 40.0)]),
        ];
        let data = PageTextData::new(0, blocks);

        assert_eq!(data.full_text(), "Hello\nworld\nagain");
        assert_eq!(data.char_count(), 15);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_line_and_block_bounds() {
        let first = line("ab", 0.0, 0.0);
        assert_eq!(first.bounds(), Some(Rect::new(0.0, 0.0, 12.0, 10.0)));
        assert_eq!(TextLine::default().bounds(), None);

        let block = TextBlock::new(vec![first, line("c", 0.0, 20.0)]);
        assert_eq!(block.bounds(), Some(Rect::new(0.0, 0.0, 12.0, 30.0)));
    }

    #[test]
    fn test_extract_error_display() {
        assert_eq!(
            ExtractError::PageOutOfRange(9).to_string(),
            "page 9 is out of range"
        );
        let err = ExtractError::Failed {
            page: 2,
            message: "corrupt stream".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to extract text from page 2: corrupt stream"
        );
    }
}
