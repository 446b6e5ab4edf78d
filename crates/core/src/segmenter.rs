//! CJK word segmentation
//!
//! CJK text has no spaces between words, so splitting it needs a dictionary.
//! The [`Segmenter`] trait is the seam to a segmentation library; the
//! bundled [`DictionarySegmenter`] reads jieba-format word lists and cuts by
//! forward maximum matching.

use crate::tokenizer::TokenizerError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Main word list (`word [frequency] [tag]` per line)
pub const MAIN_DICTIONARY: &str = "jieba.dict.utf8";

/// Optional user additions, same format as the main list
pub const USER_DICTIONARY: &str = "user.dict.utf8";

/// One word produced by a segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub word: String,
    /// Character (not byte) offset of the word in the input
    pub offset: usize,
}

impl Segment {
    pub fn new(word: impl Into<String>, offset: usize) -> Self {
        Self {
            word: word.into(),
            offset,
        }
    }

    /// Length of the word in characters
    pub fn char_len(&self) -> usize {
        self.word.chars().count()
    }
}

/// Word segmentation backend.
///
/// `cut` must cover the input: concatenating the words in order yields the
/// original text, and each offset is the running character count.
pub trait Segmenter: Send + Sync {
    /// Load dictionaries from `dict_dir`.
    fn initialize(&mut self, dict_dir: &Path) -> Result<(), TokenizerError>;

    /// Split `text` into words with their character offsets.
    fn cut(&self, text: &str) -> Vec<Segment>;
}

/// True for CJK ideographs, kana and hangul syllables.
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x30FF     // Hiragana, Katakana
            | 0x3400..=0x4DBF   // CJK Extension A
            | 0x4E00..=0x9FFF   // CJK Unified Ideographs
            | 0xAC00..=0xD7AF   // Hangul Syllables
            | 0xF900..=0xFAFF   // CJK Compatibility Ideographs
            | 0x20000..=0x2A6DF // CJK Extension B
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Forward maximum matching segmenter over a jieba-format dictionary.
///
/// At each position the longest dictionary word is taken. CJK characters
/// that start no known word come out one by one, runs of other letters and
/// digits stay together, and anything else (spaces, punctuation) is emitted
/// as a single-character segment.
#[derive(Debug, Default, Clone)]
pub struct DictionarySegmenter {
    words: HashSet<String>,
    max_word_chars: usize,
}

impl DictionarySegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a segmenter from an in-memory word list
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segmenter = Self::new();
        for word in words {
            segmenter.add_word(word.as_ref());
        }
        segmenter
    }

    pub fn add_word(&mut self, word: &str) {
        let word = word.trim();
        if word.is_empty() {
            return;
        }
        self.max_word_chars = self.max_word_chars.max(word.chars().count());
        self.words.insert(word.to_string());
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    fn load_dictionary(&mut self, path: &Path) -> Result<usize, TokenizerError> {
        let contents = fs::read_to_string(path).map_err(|error| {
            TokenizerError::SegmenterFailed(format!("{}: {error}", path.display()))
        })?;

        let before = self.words.len();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(word) = line.split_whitespace().next() {
                self.add_word(word);
            }
        }
        Ok(self.words.len() - before)
    }

    /// Length in characters of the longest dictionary word at the start of
    /// `chars`, or 1 when none matches.
    fn longest_match(&self, chars: &[char]) -> usize {
        let limit = self.max_word_chars.min(chars.len());
        let mut candidate = String::new();
        let mut best = 1;

        for (len, c) in chars[..limit].iter().enumerate() {
            candidate.push(*c);
            if len > 0 && self.words.contains(&candidate) {
                best = len + 1;
            }
        }
        best
    }
}

impl Segmenter for DictionarySegmenter {
    /// Replace the word list with the dictionaries in `dict_dir`.
    ///
    /// On failure the previous word list is kept.
    fn initialize(&mut self, dict_dir: &Path) -> Result<(), TokenizerError> {
        let mut loaded = Self::new();
        let main = loaded.load_dictionary(&dict_dir.join(MAIN_DICTIONARY))?;

        let user_path = dict_dir.join(USER_DICTIONARY);
        let user = if user_path.is_file() {
            loaded.load_dictionary(&user_path)?
        } else {
            0
        };

        *self = loaded;

        tracing::debug!(
            dict_dir = %dict_dir.display(),
            main,
            user,
            "segmentation dictionaries loaded"
        );
        Ok(())
    }

    fn cut(&self, text: &str) -> Vec<Segment> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let len = if is_cjk(c) {
                self.longest_match(&chars[i..])
            } else if c.is_alphanumeric() {
                chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() && !is_cjk(**c))
                    .count()
            } else {
                1
            };

            segments.push(Segment::new(chars[i..i + len].iter().collect::<String>(), i));
            i += len;
        }

        segments
    }
}
