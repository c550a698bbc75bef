//! The [`Analyzer`] trait and the built-in analyzers.
//!
//! ```
//! use pilum::analysis::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new();
//! let tokens: Vec<_> = analyzer.analyze("Hello, World").unwrap().map(|t| t.text).collect();
//! assert_eq!(tokens, vec!["hello", "world"]);
//! ```

use std::fmt::Debug;

use ahash::AHashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Converts field text into a stream of tokens.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze the given text.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Identifier used in logs and configuration.
    fn name(&self) -> &'static str;
}

fn collect_tokens<'a, I>(pieces: I, lowercase: bool) -> TokenStream
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let tokens: Vec<Token> = pieces
        .enumerate()
        .map(|(position, (start, piece))| {
            let text = if lowercase {
                piece.to_lowercase()
            } else {
                piece.to_string()
            };
            Token::new(text, position, start..start + piece.len())
        })
        .collect();
    Box::new(tokens.into_iter())
}

/// Splits on whitespace and keeps the text as is.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceAnalyzer;

impl WhitespaceAnalyzer {
    /// Create a new whitespace analyzer.
    pub fn new() -> Self {
        WhitespaceAnalyzer
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let pieces = text.split_whitespace().map(|piece| {
            let start = piece.as_ptr() as usize - text.as_ptr() as usize;
            (start, piece)
        });
        Ok(collect_tokens(pieces, false))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Splits on every non-letter character and lowercases.
#[derive(Debug, Clone, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    /// Create a new simple analyzer.
    pub fn new() -> Self {
        SimpleAnalyzer
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let pieces = text
            .split(|c: char| !c.is_alphabetic())
            .filter(|piece| !piece.is_empty())
            .map(|piece| {
                let start = piece.as_ptr() as usize - text.as_ptr() as usize;
                (start, piece)
            });
        Ok(collect_tokens(pieces, true))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Unicode word segmentation followed by lowercasing and stop word removal.
#[derive(Debug, Clone, Default)]
pub struct StandardAnalyzer {
    stop_words: AHashSet<String>,
}

/// Common English stop words.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

impl StandardAnalyzer {
    /// Create an analyzer without stop words.
    pub fn new() -> Self {
        StandardAnalyzer::default()
    }

    /// Create an analyzer that drops the given (lowercase) stop words.
    pub fn with_stop_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StandardAnalyzer {
            stop_words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an analyzer using [`ENGLISH_STOP_WORDS`].
    pub fn english() -> Self {
        Self::with_stop_words(ENGLISH_STOP_WORDS.iter().copied())
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = text
            .unicode_word_indices()
            .map(|(start, word)| (start, word, word.to_lowercase()))
            .filter(|(_, _, lower)| !self.stop_words.contains(lower))
            .enumerate()
            .map(|(position, (start, word, lower))| {
                Token::new(lower, position, start..start + word.len())
            })
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Emits the entire input as a single token.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    /// Create a new keyword analyzer.
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        Ok(Box::new(std::iter::once(Token::new(text, 0, 0..text.len()))))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
