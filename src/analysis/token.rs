//! The unit of text an [`Analyzer`](super::Analyzer) emits.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// One indexed term occurrence with where it came from.
///
/// ```
/// use pilum::analysis::token::Token;
///
/// let token = Token::new("world", 1, 6..11);
/// assert_eq!(token.text, "world");
/// assert_eq!(token.len_in_source(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Ordinal in the stream, starting at 0.
    pub position: usize,
    /// Byte offset of the token in the analyzed text.
    pub start_offset: usize,
    /// Byte offset just past the token.
    pub end_offset: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, position: usize, source: Range<usize>) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: source.start,
            end_offset: source.end,
        }
    }

    /// Number of source bytes the token was cut from.
    pub fn len_in_source(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

pub type TokenStream = Box<dyn Iterator<Item = Token>>;
