//! Text analysis: turning field values into indexed terms.
//!
//! Analysis is a collaborator of the index writer, not an algorithmic core,
//! so only a handful of analyzers ship here:
//!
//! - [`analyzer::WhitespaceAnalyzer`]: split on whitespace, keep case.
//! - [`analyzer::SimpleAnalyzer`]: split on non-letters, lowercase.
//! - [`analyzer::StandardAnalyzer`]: Unicode word boundaries (UAX #29),
//!   lowercase, optional stop words.
//! - [`analyzer::KeywordAnalyzer`]: the whole value is one token.

pub mod analyzer;
pub mod token;

pub use analyzer::{Analyzer, KeywordAnalyzer, SimpleAnalyzer, StandardAnalyzer, WhitespaceAnalyzer};
pub use token::{Token, TokenStream};
