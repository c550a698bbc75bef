//! Terms: the unit of indexing and search.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A word from a document field.
///
/// Terms order by field name first and then by text, which is the order of
/// the term dictionary on disk.
///
/// ```
/// use pilum::index::Term;
///
/// let a = Term::new("body", "apple");
/// let b = Term::new("body", "banana");
/// let c = Term::new("author", "zed");
/// assert!(c < a && a < b);
/// assert_eq!(a.to_string(), "body:apple");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    field: String,
    text: String,
}

impl Term {
    /// Create a term.
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Term text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// A term in the same field with different text.
    pub fn with_text<T: Into<String>>(&self, text: T) -> Self {
        Term {
            field: self.field.clone(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}
