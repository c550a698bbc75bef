//! Documents and fields.
//!
//! A [`Document`] is an ordered list of named [`Field`]s. Each field says
//! whether its value is stored (returned by `IndexSearcher::doc`) and how it
//! is indexed: tokenized by the writer's analyzer, indexed verbatim as one
//! term, or not indexed at all. Field and document boosts are folded into
//! the field norms at indexing time.
//!
//! ```
//! use pilum::document::{Document, Field};
//!
//! let doc = Document::builder()
//!     .add(Field::keyword("id", "42"))
//!     .add(Field::text("body", "the quick brown fox").with_boost(2.0))
//!     .boost(1.5)
//!     .build();
//!
//! assert_eq!(doc.get("id"), Some("42"));
//! assert_eq!(doc.boost(), 1.5);
//! ```

use serde::{Deserialize, Serialize};

/// How a field value is turned into terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indexing {
    /// Not searchable.
    No,
    /// Run through the analyzer.
    Tokenized,
    /// Indexed as a single term, exactly as given.
    Untokenized,
}

/// A named value within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    value: String,
    stored: bool,
    indexing: Indexing,
    boost: f32,
}

impl Field {
    /// Create a field with explicit flags.
    pub fn new<N: Into<String>, V: Into<String>>(
        name: N,
        value: V,
        stored: bool,
        indexing: Indexing,
    ) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            stored,
            indexing,
            boost: 1.0,
        }
    }

    /// Stored and tokenized.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, Indexing::Tokenized)
    }

    /// Tokenized but not stored.
    pub fn unstored<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, false, Indexing::Tokenized)
    }

    /// Stored and indexed as a single term.
    pub fn keyword<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, Indexing::Untokenized)
    }

    /// Stored only.
    pub fn stored_only<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, Indexing::No)
    }

    /// Set the index-time boost of this field.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the value is stored.
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    /// How the value is indexed.
    pub fn indexing(&self) -> Indexing {
        self.indexing
    }

    /// Whether the field produces terms.
    pub fn is_indexed(&self) -> bool {
        self.indexing != Indexing::No
    }

    /// Index-time boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }
}

/// A document to be indexed, or one loaded back from stored fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
    boost: f32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with boost 1.0.
    pub fn new() -> Self {
        Document {
            fields: Vec::new(),
            boost: 1.0,
        }
    }

    /// Create a builder for constructing documents.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// Append a field. Several fields may share a name.
    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value())
    }

    /// Every value of the named field, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |f| f.name == name).map(|f| f.value())
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Document boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Set the document boost.
    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`Document`].
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    /// Start an empty document.
    pub fn new() -> Self {
        DocumentBuilder {
            document: Document::new(),
        }
    }

    /// Append a field.
    pub fn add(mut self, field: Field) -> Self {
        self.document.add(field);
        self
    }

    /// Append a stored, tokenized field.
    pub fn add_text<N: Into<String>, V: Into<String>>(self, name: N, value: V) -> Self {
        self.add(Field::text(name, value))
    }

    /// Append a stored, untokenized field.
    pub fn add_keyword<N: Into<String>, V: Into<String>>(self, name: N, value: V) -> Self {
        self.add(Field::keyword(name, value))
    }

    /// Set the document boost.
    pub fn boost(mut self, boost: f32) -> Self {
        self.document.set_boost(boost);
        self
    }

    /// Finish the document.
    pub fn build(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued_fields() {
        let doc = Document::builder()
            .add_text("tag", "red")
            .add_keyword("id", "7")
            .add_text("tag", "blue")
            .build();

        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get("tag"), Some("red"));
        assert_eq!(doc.get_all("tag").collect::<Vec<_>>(), vec!["red", "blue"]);
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_field_flags() {
        let f = Field::unstored("body", "text");
        assert!(!f.is_stored());
        assert!(f.is_indexed());
        assert_eq!(f.boost(), 1.0);

        let f = Field::stored_only("raw", "x").with_boost(3.0);
        assert!(!f.is_indexed());
        assert_eq!(f.boost(), 3.0);
    }
}
