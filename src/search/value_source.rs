//! Per-document values for function scoring.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::index::IndexReader;
use crate::search::explanation::Explanation;
use crate::search::field_cache::{FieldCache, StringIndex};

/// A source of one value per document, read through the default
/// [`FieldCache`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// The field's term parsed as an integer.
    IntField(String),
    /// The field's term parsed as a float.
    FloatField(String),
    /// The ordinal of the field's term among all its terms, starting at 1.
    Ord(String),
    /// The reverse ordinal: the greatest term maps to 0.
    ReverseOrd(String),
}

impl ValueSource {
    /// Name of the field values are read from.
    pub fn field(&self) -> &str {
        match self {
            ValueSource::IntField(f)
            | ValueSource::FloatField(f)
            | ValueSource::Ord(f)
            | ValueSource::ReverseOrd(f) => f,
        }
    }

    /// Short description, e.g. `int(price)`.
    pub fn description(&self) -> String {
        match self {
            ValueSource::IntField(f) => format!("int({f})"),
            ValueSource::FloatField(f) => format!("float({f})"),
            ValueSource::Ord(f) => format!("ord({f})"),
            ValueSource::ReverseOrd(f) => format!("rord({f})"),
        }
    }

    /// Load the values for `reader`.
    pub fn values(&self, reader: &dyn IndexReader) -> Result<DocValues> {
        let cache = FieldCache::default_cache();
        let values = match self {
            ValueSource::IntField(f) => Values::Ints(cache.get_ints(reader, f)?),
            ValueSource::FloatField(f) => Values::Floats(cache.get_floats(reader, f)?),
            ValueSource::Ord(f) => Values::Ord(cache.get_string_index(reader, f)?),
            ValueSource::ReverseOrd(f) => Values::ReverseOrd(cache.get_string_index(reader, f)?),
        };
        Ok(DocValues {
            description: self.description(),
            values,
        })
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[derive(Debug, Clone)]
enum Values {
    Ints(Arc<[i32]>),
    Floats(Arc<[f32]>),
    Ord(Arc<StringIndex>),
    ReverseOrd(Arc<StringIndex>),
}

/// Values of a [`ValueSource`] for one reader.
#[derive(Debug, Clone)]
pub struct DocValues {
    description: String,
    values: Values,
}

impl DocValues {
    /// The value of `doc` as a float.
    pub fn float_val(&self, doc: u32) -> f32 {
        let doc = doc as usize;
        match &self.values {
            Values::Ints(v) => v.get(doc).copied().unwrap_or(0) as f32,
            Values::Floats(v) => v.get(doc).copied().unwrap_or(0.0),
            Values::Ord(_) | Values::ReverseOrd(_) => self.int_val(doc as u32) as f32,
        }
    }

    /// The value of `doc` as an integer.
    pub fn int_val(&self, doc: u32) -> i32 {
        let doc = doc as usize;
        match &self.values {
            Values::Ints(v) => v.get(doc).copied().unwrap_or(0),
            Values::Floats(v) => v.get(doc).copied().unwrap_or(0.0) as i32,
            Values::Ord(index) => index.order.get(doc).copied().unwrap_or(0) as i32,
            Values::ReverseOrd(index) => {
                let ord = index.order.get(doc).copied().unwrap_or(0) as i32;
                (index.lookup.len() as i32 - 1) - ord
            }
        }
    }

    /// `description=value` for `doc`.
    pub fn to_string_of(&self, doc: u32) -> String {
        match &self.values {
            Values::Floats(_) => format!("{}={}", self.description, self.float_val(doc)),
            _ => format!("{}={}", self.description, self.int_val(doc)),
        }
    }

    /// Explain the value of `doc`.
    pub fn explain(&self, doc: u32) -> Explanation {
        Explanation::new(self.float_val(doc), self.to_string_of(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::document::Document;
    use crate::index::{DirectoryReader, IndexWriter, IndexWriterConfig};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn reader() -> DirectoryReader {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let config = IndexWriterConfig::default().analyzer(Arc::new(WhitespaceAnalyzer::new()));
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for (n, name) in [("4", "cherry"), ("10", "apple"), ("7", "banana")] {
            writer
                .add_document(Document::builder().add_keyword("n", n).add_keyword("name", name).build())
                .unwrap();
        }
        writer.close().unwrap();
        DirectoryReader::open(storage).unwrap()
    }

    #[test]
    fn test_sources() {
        let reader = reader();
        let ints = ValueSource::IntField("n".into()).values(&reader).unwrap();
        assert_eq!(ints.float_val(1), 10.0);
        assert_eq!(ints.explain(0).description, "int(n)=4");

        let floats = ValueSource::FloatField("n".into()).values(&reader).unwrap();
        assert_eq!(floats.float_val(2), 7.0);

        let ord = ValueSource::Ord("name".into()).values(&reader).unwrap();
        assert_eq!((0..3).map(|d| ord.int_val(d)).collect::<Vec<_>>(), vec![3, 1, 2]);

        let rord = ValueSource::ReverseOrd("name".into()).values(&reader).unwrap();
        assert_eq!((0..3).map(|d| rord.int_val(d)).collect::<Vec<_>>(), vec![0, 2, 1]);
        assert_eq!(rord.explain(1).description, "rord(name)=2");
    }

    #[test]
    fn test_display_and_equality() {
        assert_eq!(ValueSource::Ord("f".into()).to_string(), "ord(f)");
        assert_eq!(ValueSource::IntField("a".into()), ValueSource::IntField("a".into()));
        assert_ne!(ValueSource::IntField("a".into()), ValueSource::FloatField("a".into()));
    }
}
