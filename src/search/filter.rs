//! Filters restricting which documents a search may return.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{PilumError, Result};
use crate::index::{IndexReader, Term};

/// Computes the set of allowed documents of a reader.
pub trait Filter: Send + Sync + Debug {
    /// One bit per document of `reader`; set bits pass.
    fn bits(&self, reader: &dyn IndexReader) -> Result<Arc<BitVec>>;

    /// Human-readable form used in query strings and explanations.
    fn description(&self) -> String;
}

/// A fixed set of document ids.
#[derive(Debug, Clone, Default)]
pub struct DocSetFilter {
    docs: Vec<u32>,
}

impl DocSetFilter {
    /// Allow exactly `docs`.
    pub fn new<I: IntoIterator<Item = u32>>(docs: I) -> Self {
        let mut docs: Vec<u32> = docs.into_iter().collect();
        docs.sort_unstable();
        docs.dedup();
        DocSetFilter { docs }
    }
}

impl Filter for DocSetFilter {
    fn bits(&self, reader: &dyn IndexReader) -> Result<Arc<BitVec>> {
        let mut bits = BitVec::from_elem(reader.max_doc() as usize, false);
        for &doc in self.docs.iter().take_while(|&&d| d < reader.max_doc()) {
            bits.set(doc as usize, true);
        }
        Ok(Arc::new(bits))
    }

    fn description(&self) -> String {
        format!("docs{:?}", self.docs)
    }
}

/// Documents with a term of `field` inside a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    field: String,
    lower: Option<String>,
    upper: Option<String>,
    include_lower: bool,
    include_upper: bool,
}

impl RangeFilter {
    /// A range over the terms of `field`. Either bound may be open, but not
    /// both, and an open bound cannot be inclusive.
    pub fn new(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Result<Self> {
        if lower.is_none() && upper.is_none() {
            return Err(PilumError::invalid_argument("at least one range bound is required"));
        }
        if (lower.is_none() && include_lower) || (upper.is_none() && include_upper) {
            return Err(PilumError::invalid_argument("an open bound cannot be inclusive"));
        }
        Ok(RangeFilter {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        })
    }

    /// Terms greater than or equal to `lower`.
    pub fn more(field: impl Into<String>, lower: impl Into<String>) -> Self {
        RangeFilter {
            field: field.into(),
            lower: Some(lower.into()),
            upper: None,
            include_lower: true,
            include_upper: false,
        }
    }

    /// Terms less than or equal to `upper`.
    pub fn less(field: impl Into<String>, upper: impl Into<String>) -> Self {
        RangeFilter {
            field: field.into(),
            lower: None,
            upper: Some(upper.into()),
            include_lower: false,
            include_upper: true,
        }
    }

    fn contains(&self, text: &str) -> bool {
        let above = match &self.lower {
            Some(lower) if self.include_lower => text >= lower.as_str(),
            Some(lower) => text > lower.as_str(),
            None => true,
        };
        let below = match &self.upper {
            Some(upper) if self.include_upper => text <= upper.as_str(),
            Some(upper) => text < upper.as_str(),
            None => true,
        };
        above && below
    }
}

impl Filter for RangeFilter {
    fn bits(&self, reader: &dyn IndexReader) -> Result<Arc<BitVec>> {
        let mut bits = BitVec::from_elem(reader.max_doc() as usize, false);
        for (text, _) in reader.terms(&self.field) {
            if !self.contains(&text) {
                continue;
            }
            if let Some(postings) = reader.term_docs(&Term::new(self.field.as_str(), text))? {
                for &doc in postings.docs() {
                    bits.set(doc as usize, true);
                }
            }
        }
        Ok(Arc::new(bits))
    }

    fn description(&self) -> String {
        format!(
            "{}:{}{} TO {}{}",
            self.field,
            if self.include_lower { '[' } else { '{' },
            self.lower.as_deref().unwrap_or("*"),
            self.upper.as_deref().unwrap_or("*"),
            if self.include_upper { ']' } else { '}' },
        )
    }
}

/// Remembers the bits of another filter per reader.
#[derive(Debug)]
pub struct CachingWrapperFilter {
    inner: Arc<dyn Filter>,
    cache: Mutex<AHashMap<Uuid, Arc<BitVec>>>,
}

impl CachingWrapperFilter {
    /// Cache the results of `inner`.
    pub fn new(inner: Arc<dyn Filter>) -> Self {
        CachingWrapperFilter {
            inner,
            cache: Mutex::new(AHashMap::new()),
        }
    }

    /// Number of readers with cached bits.
    pub fn cached_readers(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Filter for CachingWrapperFilter {
    fn bits(&self, reader: &dyn IndexReader) -> Result<Arc<BitVec>> {
        let id = reader.reader_id();
        if let Some(bits) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(bits));
        }
        let bits = self.inner.bits(reader)?;
        self.cache.lock().insert(id, Arc::clone(&bits));
        Ok(bits)
    }

    fn description(&self) -> String {
        format!("CachingWrapperFilter({})", self.inner.description())
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
        for date in ["20040101", "20050101", "20060101", "20070101"] {
            writer
                .add_document(Document::builder().add_keyword("date", date).build())
                .unwrap();
        }
        writer.close().unwrap();
        DirectoryReader::open(storage).unwrap()
    }

    fn set(bits: &BitVec) -> Vec<usize> {
        bits.iter().enumerate().filter(|(_, b)| *b).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_range_bounds() {
        let reader = reader();
        let inclusive = RangeFilter::new(
            "date",
            Some("20050101".into()),
            Some("20060101".into()),
            true,
            true,
        )
        .unwrap();
        assert_eq!(set(&inclusive.bits(&reader).unwrap()), vec![1, 2]);

        let exclusive = RangeFilter::new(
            "date",
            Some("20050101".into()),
            Some("20070101".into()),
            false,
            false,
        )
        .unwrap();
        assert_eq!(set(&exclusive.bits(&reader).unwrap()), vec![2]);

        assert_eq!(set(&RangeFilter::less("date", "20050101").bits(&reader).unwrap()), vec![0, 1]);
        assert_eq!(set(&RangeFilter::more("date", "20060101").bits(&reader).unwrap()), vec![2, 3]);
        assert_eq!(RangeFilter::less("date", "x").description(), "date:{* TO x]");

        assert!(RangeFilter::new("date", None, None, false, false).is_err());
        assert!(RangeFilter::new("date", None, Some("1".into()), true, false).is_err());
    }

    #[test]
    fn test_doc_set_and_caching() {
        let reader = reader();
        let docs = DocSetFilter::new([3, 1, 99]);
        assert_eq!(set(&docs.bits(&reader).unwrap()), vec![1, 3]);

        let caching = CachingWrapperFilter::new(Arc::new(docs));
        let first = caching.bits(&reader).unwrap();
        let second = caching.bits(&reader).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(caching.cached_readers(), 1);
    }
}
