//! Per-document field values un-inverted from the term dictionary.
//!
//! Loading walks every term of a field and records it for each document the
//! term occurs in, so a field used here should hold exactly one untokenized
//! term per document. Documents without a term get the default (0, 0.0 or
//! `None`). Results are cached per reader identity and field until the reader
//! is dropped.

use std::sync::Arc;

use ahash::AHashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::error::{PilumError, Result};
use crate::index::{IndexReader, Term};

/// Each document's term ordinal plus the sorted distinct terms.
#[derive(Debug, Clone, PartialEq)]
pub struct StringIndex {
    /// Ordinal per document into `lookup`; 0 when the document has no term.
    pub order: Vec<u32>,
    /// Sorted terms, with `lookup[0] == None`.
    pub lookup: Vec<Option<String>>,
}

type Key = (Uuid, String);

/// Cache of un-inverted field values.
#[derive(Debug, Default)]
pub struct FieldCache {
    ints: RwLock<AHashMap<Key, Arc<[i32]>>>,
    floats: RwLock<AHashMap<Key, Arc<[f32]>>>,
    strings: RwLock<AHashMap<Key, Arc<[Option<String>]>>>,
    string_indexes: RwLock<AHashMap<Key, Arc<StringIndex>>>,
}

lazy_static! {
    static ref DEFAULT_CACHE: FieldCache = FieldCache::new();
}

fn cached<V: ?Sized>(
    map: &RwLock<AHashMap<Key, Arc<V>>>,
    reader: &dyn IndexReader,
    field: &str,
    load: impl FnOnce() -> Result<Arc<V>>,
) -> Result<Arc<V>> {
    let key = (reader.reader_id(), field.to_string());
    if let Some(values) = map.read().get(&key) {
        return Ok(Arc::clone(values));
    }
    let values = load()?;
    trace!(field, reader = %key.0, "loaded field cache entry");
    Ok(Arc::clone(map.write().entry(key).or_insert(values)))
}

/// Call `visit(doc, text)` for every live document of every term in `field`.
fn for_each_term(
    reader: &dyn IndexReader,
    field: &str,
    mut visit: impl FnMut(u32, &str) -> Result<()>,
) -> Result<()> {
    for (text, _) in reader.terms(field) {
        if let Some(postings) = reader.term_docs(&Term::new(field, text.as_str()))? {
            for &doc in postings.docs() {
                visit(doc, &text)?;
            }
        }
    }
    Ok(())
}

impl FieldCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache that readers purge themselves from when
    /// dropped.
    pub fn default_cache() -> &'static FieldCache {
        &DEFAULT_CACHE
    }

    /// Terms of `field` parsed as integers.
    pub fn get_ints(&self, reader: &dyn IndexReader, field: &str) -> Result<Arc<[i32]>> {
        cached(&self.ints, reader, field, || {
            let mut values = vec![0i32; reader.max_doc() as usize];
            for_each_term(reader, field, |doc, text| {
                values[doc as usize] = text
                    .parse()
                    .map_err(|_| PilumError::field(format!("{field}: {text:?} is not an integer")))?;
                Ok(())
            })?;
            Ok(values.into())
        })
    }

    /// Terms of `field` parsed as floats.
    pub fn get_floats(&self, reader: &dyn IndexReader, field: &str) -> Result<Arc<[f32]>> {
        cached(&self.floats, reader, field, || {
            let mut values = vec![0f32; reader.max_doc() as usize];
            for_each_term(reader, field, |doc, text| {
                values[doc as usize] = text
                    .parse()
                    .map_err(|_| PilumError::field(format!("{field}: {text:?} is not a number")))?;
                Ok(())
            })?;
            Ok(values.into())
        })
    }

    /// The term of `field` in each document. With several terms per
    /// document the greatest one wins.
    pub fn get_strings(&self, reader: &dyn IndexReader, field: &str) -> Result<Arc<[Option<String>]>> {
        cached(&self.strings, reader, field, || {
            let mut values: Vec<Option<String>> = vec![None; reader.max_doc() as usize];
            for_each_term(reader, field, |doc, text| {
                values[doc as usize] = Some(text.to_string());
                Ok(())
            })?;
            Ok(values.into())
        })
    }

    /// Term ordinals of `field` per document.
    pub fn get_string_index(&self, reader: &dyn IndexReader, field: &str) -> Result<Arc<StringIndex>> {
        cached(&self.string_indexes, reader, field, || {
            let terms = reader.terms(field);
            let mut order = vec![0u32; reader.max_doc() as usize];
            let mut lookup = Vec::with_capacity(terms.len() + 1);
            lookup.push(None);
            for (text, _) in terms {
                let Some(postings) = reader.term_docs(&Term::new(field, text.as_str()))? else {
                    continue;
                };
                if postings.is_empty() {
                    continue;
                }
                let ord = lookup.len() as u32;
                for &doc in postings.docs() {
                    order[doc as usize] = ord;
                }
                lookup.push(Some(text));
            }
            Ok(Arc::new(StringIndex { order, lookup }))
        })
    }

    /// Drop every entry of the reader with identity `reader_id`.
    pub fn purge(&self, reader_id: Uuid) {
        self.ints.write().retain(|(id, _), _| *id != reader_id);
        self.floats.write().retain(|(id, _), _| *id != reader_id);
        self.strings.write().retain(|(id, _), _| *id != reader_id);
        self.string_indexes.write().retain(|(id, _), _| *id != reader_id);
    }

    /// Number of cached entries across all kinds.
    pub fn len(&self) -> usize {
        self.ints.read().len()
            + self.floats.read().len()
            + self.strings.read().len()
            + self.string_indexes.read().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
