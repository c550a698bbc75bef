//! A reader joining the fields of several parallel indexes.
//!
//! Parallel indexes hold the same documents under the same ids, each with a
//! different set of fields. Searching the join behaves as if every field had
//! been indexed into a single index. Typical use keeps rarely changing,
//! expensive fields apart from small fields that are rebuilt often.

use std::collections::BTreeMap;
use std::sync::Arc;

use bit_vec::BitVec;
use tracing::debug;
use uuid::Uuid;

use crate::document::Document;
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::index::reader::{IndexReader, Postings};

/// Joins readers that agree on `max_doc` and `num_docs`.
///
/// Each field is served by the first added reader that has it. Deletions
/// come from the first reader. Stored fields are gathered from every reader
/// not added with `ignore_stored_fields`.
#[derive(Debug)]
pub struct ParallelReader {
    id: Uuid,
    readers: Vec<Arc<dyn IndexReader>>,
    stored: Vec<usize>,
    fields: BTreeMap<String, usize>,
    max_doc: u32,
    num_docs: u32,
}

impl Default for ParallelReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelReader {
    /// A join with no readers yet. It reports zero documents until the first
    /// reader is added.
    pub fn new() -> Self {
        ParallelReader {
            id: Uuid::new_v4(),
            readers: Vec::new(),
            stored: Vec::new(),
            fields: BTreeMap::new(),
            max_doc: 0,
            num_docs: 0,
        }
    }

    /// Add a reader whose stored fields are part of [`document`](IndexReader::document).
    pub fn add(&mut self, reader: Arc<dyn IndexReader>) -> Result<()> {
        self.add_reader(reader, false)
    }

    /// Add a reader, optionally leaving its stored fields out of loaded
    /// documents.
    ///
    /// Fails with [`PilumError::InvalidArgument`] when `reader` disagrees
    /// with the readers already added on `max_doc` or `num_docs`.
    pub fn add_reader(&mut self, reader: Arc<dyn IndexReader>, ignore_stored_fields: bool) -> Result<()> {
        if self.readers.is_empty() {
            self.max_doc = reader.max_doc();
            self.num_docs = reader.num_docs();
        } else {
            if reader.max_doc() != self.max_doc {
                return Err(PilumError::invalid_argument(format!(
                    "all readers must have the same max_doc: {} != {}",
                    self.max_doc,
                    reader.max_doc()
                )));
            }
            if reader.num_docs() != self.num_docs {
                return Err(PilumError::invalid_argument(format!(
                    "all readers must have the same num_docs: {} != {}",
                    self.num_docs,
                    reader.num_docs()
                )));
            }
        }

        let index = self.readers.len();
        let mut claimed = 0;
        for field in reader.field_names() {
            if !self.fields.contains_key(&field) {
                self.fields.insert(field, index);
                claimed += 1;
            }
        }
        if !ignore_stored_fields {
            self.stored.push(index);
        }
        debug!(reader = index, fields = claimed, ignore_stored_fields, "added parallel reader");
        self.readers.push(reader);
        Ok(())
    }

    /// The joined readers, in the order they were added.
    pub fn readers(&self) -> &[Arc<dyn IndexReader>] {
        &self.readers
    }

    /// Stored fields of `doc` restricted to `fields`. Readers serving none of
    /// the requested fields are not consulted.
    pub fn document_with_fields(&self, doc: u32, fields: &[&str]) -> Result<Document> {
        let wanted: Vec<usize> = self
            .stored
            .iter()
            .copied()
            .filter(|&index| fields.iter().any(|f| self.fields.get(*f) == Some(&index)))
            .collect();
        self.gather(doc, &wanted, |name| fields.contains(&name))
    }

    fn reader_for(&self, field: &str) -> Option<&Arc<dyn IndexReader>> {
        self.fields.get(field).map(|&index| &self.readers[index])
    }

    fn check_doc(&self, doc: u32) -> Result<()> {
        if doc >= self.max_doc {
            return Err(PilumError::invalid_argument(format!(
                "document {doc} out of range ({} docs)",
                self.max_doc
            )));
        }
        Ok(())
    }

    fn gather(&self, doc: u32, readers: &[usize], keep: impl Fn(&str) -> bool) -> Result<Document> {
        self.check_doc(doc)?;
        let mut result = Document::new();
        for &index in readers {
            let part = self.readers[index].document(doc)?;
            for field in part.fields() {
                // A field shared by several readers is loaded from its owner only.
                if self.fields.get(field.name()) == Some(&index) && keep(field.name()) {
                    result.add(field.clone());
                }
            }
        }
        Ok(result)
    }
}

impl IndexReader for ParallelReader {
    fn reader_id(&self) -> Uuid {
        self.id
    }

    fn max_doc(&self) -> u32 {
        self.max_doc
    }

    fn num_docs(&self) -> u32 {
        self.num_docs
    }

    fn has_deletions(&self) -> bool {
        self.readers.first().is_some_and(|r| r.has_deletions())
    }

    fn is_deleted(&self, doc: u32) -> bool {
        self.readers.first().is_some_and(|r| r.is_deleted(doc))
    }

    fn deleted_docs(&self) -> Option<Arc<BitVec>> {
        self.readers.first().and_then(|r| r.deleted_docs())
    }

    fn document(&self, doc: u32) -> Result<Document> {
        self.gather(doc, &self.stored, |_| true)
    }

    fn doc_freq(&self, term: &Term) -> u32 {
        self.reader_for(term.field()).map_or(0, |r| r.doc_freq(term))
    }

    fn term_docs(&self, term: &Term) -> Result<Option<Postings>> {
        match self.reader_for(term.field()) {
            Some(reader) => reader.term_docs(term),
            None => Ok(None),
        }
    }

    fn terms(&self, field: &str) -> Vec<(String, u32)> {
        self.reader_for(field).map(|r| r.terms(field)).unwrap_or_default()
    }

    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        match self.reader_for(field) {
            Some(reader) => reader.norms(field),
            None => Ok(None),
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}
