//! Read access to an index.

use std::fmt::Debug;
use std::sync::Arc;

use bit_vec::BitVec;
use uuid::Uuid;

use crate::document::Document;
use crate::error::Result;
use crate::index::Term;

/// Documents containing a term, with the term's frequency in each.
///
/// Document ids are strictly increasing and deleted documents are already
/// left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Postings {
    docs: Vec<u32>,
    freqs: Vec<u32>,
}

impl Postings {
    /// Empty postings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document. Ids must increase.
    pub fn push(&mut self, doc: u32, freq: u32) {
        debug_assert!(self.docs.last().is_none_or(|&last| last < doc));
        self.docs.push(doc);
        self.freqs.push(freq);
    }

    /// Append all of `other` with its ids shifted by `base`.
    pub fn append_rebased(&mut self, other: &Postings, base: u32) {
        self.docs.extend(other.docs.iter().map(|&d| d + base));
        self.freqs.extend_from_slice(&other.freqs);
    }

    /// Document ids.
    pub fn docs(&self) -> &[u32] {
        &self.docs
    }

    /// Frequencies, parallel to [`docs`](Self::docs).
    pub fn freqs(&self) -> &[u32] {
        &self.freqs
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether no document is listed.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// `(doc, freq)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.docs.iter().copied().zip(self.freqs.iter().copied())
    }

    /// Split into the id and frequency vectors.
    pub fn into_parts(self) -> (Vec<u32>, Vec<u32>) {
        (self.docs, self.freqs)
    }
}

/// A point-in-time view of an index.
///
/// Document ids run from `0` to `max_doc() - 1`; some of them may be
/// deleted. Readers never observe later changes to the index.
pub trait IndexReader: Send + Sync + Debug {
    /// Identity of this reader, used to key caches.
    fn reader_id(&self) -> Uuid;

    /// One greater than the largest document id.
    fn max_doc(&self) -> u32;

    /// Number of live documents.
    fn num_docs(&self) -> u32;

    /// Whether any document is deleted.
    fn has_deletions(&self) -> bool {
        self.num_docs() != self.max_doc()
    }

    /// Whether `doc` is deleted.
    fn is_deleted(&self, doc: u32) -> bool;

    /// All deletions as a bit set of length `max_doc()`, if there are any.
    fn deleted_docs(&self) -> Option<Arc<BitVec>>;

    /// Stored fields of a live document.
    fn document(&self, doc: u32) -> Result<Document>;

    /// Number of documents containing `term`, deleted ones included.
    fn doc_freq(&self, term: &Term) -> u32;

    /// Live documents containing `term`, or `None` if the term is unknown.
    fn term_docs(&self, term: &Term) -> Result<Option<Postings>>;

    /// Every term of `field` in sorted order, with its document frequency.
    fn terms(&self, field: &str) -> Vec<(String, u32)>;

    /// One encoded norm per document for `field`, if it is indexed.
    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>>;

    /// Names of all fields, sorted.
    fn field_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postings_append_rebased() {
        let mut a = Postings::new();
        a.push(1, 2);
        let mut b = Postings::new();
        b.push(0, 1);
        b.push(4, 3);
        a.append_rebased(&b, 10);

        assert_eq!(a.docs(), &[1, 10, 14]);
        assert_eq!(a.freqs(), &[2, 1, 3]);
        assert_eq!(a.iter().last(), Some((14, 3)));
    }
}
