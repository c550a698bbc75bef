//! Single term queries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use crate::index::{IndexReader, Term};
use crate::query::Query;
use crate::query::scorer::NO_MORE_DOCS;
use crate::search::explanation::Explanation;
use crate::search::similarity::Similarity;
use crate::search::IndexSearcher;

const SCORE_CACHE_SIZE: usize = 32;

/// Documents containing a term.
#[derive(Debug, Clone)]
pub struct TermQuery {
    term: Term,
    boost: f32,
}

impl TermQuery {
    /// Create a query for `term`.
    pub fn new(term: Term) -> Self {
        TermQuery { term, boost: 1.0 }
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// The queried term.
    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Boost factor.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }
}

impl PartialEq for TermQuery {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for TermQuery {}

impl Hash for TermQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.term.hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for TermQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.term.field(), self.term.text())?;
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`TermQuery`].
#[derive(Debug, Clone)]
pub struct TermWeight {
    query: Arc<Query>,
    term: Term,
    boost: f32,
    similarity: Arc<dyn Similarity>,
    doc_freq: u32,
    max_docs: u32,
    idf: f32,
    query_norm: f32,
    query_weight: f32,
    value: f32,
}

impl TermWeight {
    pub(crate) fn new(query: &Arc<Query>, term_query: &TermQuery, searcher: &IndexSearcher) -> Self {
        let similarity = Arc::clone(searcher.similarity());
        let doc_freq = searcher.doc_freq(&term_query.term);
        let max_docs = searcher.max_doc();
        let idf = similarity.idf(doc_freq, max_docs);
        TermWeight {
            query: Arc::clone(query),
            term: term_query.term.clone(),
            boost: term_query.boost,
            similarity,
            doc_freq,
            max_docs,
            idf,
            query_norm: 1.0,
            query_weight: 0.0,
            value: 0.0,
        }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        self.query_weight = self.idf * self.boost;
        self.query_weight * self.query_weight
    }

    pub fn normalize(&mut self, norm: f32) {
        self.query_norm = norm;
        self.query_weight *= norm;
        self.value = self.query_weight * self.idf;
    }

    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<Option<TermScorer>> {
        let Some(postings) = reader.term_docs(&self.term)? else {
            return Ok(None);
        };
        let norms = reader.norms(self.term.field())?;
        let (docs, freqs) = postings.into_parts();
        Ok(Some(TermScorer::new(
            docs,
            freqs,
            norms,
            self.value,
            Arc::clone(&self.similarity),
        )))
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        let idf_expl = Explanation::new(
            self.idf,
            format!("idf(docFreq={}, maxDocs={})", self.doc_freq, self.max_docs),
        );

        let mut query_expl = Explanation::new(0.0, format!("queryWeight({}), product of:", self.query));
        if self.boost != 1.0 {
            query_expl.add_detail(Explanation::new(self.boost, "boost"));
        }
        query_expl.add_detail(idf_expl.clone());
        query_expl.add_detail(Explanation::new(self.query_norm, "queryNorm"));
        query_expl.value = self.boost * self.idf * self.query_norm;

        let freq = match reader.term_docs(&self.term)? {
            Some(postings) => postings
                .docs()
                .binary_search(&doc)
                .map_or(0, |i| postings.freqs()[i]),
            None => 0,
        };
        let tf_expl = Explanation::new(
            self.similarity.tf(freq as f32),
            format!("tf(termFreq({})={freq})", self.term),
        );
        let field = self.term.field();
        let field_norm = match reader.norms(field)? {
            Some(norms) => norms
                .get(doc as usize)
                .map_or(1.0, |&n| self.similarity.decode_norm(n)),
            None => 1.0,
        };

        let field_value = tf_expl.value * self.idf * field_norm;
        let field_expl = Explanation::with_match(
            freq > 0,
            field_value,
            format!("fieldWeight({} in {doc}), product of:", self.term),
        )
        .detail(tf_expl)
        .detail(idf_expl)
        .detail(Explanation::new(field_norm, format!("fieldNorm(field={field}, doc={doc})")));

        if query_expl.value == 1.0 {
            return Ok(field_expl);
        }
        Ok(Explanation::with_match(
            freq > 0,
            query_expl.value * field_value,
            format!("weight({} in {doc}), product of:", self.query),
        )
        .detail(query_expl)
        .detail(field_expl))
    }
}

/// Walks the postings of one term.
#[derive(Debug, Clone)]
pub struct TermScorer {
    docs: Vec<u32>,
    freqs: Vec<u32>,
    pos: Option<usize>,
    norms: Option<Arc<[u8]>>,
    weight_value: f32,
    similarity: Arc<dyn Similarity>,
    score_cache: [f32; SCORE_CACHE_SIZE],
}

impl TermScorer {
    pub fn new(
        docs: Vec<u32>,
        freqs: Vec<u32>,
        norms: Option<Arc<[u8]>>,
        weight_value: f32,
        similarity: Arc<dyn Similarity>,
    ) -> Self {
        let mut score_cache = [0.0; SCORE_CACHE_SIZE];
        for (freq, slot) in score_cache.iter_mut().enumerate() {
            *slot = similarity.tf(freq as f32) * weight_value;
        }
        TermScorer {
            docs,
            freqs,
            pos: None,
            norms,
            weight_value,
            similarity,
            score_cache,
        }
    }

    pub fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| (p + 1).min(self.docs.len()));
        self.pos = Some(next);
        next < self.docs.len()
    }

    pub fn skip_to(&mut self, target: u32) -> bool {
        let from = match self.pos {
            Some(p) if p >= self.docs.len() => return false,
            Some(p) if self.docs[p] >= target => return true,
            Some(p) => p,
            None => 0,
        };
        let found = from + self.docs[from..].partition_point(|&d| d < target);
        self.pos = Some(found);
        found < self.docs.len()
    }

    pub fn doc(&self) -> u32 {
        match self.pos {
            Some(p) if p < self.docs.len() => self.docs[p],
            _ => NO_MORE_DOCS,
        }
    }

    pub fn score(&self) -> f32 {
        let Some(p) = self.pos.filter(|&p| p < self.docs.len()) else {
            return 0.0;
        };
        let freq = self.freqs[p] as usize;
        let raw = if freq < SCORE_CACHE_SIZE {
            self.score_cache[freq]
        } else {
            self.similarity.tf(freq as f32) * self.weight_value
        };
        let norm = self
            .norms
            .as_ref()
            .and_then(|n| n.get(self.docs[p] as usize))
            .map_or(1.0, |&n| self.similarity.decode_norm(n));
        raw * norm
    }
}
