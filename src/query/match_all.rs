//! The query matching every document.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::index::IndexReader;
use crate::query::Query;
use crate::query::scorer::{ConstantScorer, LiveDocs};
use crate::search::explanation::Explanation;

/// Matches every live document with a constant score.
#[derive(Debug, Clone)]
pub struct MatchAllDocsQuery {
    boost: f32,
}

impl Default for MatchAllDocsQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchAllDocsQuery {
    pub fn new() -> Self {
        MatchAllDocsQuery { boost: 1.0 }
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }
}

impl PartialEq for MatchAllDocsQuery {
    fn eq(&self, other: &Self) -> bool {
        self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for MatchAllDocsQuery {}

impl Hash for MatchAllDocsQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for MatchAllDocsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*:*")?;
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`MatchAllDocsQuery`].
#[derive(Debug, Clone)]
pub struct MatchAllWeight {
    query: Arc<Query>,
    boost: f32,
    query_norm: f32,
    query_weight: f32,
}

impl MatchAllWeight {
    pub(crate) fn new(query: &Arc<Query>, match_all: &MatchAllDocsQuery) -> Self {
        MatchAllWeight {
            query: Arc::clone(query),
            boost: match_all.boost,
            query_norm: 1.0,
            query_weight: match_all.boost,
        }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn value(&self) -> f32 {
        self.query_weight
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        self.query_weight = self.boost;
        self.query_weight * self.query_weight
    }

    pub fn normalize(&mut self, norm: f32) {
        self.query_norm = norm;
        self.query_weight *= norm;
    }

    pub fn scorer(&self, reader: &dyn IndexReader) -> ConstantScorer {
        ConstantScorer::new(LiveDocs::new(reader.max_doc(), reader.deleted_docs()), self.query_weight)
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Explanation {
        let live = doc < reader.max_doc() && !reader.is_deleted(doc);
        let mut expl = Explanation::with_match(live, self.query_weight, "MatchAllDocsQuery, product of:");
        if self.boost != 1.0 {
            expl.add_detail(Explanation::new(self.boost, "boost"));
        }
        expl.detail(Explanation::new(self.query_norm, "queryNorm"))
    }
}
