//! Queries scored by per-document field values.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use crate::index::IndexReader;
use crate::query::Query;
use crate::query::scorer::{FunctionScorer, LiveDocs};
use crate::search::explanation::Explanation;
use crate::search::value_source::ValueSource;

/// Matches every live document, scoring it by the value a [`ValueSource`]
/// holds for it.
#[derive(Debug, Clone)]
pub struct ValueSourceQuery {
    source: ValueSource,
    boost: f32,
}

impl ValueSourceQuery {
    pub fn new(source: ValueSource) -> Self {
        ValueSourceQuery { source, boost: 1.0 }
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn source(&self) -> &ValueSource {
        &self.source
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }
}

impl PartialEq for ValueSourceQuery {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for ValueSourceQuery {}

impl Hash for ValueSourceQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for ValueSourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source.description())?;
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`ValueSourceQuery`].
#[derive(Debug, Clone)]
pub struct ValueSourceWeight {
    query: Arc<Query>,
    source: ValueSource,
    boost: f32,
    query_norm: f32,
    query_weight: f32,
}

impl ValueSourceWeight {
    pub(crate) fn new(query: &Arc<Query>, vsq: &ValueSourceQuery) -> Self {
        ValueSourceWeight {
            query: Arc::clone(query),
            source: vsq.source.clone(),
            boost: vsq.boost,
            query_norm: 1.0,
            query_weight: vsq.boost,
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

    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<FunctionScorer> {
        let values = self.source.values(reader)?;
        Ok(FunctionScorer::new(
            LiveDocs::new(reader.max_doc(), reader.deleted_docs()),
            self.query_weight,
            values,
        ))
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        let values = self.source.values(reader)?;
        let score = self.query_weight * values.float_val(doc);
        Ok(
            Explanation::with_match(true, score, format!("{}, product of:", self.query))
                .detail(values.explain(doc))
                .detail(Explanation::new(self.boost, "boost"))
                .detail(Explanation::new(self.query_norm, "queryNorm")),
        )
    }
}
