//! Queries restricted by a filter.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bit_vec::BitVec;

use crate::error::Result;
use crate::index::IndexReader;
use crate::query::Query;
use crate::query::scorer::{NO_MORE_DOCS, Scorer};
use crate::query::weight::Weight;
use crate::search::explanation::Explanation;
use crate::search::filter::Filter;
use crate::search::IndexSearcher;

/// Matches the documents of a query that also pass a filter. Scores are the
/// query's scores times this query's boost.
#[derive(Debug, Clone)]
pub struct FilteredQuery {
    query: Arc<Query>,
    filter: Arc<dyn Filter>,
    boost: f32,
}

impl FilteredQuery {
    pub fn new(query: impl Into<Arc<Query>>, filter: Arc<dyn Filter>) -> Self {
        FilteredQuery {
            query: query.into(),
            filter,
            boost: 1.0,
        }
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub(crate) fn rewrite(&self, this: &Arc<Query>, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        let rewritten = self.query.rewrite(reader)?;
        if Arc::ptr_eq(&rewritten, &self.query) {
            return Ok(Arc::clone(this));
        }
        Ok(Arc::new(Query::Filtered(FilteredQuery {
            query: rewritten,
            ..self.clone()
        })))
    }
}

/// Filters compare by identity.
impl PartialEq for FilteredQuery {
    fn eq(&self, other: &Self) -> bool {
        self.query == other.query
            && Arc::ptr_eq(&self.filter, &other.filter)
            && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for FilteredQuery {}

impl Hash for FilteredQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.query.hash(state);
        (Arc::as_ptr(&self.filter) as *const () as usize).hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for FilteredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filtered({})->{}", self.query, self.filter.description())?;
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`FilteredQuery`].
#[derive(Debug, Clone)]
pub struct FilteredWeight {
    query: Arc<Query>,
    inner: Weight,
    filter: Arc<dyn Filter>,
    boost: f32,
}

impl FilteredWeight {
    pub(crate) fn new(query: &Arc<Query>, filtered: &FilteredQuery, searcher: &IndexSearcher) -> Result<Self> {
        Ok(FilteredWeight {
            query: Arc::clone(query),
            inner: filtered.query.create_weight(searcher)?,
            filter: Arc::clone(&filtered.filter),
            boost: filtered.boost,
        })
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn value(&self) -> f32 {
        self.inner.value() * self.boost
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        self.inner.sum_of_squared_weights() * self.boost * self.boost
    }

    pub fn normalize(&mut self, norm: f32) {
        self.inner.normalize(norm);
    }

    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<Option<FilteredScorer>> {
        let Some(inner) = self.inner.scorer(reader)? else {
            return Ok(None);
        };
        Ok(Some(FilteredScorer {
            inner,
            bits: self.filter.bits(reader)?,
            boost: self.boost,
            exhausted: false,
        }))
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        let mut inner = self.inner.explain(reader, doc)?;
        if self.boost != 1.0 {
            let matched = inner.matched;
            let pre_boost = inner;
            inner = Explanation::new(pre_boost.value * self.boost, "product of:")
                .detail(Explanation::new(self.boost, "boost"))
                .detail(pre_boost);
            inner.matched = matched;
        }
        let bits = self.filter.bits(reader)?;
        if bits.get(doc as usize).unwrap_or(false) {
            return Ok(inner);
        }
        Ok(Explanation::no_match(format!("failure to match filter: {}", self.filter.description())).detail(inner))
    }
}

/// Skips the documents of an inner scorer whose filter bit is clear.
#[derive(Debug)]
pub struct FilteredScorer {
    inner: Scorer,
    bits: Arc<BitVec>,
    boost: f32,
    exhausted: bool,
}

impl FilteredScorer {
    fn passes(&self) -> bool {
        self.bits.get(self.inner.doc() as usize).unwrap_or(false)
    }

    /// Move forward from the inner scorer's current document to the first
    /// one passing the filter.
    fn settle(&mut self, mut found: bool) -> bool {
        while found && !self.passes() {
            found = self.inner.next();
        }
        self.exhausted = !found;
        found
    }

    pub fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let found = self.inner.next();
        self.settle(found)
    }

    pub fn skip_to(&mut self, target: u32) -> bool {
        if self.exhausted {
            return false;
        }
        let found = self.inner.skip_to(target);
        self.settle(found)
    }

    pub fn doc(&self) -> u32 {
        if self.exhausted { NO_MORE_DOCS } else { self.inner.doc() }
    }

    pub fn score(&self) -> f32 {
        self.boost * self.inner.score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::term::TermScorer;
    use crate::search::filter::DocSetFilter;
    use crate::search::similarity::DefaultSimilarity;

    #[test]
    fn test_scorer_skips_filtered_docs() {
        let inner = Scorer::Term(TermScorer::new(
            vec![0, 1, 2, 3, 4],
            vec![1; 5],
            None,
            1.0,
            Arc::new(DefaultSimilarity),
        ));
        let mut bits = BitVec::from_elem(5, false);
        bits.set(1, true);
        bits.set(4, true);
        let mut scorer = FilteredScorer {
            inner,
            bits: Arc::new(bits),
            boost: 2.0,
            exhausted: false,
        };
        assert!(scorer.next());
        assert_eq!((scorer.doc(), scorer.score()), (1, 2.0));
        assert!(scorer.skip_to(2));
        assert_eq!(scorer.doc(), 4);
        assert!(!scorer.next());
        assert_eq!(scorer.doc(), NO_MORE_DOCS);
    }

    #[test]
    fn test_display_and_identity_equality() {
        let filter: Arc<dyn Filter> = Arc::new(DocSetFilter::new([1, 2]));
        let a = FilteredQuery::new(Query::term("f", "x"), Arc::clone(&filter));
        let b = FilteredQuery::new(Query::term("f", "x"), filter);
        let c = FilteredQuery::new(Query::term("f", "x"), Arc::new(DocSetFilter::new([1, 2])));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "filtered(f:x)->docs[1, 2]");
    }
}
