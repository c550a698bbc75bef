//! Queries compiled against a searcher.
//!
//! A [`Weight`] is built once per search from a rewritten query. The
//! searcher first collects [`sum_of_squared_weights`](Weight::sum_of_squared_weights)
//! over the whole tree, turns it into a query norm and hands that back down
//! through [`normalize`](Weight::normalize). Only then can scorers be made.

use std::sync::Arc;

use crate::error::Result;
use crate::index::IndexReader;
use crate::query::Query;
use crate::query::boolean::BooleanWeight;
use crate::query::disjunction_max::DisjunctionMaxWeight;
use crate::query::filtered::FilteredWeight;
use crate::query::match_all::MatchAllWeight;
use crate::query::scorer::Scorer;
use crate::query::term::TermWeight;
use crate::query::value_source::ValueSourceWeight;
use crate::search::explanation::Explanation;

/// A query node with its search-time statistics.
#[derive(Debug, Clone)]
pub enum Weight {
    Term(TermWeight),
    Boolean(BooleanWeight),
    DisjunctionMax(DisjunctionMaxWeight),
    Filtered(Box<FilteredWeight>),
    MatchAll(MatchAllWeight),
    ValueSource(ValueSourceWeight),
}

impl Weight {
    /// The query this weight was built from.
    pub fn query(&self) -> &Arc<Query> {
        match self {
            Weight::Term(w) => w.query(),
            Weight::Boolean(w) => w.query(),
            Weight::DisjunctionMax(w) => w.query(),
            Weight::Filtered(w) => w.query(),
            Weight::MatchAll(w) => w.query(),
            Weight::ValueSource(w) => w.query(),
        }
    }

    pub fn value(&self) -> f32 {
        match self {
            Weight::Term(w) => w.value(),
            Weight::Boolean(w) => w.value(),
            Weight::DisjunctionMax(w) => w.value(),
            Weight::Filtered(w) => w.value(),
            Weight::MatchAll(w) => w.value(),
            Weight::ValueSource(w) => w.value(),
        }
    }

    /// This node's contribution to the query norm.
    pub fn sum_of_squared_weights(&mut self) -> f32 {
        match self {
            Weight::Term(w) => w.sum_of_squared_weights(),
            Weight::Boolean(w) => w.sum_of_squared_weights(),
            Weight::DisjunctionMax(w) => w.sum_of_squared_weights(),
            Weight::Filtered(w) => w.sum_of_squared_weights(),
            Weight::MatchAll(w) => w.sum_of_squared_weights(),
            Weight::ValueSource(w) => w.sum_of_squared_weights(),
        }
    }

    /// Apply the query norm.
    pub fn normalize(&mut self, norm: f32) {
        match self {
            Weight::Term(w) => w.normalize(norm),
            Weight::Boolean(w) => w.normalize(norm),
            Weight::DisjunctionMax(w) => w.normalize(norm),
            Weight::Filtered(w) => w.normalize(norm),
            Weight::MatchAll(w) => w.normalize(norm),
            Weight::ValueSource(w) => w.normalize(norm),
        }
    }

    /// A scorer over `reader`, or `None` when nothing can match.
    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<Option<Scorer>> {
        Ok(match self {
            Weight::Term(w) => w.scorer(reader)?.map(Scorer::Term),
            Weight::Boolean(w) => w.scorer(reader)?.map(|s| Scorer::Boolean(Box::new(s))),
            Weight::DisjunctionMax(w) => w.scorer(reader)?.map(|s| Scorer::DisjunctionMax(Box::new(s))),
            Weight::Filtered(w) => w.scorer(reader)?.map(|s| Scorer::Filtered(Box::new(s))),
            Weight::MatchAll(w) => Some(Scorer::MatchAll(w.scorer(reader))),
            Weight::ValueSource(w) => Some(Scorer::ValueSource(w.scorer(reader)?)),
        })
    }

    /// How `doc` is scored.
    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        match self {
            Weight::Term(w) => w.explain(reader, doc),
            Weight::Boolean(w) => w.explain(reader, doc),
            Weight::DisjunctionMax(w) => w.explain(reader, doc),
            Weight::Filtered(w) => w.explain(reader, doc),
            Weight::MatchAll(w) => Ok(w.explain(reader, doc)),
            Weight::ValueSource(w) => w.explain(reader, doc),
        }
    }
}
