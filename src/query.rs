//! Query trees and their compilation into scorers.
//!
//! A [`Query`] is an immutable tree; children are shared through `Arc`, so
//! rewriting a tree reuses every subtree that did not change. Searching a
//! query goes through three stages:
//!
//! 1. [`Query::rewrite`] expands multi-term queries (fuzzy, range) into
//!    primitive ones against a reader's term dictionary.
//! 2. [`Query::create_weight`] compiles the rewritten tree into a [`Weight`]
//!    carrying corpus statistics, which the searcher normalizes.
//! 3. [`Weight::scorer`] produces a [`Scorer`] iterating the matching
//!    documents of one reader.

pub mod boolean;
pub mod disjunction_max;
pub mod filtered;
pub mod fuzzy;
pub mod match_all;
pub mod range;
pub mod scorer;
pub mod term;
pub mod value_source;
pub mod weight;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{PilumError, Result};
use crate::index::{IndexReader, Term};
use crate::search::IndexSearcher;

pub use boolean::{BooleanClause, BooleanQuery, BooleanScorer, BooleanWeight, Occur};
pub use disjunction_max::{DisjunctionMaxQuery, DisjunctionMaxScorer, DisjunctionMaxWeight};
pub use filtered::{FilteredQuery, FilteredScorer, FilteredWeight};
pub use fuzzy::FuzzyQuery;
pub use match_all::{MatchAllDocsQuery, MatchAllWeight};
pub use range::RangeQuery;
pub use scorer::{NO_MORE_DOCS, Scorer};
pub use term::{TermQuery, TermScorer, TermWeight};
pub use value_source::{ValueSourceQuery, ValueSourceWeight};
pub use weight::Weight;

/// Most clauses a [`BooleanQuery`] may hold.
pub const MAX_CLAUSE_COUNT: usize = 1024;

/// A node of a query tree.
///
/// Float parameters compare by bit pattern, the same way they hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Term(TermQuery),
    Boolean(BooleanQuery),
    DisjunctionMax(DisjunctionMaxQuery),
    Filtered(FilteredQuery),
    Fuzzy(FuzzyQuery),
    Range(RangeQuery),
    MatchAll(MatchAllDocsQuery),
    ValueSource(ValueSourceQuery),
}

impl Query {
    /// Shorthand for a [`TermQuery`].
    pub fn term<F: Into<String>, T: Into<String>>(field: F, text: T) -> Query {
        Query::Term(TermQuery::new(Term::new(field, text)))
    }

    /// Boost factor of this node.
    pub fn boost(&self) -> f32 {
        match self {
            Query::Term(q) => q.boost(),
            Query::Boolean(q) => q.boost(),
            Query::DisjunctionMax(q) => q.boost(),
            Query::Filtered(q) => q.boost(),
            Query::Fuzzy(q) => q.boost(),
            Query::Range(q) => q.boost(),
            Query::MatchAll(q) => q.boost(),
            Query::ValueSource(q) => q.boost(),
        }
    }

    /// This node with a different boost.
    pub fn with_boost(mut self, boost: f32) -> Query {
        match &mut self {
            Query::Term(q) => q.set_boost(boost),
            Query::Boolean(q) => q.set_boost(boost),
            Query::DisjunctionMax(q) => q.set_boost(boost),
            Query::Filtered(q) => q.set_boost(boost),
            Query::Fuzzy(q) => q.set_boost(boost),
            Query::Range(q) => q.set_boost(boost),
            Query::MatchAll(q) => q.set_boost(boost),
            Query::ValueSource(q) => q.set_boost(boost),
        }
        self
    }

    /// Rewrite one step towards primitive queries.
    ///
    /// Returns `self` itself (the same `Arc`) when nothing changed, so
    /// callers detect a fixpoint with [`Arc::ptr_eq`].
    pub fn rewrite(self: &Arc<Self>, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        match self.as_ref() {
            Query::Boolean(q) => q.rewrite(self, reader),
            Query::DisjunctionMax(q) => q.rewrite(self, reader),
            Query::Filtered(q) => q.rewrite(self, reader),
            Query::Fuzzy(q) => q.rewrite(reader),
            Query::Range(q) => q.rewrite(reader),
            Query::Term(_) | Query::MatchAll(_) | Query::ValueSource(_) => Ok(Arc::clone(self)),
        }
    }

    /// Compile a rewritten query for `searcher`.
    pub fn create_weight(self: &Arc<Self>, searcher: &IndexSearcher) -> Result<Weight> {
        Ok(match self.as_ref() {
            Query::Term(q) => Weight::Term(TermWeight::new(self, q, searcher)),
            Query::Boolean(q) => Weight::Boolean(BooleanWeight::new(self, q, searcher)?),
            Query::DisjunctionMax(q) => Weight::DisjunctionMax(DisjunctionMaxWeight::new(self, q, searcher)?),
            Query::Filtered(q) => Weight::Filtered(Box::new(FilteredWeight::new(self, q, searcher)?)),
            Query::MatchAll(q) => Weight::MatchAll(MatchAllWeight::new(self, q)),
            Query::ValueSource(q) => Weight::ValueSource(ValueSourceWeight::new(self, q)),
            Query::Fuzzy(_) | Query::Range(_) => {
                return Err(PilumError::unsupported(format!("{self} must be rewritten before searching")));
            }
        })
    }
}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Query::Term(q) => q.hash(state),
            Query::Boolean(q) => q.hash(state),
            Query::DisjunctionMax(q) => q.hash(state),
            Query::Filtered(q) => q.hash(state),
            Query::Fuzzy(q) => q.hash(state),
            Query::Range(q) => q.hash(state),
            Query::MatchAll(q) => q.hash(state),
            Query::ValueSource(q) => q.hash(state),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(q) => q.fmt(f),
            Query::Boolean(q) => q.fmt(f),
            Query::DisjunctionMax(q) => q.fmt(f),
            Query::Filtered(q) => q.fmt(f),
            Query::Fuzzy(q) => q.fmt(f),
            Query::Range(q) => q.fmt(f),
            Query::MatchAll(q) => q.fmt(f),
            Query::ValueSource(q) => q.fmt(f),
        }
    }
}

macro_rules! impl_from_query {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Query {
                fn from(query: $ty) -> Self {
                    Query::$variant(query)
                }
            }

            impl From<$ty> for Arc<Query> {
                fn from(query: $ty) -> Self {
                    Arc::new(Query::$variant(query))
                }
            }
        )*
    };
}

impl_from_query!(
    Term(TermQuery),
    Boolean(BooleanQuery),
    DisjunctionMax(DisjunctionMaxQuery),
    Filtered(FilteredQuery),
    Fuzzy(FuzzyQuery),
    Range(RangeQuery),
    MatchAll(MatchAllDocsQuery),
    ValueSource(ValueSourceQuery),
);

/// Append `^boost` unless the boost is one.
pub(crate) fn write_boost(f: &mut fmt::Formatter<'_>, boost: f32) -> fmt::Result {
    if boost != 1.0 { write!(f, "^{boost}") } else { Ok(()) }
}
