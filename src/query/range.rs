//! Term range queries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{PilumError, Result};
use crate::index::{IndexReader, Term};
use crate::query::Query;
use crate::query::boolean::{BooleanQuery, Occur};
use crate::query::term::TermQuery;

/// Documents with a term of `field` between two bounds in lexicographic
/// order. Rewrites to one optional clause per term in range, so a wide range
/// over a large dictionary fails with [`PilumError::TooManyClauses`].
#[derive(Debug, Clone)]
pub struct RangeQuery {
    field: String,
    lower: Option<String>,
    upper: Option<String>,
    inclusive: bool,
    boost: f32,
}

impl RangeQuery {
    /// A range with at least one bound.
    pub fn new(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
        inclusive: bool,
    ) -> Result<Self> {
        if lower.is_none() && upper.is_none() {
            return Err(PilumError::invalid_argument("at least one range bound is required"));
        }
        Ok(RangeQuery {
            field: field.into(),
            lower,
            upper,
            inclusive,
            boost: 1.0,
        })
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lower(&self) -> Option<&str> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&str> {
        self.upper.as_deref()
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn contains(&self, text: &str) -> bool {
        let above = self.lower.as_deref().is_none_or(|lower| {
            if self.inclusive { text >= lower } else { text > lower }
        });
        let below = self.upper.as_deref().is_none_or(|upper| {
            if self.inclusive { text <= upper } else { text < upper }
        });
        above && below
    }

    pub(crate) fn rewrite(&self, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        let mut query = BooleanQuery::with_coord_disabled();
        for (text, _) in reader.terms(&self.field) {
            if !self.contains(&text) {
                continue;
            }
            let term = Term::new(self.field.as_str(), text);
            query.add(TermQuery::new(term).with_boost(self.boost), Occur::Should)?;
        }
        Ok(Arc::new(Query::Boolean(query)))
    }
}

impl PartialEq for RangeQuery {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
            && self.lower == other.lower
            && self.upper == other.upper
            && self.inclusive == other.inclusive
            && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for RangeQuery {}

impl Hash for RangeQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field.hash(state);
        self.lower.hash(state);
        self.upper.hash(state);
        self.inclusive.hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for RangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = if self.inclusive { ('[', ']') } else { ('{', '}') };
        write!(
            f,
            "{}:{open}{} TO {}{close}",
            self.field,
            self.lower.as_deref().unwrap_or("*"),
            self.upper.as_deref().unwrap_or("*"),
        )?;
        super::write_boost(f, self.boost)
    }
}
