//! Sorting hits by field values.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexReader;
use crate::search::field_cache::{FieldCache, StringIndex};

/// What a [`SortField`] orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    /// Relevance, highest first.
    Score,
    /// Document id, lowest first.
    Doc,
    /// The field's term parsed as an integer.
    Int,
    /// The field's term parsed as a float.
    Float,
    /// The field's term in lexicographic order; documents without a term
    /// come first.
    String,
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    pub field: Option<String>,
    pub sort_type: SortType,
    pub reverse: bool,
}

impl SortField {
    /// Order by a field's values.
    pub fn new(field: impl Into<String>, sort_type: SortType) -> Self {
        SortField {
            field: Some(field.into()),
            sort_type,
            reverse: false,
        }
    }

    /// Order by relevance.
    pub fn score() -> Self {
        SortField {
            field: None,
            sort_type: SortType::Score,
            reverse: false,
        }
    }

    /// Order by document id.
    pub fn doc() -> Self {
        SortField {
            field: None,
            sort_type: SortType::Doc,
            reverse: false,
        }
    }

    /// The opposite order.
    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }
}

/// An ordered list of criteria; later ones break ties of earlier ones and
/// the document id breaks any remaining tie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub fields: Vec<SortField>,
}

impl Sort {
    pub fn new(fields: Vec<SortField>) -> Self {
        Sort { fields }
    }

    pub fn by(field: SortField) -> Self {
        Sort { fields: vec![field] }
    }

    /// Highest score first.
    pub fn relevance() -> Self {
        Self::by(SortField::score())
    }

    /// Lowest document id first.
    pub fn index_order() -> Self {
        Self::by(SortField::doc())
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::relevance()
    }
}

/// The value a hit was sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortValue {
    Score(f32),
    Doc(u32),
    Int(i32),
    Float(f32),
    String(Option<String>),
}

#[derive(Debug, Clone)]
enum Source {
    Score,
    Doc,
    Int(Arc<[i32]>),
    Float(Arc<[f32]>),
    String(Arc<StringIndex>),
}

/// Compares hits of one reader under a [`Sort`].
#[derive(Debug, Clone)]
pub(crate) struct HitComparator {
    criteria: Vec<(Source, bool)>,
}

impl HitComparator {
    pub(crate) fn new(sort: &Sort, reader: &dyn IndexReader) -> Result<Self> {
        let cache = FieldCache::default_cache();
        let mut criteria = Vec::with_capacity(sort.fields.len());
        for field in &sort.fields {
            let name = field.field.as_deref().unwrap_or_default();
            let source = match field.sort_type {
                SortType::Score => Source::Score,
                SortType::Doc => Source::Doc,
                SortType::Int => Source::Int(cache.get_ints(reader, name)?),
                SortType::Float => Source::Float(cache.get_floats(reader, name)?),
                SortType::String => Source::String(cache.get_string_index(reader, name)?),
            };
            criteria.push((source, field.reverse));
        }
        Ok(HitComparator { criteria })
    }

    /// `Less` when `a` ranks before `b`.
    pub(crate) fn compare(&self, a: (u32, f32), b: (u32, f32)) -> Ordering {
        let (da, db) = (a.0 as usize, b.0 as usize);
        for (source, reverse) in &self.criteria {
            let ord = match source {
                Source::Score => b.1.total_cmp(&a.1),
                Source::Doc => a.0.cmp(&b.0),
                Source::Int(v) => v[da].cmp(&v[db]),
                Source::Float(v) => v[da].total_cmp(&v[db]),
                Source::String(index) => index.order[da].cmp(&index.order[db]),
            };
            let ord = if *reverse { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.0.cmp(&b.0)
    }

    pub(crate) fn values(&self, doc: u32, score: f32) -> Vec<SortValue> {
        let d = doc as usize;
        self.criteria
            .iter()
            .map(|(source, _)| match source {
                Source::Score => SortValue::Score(score),
                Source::Doc => SortValue::Doc(doc),
                Source::Int(v) => SortValue::Int(v[d]),
                Source::Float(v) => SortValue::Float(v[d]),
                Source::String(index) => SortValue::String(index.lookup[index.order[d] as usize].clone()),
            })
            .collect()
    }
}
