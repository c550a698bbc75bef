//! Fuzzy term matching by edit distance.
//!
//! A [`FuzzyQuery`] is expanded against the term dictionary when rewritten.
//! Each term of the field sharing the query term's first `prefix_length`
//! characters is compared to the query term, and its similarity is
//!
//! ```text
//! 1 - distance / (prefix_length + min(len(rest), len(candidate rest)))
//! ```
//!
//! where `distance` is the Levenshtein distance of the parts after the
//! prefix. Terms with a similarity strictly above `min_similarity` become
//! optional clauses of a coord-free boolean query, boosted by how far above
//! the minimum they are. At most [`MAX_CLAUSE_COUNT`] of the best terms are
//! kept.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::trace;

use crate::error::{PilumError, Result};
use crate::index::{IndexReader, Term};
use crate::query::boolean::{BooleanQuery, Occur};
use crate::query::term::TermQuery;
use crate::query::{MAX_CLAUSE_COUNT, Query};
use crate::util::levenshtein::bounded_distance;
use crate::util::priority_queue::PriorityQueue;

/// Default minimum similarity.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

/// Terms similar to a given term.
#[derive(Debug, Clone)]
pub struct FuzzyQuery {
    term: Term,
    min_similarity: f32,
    prefix_length: usize,
    boost: f32,
}

impl FuzzyQuery {
    /// Terms with a similarity above [`DEFAULT_MIN_SIMILARITY`] and no
    /// required prefix.
    pub fn new(term: Term) -> Self {
        FuzzyQuery {
            term,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            prefix_length: 0,
            boost: 1.0,
        }
    }

    /// Terms with a similarity above `min_similarity` that share the first
    /// `prefix_length` characters with `term`.
    ///
    /// `min_similarity` must lie in `[0, 1)`.
    pub fn with_options(term: Term, min_similarity: f32, prefix_length: usize) -> Result<Self> {
        if !(0.0..1.0).contains(&min_similarity) {
            return Err(PilumError::invalid_argument(format!(
                "min_similarity must be in [0, 1), got {min_similarity}"
            )));
        }
        Ok(FuzzyQuery {
            term,
            min_similarity,
            prefix_length,
            boost: 1.0,
        })
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub(crate) fn rewrite(&self, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        let matcher = FuzzyMatcher::new(self.term.text(), self.min_similarity, self.prefix_length);
        let mut queue = PriorityQueue::new(MAX_CLAUSE_COUNT, score_term_less as fn(&ScoreTerm, &ScoreTerm) -> bool);
        for (text, _) in reader.terms(self.term.field()) {
            if let Some(score) = matcher.difference(&text) {
                queue.insert_with_overflow(ScoreTerm {
                    term: self.term.with_text(text),
                    score,
                });
            }
        }
        trace!(query = %self, expansions = queue.size(), "rewrote fuzzy query");

        let mut query = BooleanQuery::with_coord_disabled();
        while let Some(st) = queue.pop() {
            query.add(TermQuery::new(st.term).with_boost(self.boost * st.score), Occur::Should)?;
        }
        Ok(Arc::new(Query::Boolean(query)))
    }
}

impl PartialEq for FuzzyQuery {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
            && self.prefix_length == other.prefix_length
            && self.min_similarity.to_bits() == other.min_similarity.to_bits()
            && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for FuzzyQuery {}

impl Hash for FuzzyQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.term.hash(state);
        self.min_similarity.to_bits().hash(state);
        self.prefix_length.hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for FuzzyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.term, self.min_similarity)?;
        super::write_boost(f, self.boost)
    }
}

#[derive(Debug)]
struct ScoreTerm {
    term: Term,
    score: f32,
}

/// Lower scores first; among equal scores the greater term is less, so the
/// smaller term survives eviction.
fn score_term_less(a: &ScoreTerm, b: &ScoreTerm) -> bool {
    if a.score == b.score {
        a.term > b.term
    } else {
        a.score < b.score
    }
}

/// Similarity of candidate terms to one query term.
#[derive(Debug, Clone)]
pub(crate) struct FuzzyMatcher {
    prefix: String,
    text: Vec<char>,
    prefix_len: usize,
    min_similarity: f32,
    scale: f32,
}

impl FuzzyMatcher {
    pub(crate) fn new(term_text: &str, min_similarity: f32, prefix_length: usize) -> Self {
        let chars: Vec<char> = term_text.chars().collect();
        let prefix_len = prefix_length.min(chars.len());
        FuzzyMatcher {
            prefix: chars[..prefix_len].iter().collect(),
            text: chars[prefix_len..].to_vec(),
            prefix_len,
            min_similarity,
            scale: 1.0 / (1.0 - min_similarity),
        }
    }

    /// Similarity of `candidate`, or zero when it lacks the prefix.
    pub(crate) fn similarity(&self, candidate: &str) -> f32 {
        let Some(rest) = candidate.strip_prefix(self.prefix.as_str()) else {
            return 0.0;
        };
        let target: Vec<char> = rest.chars().collect();
        let (n, m) = (self.text.len(), target.len());
        let prefix = self.prefix_len as f32;
        if n == 0 || m == 0 {
            let other = if n == 0 { m } else { n };
            return if self.prefix_len == 0 {
                0.0
            } else {
                1.0 - other as f32 / prefix
            };
        }
        let shorter = n.min(m);
        let max_distance = ((1.0 - self.min_similarity) * (shorter + self.prefix_len) as f32) as usize;
        if max_distance < n.abs_diff(m) {
            return 0.0;
        }
        match bounded_distance(&self.text, &target, max_distance) {
            Some(distance) => 1.0 - distance as f32 / (prefix + shorter as f32),
            None => 0.0,
        }
    }

    /// How far above the minimum `candidate` is, scaled to `(0, 1]`, if it
    /// matches at all.
    pub(crate) fn difference(&self, candidate: &str) -> Option<f32> {
        let similarity = self.similarity(candidate);
        (similarity > self.min_similarity).then(|| (similarity - self.min_similarity) * self.scale)
    }
}
