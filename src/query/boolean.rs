//! Boolean combinations of queries.
//!
//! A [`BooleanQuery`] holds clauses that must, should or must not match.
//! With at least one required clause the matching documents are the
//! intersection of the required clauses; otherwise a document must match at
//! least one optional clause (or `minimum_should_match` of them). Prohibited
//! clauses remove documents in both cases, and a query made only of
//! prohibited clauses matches nothing.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PilumError, Result};
use crate::index::IndexReader;
use crate::query::scorer::{NO_MORE_DOCS, Scorer, ScorerQueue};
use crate::query::weight::Weight;
use crate::query::{MAX_CLAUSE_COUNT, Query};
use crate::search::explanation::Explanation;
use crate::search::similarity::Similarity;
use crate::search::IndexSearcher;

/// How a clause takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    /// The clause must match.
    Must,
    /// The clause may match and adds to the score when it does.
    Should,
    /// The clause must not match.
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// A sub-query and how it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BooleanClause {
    pub query: Arc<Query>,
    pub occur: Occur,
}

impl BooleanClause {
    pub fn new(query: Arc<Query>, occur: Occur) -> Self {
        BooleanClause { query, occur }
    }

    pub fn is_prohibited(&self) -> bool {
        self.occur == Occur::MustNot
    }

    pub fn is_required(&self) -> bool {
        self.occur == Occur::Must
    }
}

/// A list of clauses combined with boolean logic.
#[derive(Debug, Clone)]
pub struct BooleanQuery {
    clauses: Vec<BooleanClause>,
    minimum_should_match: usize,
    disable_coord: bool,
    boost: f32,
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanQuery {
    /// An empty query.
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            minimum_should_match: 0,
            disable_coord: false,
            boost: 1.0,
        }
    }

    /// An empty query whose scores are not scaled by the fraction of
    /// matching clauses.
    pub fn with_coord_disabled() -> Self {
        BooleanQuery {
            disable_coord: true,
            ..Self::new()
        }
    }

    /// Add a clause.
    ///
    /// Fails with [`PilumError::TooManyClauses`] once the query holds
    /// [`MAX_CLAUSE_COUNT`] clauses.
    pub fn add(&mut self, query: impl Into<Arc<Query>>, occur: Occur) -> Result<()> {
        if self.clauses.len() >= MAX_CLAUSE_COUNT {
            return Err(PilumError::TooManyClauses(MAX_CLAUSE_COUNT));
        }
        self.clauses.push(BooleanClause::new(query.into(), occur));
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_clause(mut self, query: impl Into<Arc<Query>>, occur: Occur) -> Result<Self> {
        self.add(query, occur)?;
        Ok(self)
    }

    /// Require at least `n` optional clauses to match.
    pub fn with_minimum_should_match(mut self, n: usize) -> Self {
        self.minimum_should_match = n;
        self
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn clauses(&self) -> &[BooleanClause] {
        &self.clauses
    }

    pub fn minimum_should_match(&self) -> usize {
        self.minimum_should_match
    }

    pub fn is_coord_disabled(&self) -> bool {
        self.disable_coord
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub(crate) fn rewrite(&self, this: &Arc<Query>, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        if self.minimum_should_match == 0
            && let [clause] = self.clauses.as_slice()
            && !clause.is_prohibited()
        {
            let rewritten = clause.query.rewrite(reader)?;
            if self.boost == 1.0 {
                return Ok(rewritten);
            }
            let boost = self.boost * rewritten.boost();
            return Ok(Arc::new((*rewritten).clone().with_boost(boost)));
        }

        let mut clone: Option<BooleanQuery> = None;
        for (i, clause) in self.clauses.iter().enumerate() {
            let rewritten = clause.query.rewrite(reader)?;
            if !Arc::ptr_eq(&rewritten, &clause.query) {
                clone.get_or_insert_with(|| self.clone()).clauses[i].query = rewritten;
            }
        }
        Ok(match clone {
            Some(query) => Arc::new(Query::Boolean(query)),
            None => Arc::clone(this),
        })
    }
}

impl PartialEq for BooleanQuery {
    fn eq(&self, other: &Self) -> bool {
        self.clauses == other.clauses
            && self.minimum_should_match == other.minimum_should_match
            && self.disable_coord == other.disable_coord
            && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for BooleanQuery {}

impl Hash for BooleanQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.clauses.hash(state);
        self.minimum_should_match.hash(state);
        self.disable_coord.hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for BooleanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wrap = self.boost != 1.0 || self.minimum_should_match > 0;
        if wrap {
            f.write_str("(")?;
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(clause.occur.prefix())?;
            match clause.query.as_ref() {
                Query::Boolean(sub) => write!(f, "({sub})")?,
                other => write!(f, "{other}")?,
            }
        }
        if wrap {
            f.write_str(")")?;
        }
        if self.minimum_should_match > 0 {
            write!(f, "~{}", self.minimum_should_match)?;
        }
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`BooleanQuery`].
#[derive(Debug, Clone)]
pub struct BooleanWeight {
    query: Arc<Query>,
    similarity: Arc<dyn Similarity>,
    weights: Vec<(Weight, Occur)>,
    boost: f32,
    minimum_should_match: usize,
    disable_coord: bool,
    max_coord: usize,
}

impl BooleanWeight {
    pub(crate) fn new(query: &Arc<Query>, boolean: &BooleanQuery, searcher: &IndexSearcher) -> Result<Self> {
        let weights = boolean
            .clauses
            .iter()
            .map(|c| Ok((c.query.create_weight(searcher)?, c.occur)))
            .collect::<Result<Vec<_>>>()?;
        Ok(BooleanWeight {
            query: Arc::clone(query),
            similarity: Arc::clone(searcher.similarity()),
            max_coord: boolean.clauses.iter().filter(|c| !c.is_prohibited()).count(),
            weights,
            boost: boolean.boost,
            minimum_should_match: boolean.minimum_should_match,
            disable_coord: boolean.disable_coord,
        })
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn value(&self) -> f32 {
        self.boost
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        let mut sum = 0.0;
        for (weight, occur) in &mut self.weights {
            let s = weight.sum_of_squared_weights();
            if *occur != Occur::MustNot {
                sum += s;
            }
        }
        sum * self.boost * self.boost
    }

    pub fn normalize(&mut self, norm: f32) {
        let norm = norm * self.boost;
        for (weight, _) in &mut self.weights {
            weight.normalize(norm);
        }
    }

    fn coord(&self, overlap: usize) -> f32 {
        if self.disable_coord {
            1.0
        } else {
            self.similarity.coord(overlap, self.max_coord)
        }
    }

    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<Option<BooleanScorer>> {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut prohibited = Vec::new();
        for (weight, occur) in &self.weights {
            match (weight.scorer(reader)?, occur) {
                (Some(s), Occur::Must) => required.push(s),
                (Some(s), Occur::Should) => optional.push(s),
                (Some(s), Occur::MustNot) => prohibited.push(s),
                (None, Occur::Must) => return Ok(None),
                (None, _) => {}
            }
        }
        if required.is_empty() && optional.is_empty() {
            return Ok(None);
        }
        let coord = (0..=self.max_coord).map(|k| self.coord(k)).collect();
        Ok(Some(BooleanScorer::new(
            required,
            optional,
            prohibited,
            coord,
            self.minimum_should_match,
        )))
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        let mut sum_expl = Explanation::new(0.0, "sum of:");
        let mut coord = 0;
        let mut sum = 0.0;
        let mut fail = false;
        let mut should_matches = 0;
        for (weight, occur) in &self.weights {
            let expl = weight.explain(reader, doc)?;
            if expl.is_match() {
                if *occur == Occur::MustNot {
                    let desc = format!("match on prohibited clause ({})", weight.query());
                    sum_expl.add_detail(Explanation::new(0.0, desc).detail(expl));
                    fail = true;
                } else {
                    sum += expl.value;
                    coord += 1;
                    sum_expl.add_detail(expl);
                }
                if *occur == Occur::Should {
                    should_matches += 1;
                }
            } else if *occur == Occur::Must {
                let desc = format!("no match on required clause ({})", weight.query());
                sum_expl.add_detail(Explanation::new(0.0, desc).detail(expl));
                fail = true;
            }
        }
        if fail {
            sum_expl.matched = Some(false);
            sum_expl.description = "Failure to meet condition(s) of required/prohibited clause(s)".into();
            return Ok(sum_expl);
        }
        if should_matches < self.minimum_should_match {
            sum_expl.matched = Some(false);
            sum_expl.description = format!(
                "Failure to match minimum number of optional clauses: {}",
                self.minimum_should_match
            );
            return Ok(sum_expl);
        }
        sum_expl.matched = Some(coord > 0);
        sum_expl.value = sum;

        let factor = self.coord(coord);
        if factor == 1.0 {
            return Ok(sum_expl);
        }
        let matched = sum_expl.is_match();
        Ok(Explanation::with_match(matched, sum * factor, "product of:")
            .detail(sum_expl)
            .detail(Explanation::new(factor, format!("coord({coord}/{})", self.max_coord))))
    }
}

#[derive(Debug)]
enum Mode {
    /// Intersection of the required scorers; optional ones only add score.
    Required { required: Vec<Scorer>, optional: Vec<Scorer> },
    /// Union of the optional scorers.
    Union { queue: ScorerQueue },
}

/// Scores a [`BooleanQuery`] over one reader.
#[derive(Debug)]
pub struct BooleanScorer {
    mode: Mode,
    prohibited: Vec<Scorer>,
    coord: Vec<f32>,
    minimum_should_match: usize,
    doc: Option<u32>,
    score: f32,
}

impl BooleanScorer {
    pub(crate) fn new(
        required: Vec<Scorer>,
        optional: Vec<Scorer>,
        prohibited: Vec<Scorer>,
        coord: Vec<f32>,
        minimum_should_match: usize,
    ) -> Self {
        let mode = if required.is_empty() {
            Mode::Union {
                queue: ScorerQueue::new(optional),
            }
        } else {
            Mode::Required { required, optional }
        };
        BooleanScorer {
            mode,
            prohibited,
            coord,
            minimum_should_match,
            doc: None,
            score: 0.0,
        }
    }

    fn is_prohibited(&mut self, doc: u32) -> bool {
        self.prohibited.iter_mut().any(|p| p.skip_to(doc) && p.doc() == doc)
    }

    fn scaled(&self, sum: f32, matches: usize) -> f32 {
        sum * self.coord.get(matches).copied().unwrap_or(1.0)
    }

    /// Find the first match at or after `target`.
    fn seek(&mut self, target: u32) -> bool {
        let found = if matches!(self.mode, Mode::Required { .. }) {
            self.seek_required(target)
        } else {
            self.seek_union(target)
        };
        if !found {
            self.doc = Some(NO_MORE_DOCS);
        }
        found
    }

    fn seek_required(&mut self, mut target: u32) -> bool {
        'outer: loop {
            let Mode::Required { required, optional } = &mut self.mode else {
                return false;
            };
            // Leapfrog until every required scorer agrees on a document.
            let mut doc = target;
            loop {
                let mut agreed = true;
                for scorer in required.iter_mut() {
                    if !scorer.skip_to(doc) {
                        return false;
                    }
                    if scorer.doc() > doc {
                        doc = scorer.doc();
                        agreed = false;
                    }
                }
                if agreed {
                    break;
                }
            }

            let mut sum: f32 = required.iter().map(Scorer::score).sum();
            let mut matches = required.len();
            let mut optional_matches = 0;
            for scorer in optional.iter_mut() {
                if scorer.skip_to(doc) && scorer.doc() == doc {
                    sum += scorer.score();
                    optional_matches += 1;
                }
            }
            matches += optional_matches;

            if optional_matches < self.minimum_should_match || self.is_prohibited(doc) {
                target = doc + 1;
                continue 'outer;
            }
            self.doc = Some(doc);
            self.score = self.scaled(sum, matches);
            return true;
        }
    }

    fn seek_union(&mut self, target: u32) -> bool {
        let required_matches = self.minimum_should_match.max(1);
        loop {
            let Mode::Union { queue } = &mut self.mode else {
                return false;
            };
            queue.skip_below(target);
            let Some(doc) = queue.top_doc() else {
                return false;
            };
            let (sum, matches) = queue.at(doc).fold((0.0f32, 0usize), |(s, n), sc| (s + sc.score(), n + 1));
            if matches >= required_matches && !self.is_prohibited(doc) {
                self.doc = Some(doc);
                self.score = self.scaled(sum, matches);
                return true;
            }
            let Mode::Union { queue } = &mut self.mode else {
                return false;
            };
            queue.advance_past(doc);
        }
    }

    pub fn next(&mut self) -> bool {
        match self.doc {
            Some(NO_MORE_DOCS) => false,
            None => self.seek(0),
            Some(doc) => {
                if let Mode::Union { queue } = &mut self.mode {
                    queue.advance_past(doc);
                }
                self.seek(doc + 1)
            }
        }
    }

    pub fn skip_to(&mut self, target: u32) -> bool {
        match self.doc {
            Some(NO_MORE_DOCS) => false,
            Some(doc) if doc >= target => true,
            _ => self.seek(target),
        }
    }

    pub fn doc(&self) -> u32 {
        self.doc.unwrap_or(NO_MORE_DOCS)
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}
