//! Disjunctions scored by their best matching sub-query.
//!
//! A document matching several disjuncts scores the maximum of their scores
//! plus `tie_breaker` times the scores of the others. With a tie breaker of
//! zero this is a pure maximum; with one it is a plain sum. Searching one
//! term over several fields is the usual case: a match in two fields should
//! rank above a match in one, but not at double the score.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use crate::index::IndexReader;
use crate::query::Query;
use crate::query::scorer::{NO_MORE_DOCS, Scorer, ScorerQueue};
use crate::query::weight::Weight;
use crate::search::explanation::Explanation;
use crate::search::IndexSearcher;

/// The union of several queries, scored by the best of them.
#[derive(Debug, Clone)]
pub struct DisjunctionMaxQuery {
    disjuncts: Vec<Arc<Query>>,
    tie_breaker: f32,
    boost: f32,
}

impl DisjunctionMaxQuery {
    /// An empty disjunction with the given tie breaker multiplier.
    pub fn new(tie_breaker: f32) -> Self {
        DisjunctionMaxQuery {
            disjuncts: Vec::new(),
            tie_breaker,
            boost: 1.0,
        }
    }

    /// A disjunction of `disjuncts`.
    pub fn with_disjuncts<I, Q>(disjuncts: I, tie_breaker: f32) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Arc<Query>>,
    {
        DisjunctionMaxQuery {
            disjuncts: disjuncts.into_iter().map(Into::into).collect(),
            ..Self::new(tie_breaker)
        }
    }

    /// Append a disjunct.
    pub fn add(&mut self, query: impl Into<Arc<Query>>) {
        self.disjuncts.push(query.into());
    }

    /// Set the boost factor.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn disjuncts(&self) -> &[Arc<Query>] {
        &self.disjuncts
    }

    pub fn tie_breaker(&self) -> f32 {
        self.tie_breaker
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub(crate) fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub(crate) fn rewrite(&self, this: &Arc<Query>, reader: &dyn IndexReader) -> Result<Arc<Query>> {
        if let [only] = self.disjuncts.as_slice() {
            let rewritten = only.rewrite(reader)?;
            if self.boost == 1.0 {
                return Ok(rewritten);
            }
            let boost = self.boost * rewritten.boost();
            return Ok(Arc::new((*rewritten).clone().with_boost(boost)));
        }

        let mut clone: Option<DisjunctionMaxQuery> = None;
        for (i, disjunct) in self.disjuncts.iter().enumerate() {
            let rewritten = disjunct.rewrite(reader)?;
            if !Arc::ptr_eq(&rewritten, disjunct) {
                clone.get_or_insert_with(|| self.clone()).disjuncts[i] = rewritten;
            }
        }
        Ok(match clone {
            Some(query) => Arc::new(Query::DisjunctionMax(query)),
            None => Arc::clone(this),
        })
    }
}

impl PartialEq for DisjunctionMaxQuery {
    fn eq(&self, other: &Self) -> bool {
        self.disjuncts == other.disjuncts
            && self.tie_breaker.to_bits() == other.tie_breaker.to_bits()
            && self.boost.to_bits() == other.boost.to_bits()
    }
}

impl Eq for DisjunctionMaxQuery {}

impl Hash for DisjunctionMaxQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.disjuncts.hash(state);
        self.tie_breaker.to_bits().hash(state);
        self.boost.to_bits().hash(state);
    }
}

impl fmt::Display for DisjunctionMaxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, disjunct) in self.disjuncts.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match disjunct.as_ref() {
                Query::Boolean(sub) => write!(f, "({sub})")?,
                other => write!(f, "{other}")?,
            }
        }
        f.write_str(")")?;
        if self.tie_breaker != 0.0 {
            write!(f, "~{}", self.tie_breaker)?;
        }
        super::write_boost(f, self.boost)
    }
}

/// Compiled form of a [`DisjunctionMaxQuery`].
#[derive(Debug, Clone)]
pub struct DisjunctionMaxWeight {
    query: Arc<Query>,
    weights: Vec<Weight>,
    tie_breaker: f32,
    boost: f32,
}

impl DisjunctionMaxWeight {
    pub(crate) fn new(
        query: &Arc<Query>,
        dis_max: &DisjunctionMaxQuery,
        searcher: &IndexSearcher,
    ) -> Result<Self> {
        let weights = dis_max
            .disjuncts
            .iter()
            .map(|d| d.create_weight(searcher))
            .collect::<Result<Vec<_>>>()?;
        Ok(DisjunctionMaxWeight {
            query: Arc::clone(query),
            weights,
            tie_breaker: dis_max.tie_breaker,
            boost: dis_max.boost,
        })
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn value(&self) -> f32 {
        self.boost
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        for weight in &mut self.weights {
            let s = weight.sum_of_squared_weights();
            sum += s;
            max = max.max(s);
        }
        ((sum - max) * self.tie_breaker * self.tie_breaker + max) * self.boost * self.boost
    }

    pub fn normalize(&mut self, norm: f32) {
        let norm = norm * self.boost;
        for weight in &mut self.weights {
            weight.normalize(norm);
        }
    }

    /// `None` as soon as any disjunct has no scorer for `reader`.
    pub fn scorer(&self, reader: &dyn IndexReader) -> Result<Option<DisjunctionMaxScorer>> {
        if self.weights.is_empty() {
            return Ok(None);
        }
        let mut scorers = Vec::with_capacity(self.weights.len());
        for weight in &self.weights {
            match weight.scorer(reader)? {
                Some(scorer) => scorers.push(scorer),
                None => return Ok(None),
            }
        }
        Ok(Some(DisjunctionMaxScorer::new(scorers, self.tie_breaker)))
    }

    pub fn explain(&self, reader: &dyn IndexReader, doc: u32) -> Result<Explanation> {
        if let [only] = self.weights.as_slice() {
            return only.explain(reader, doc);
        }
        let description = if self.tie_breaker == 0.0 {
            "max of:".to_string()
        } else {
            format!("max plus {} times others of:", self.tie_breaker)
        };
        let mut result = Explanation::new(0.0, description);
        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        let mut matched = false;
        for weight in &self.weights {
            let expl = weight.explain(reader, doc)?;
            if expl.is_match() {
                matched = true;
                sum += expl.value;
                max = max.max(expl.value);
                result.add_detail(expl);
            }
        }
        result.matched = Some(matched);
        result.value = max + (sum - max) * self.tie_breaker;
        Ok(result)
    }
}

/// Scores the union of several scorers by `max + (sum − max) · tie`.
#[derive(Debug)]
pub struct DisjunctionMaxScorer {
    queue: ScorerQueue,
    tie_breaker: f32,
    doc: Option<u32>,
    score: f32,
}

impl DisjunctionMaxScorer {
    pub fn new(scorers: Vec<Scorer>, tie_breaker: f32) -> Self {
        DisjunctionMaxScorer {
            queue: ScorerQueue::new(scorers),
            tie_breaker,
            doc: None,
            score: 0.0,
        }
    }

    fn settle(&mut self) -> bool {
        let Some(doc) = self.queue.top_doc() else {
            self.doc = Some(NO_MORE_DOCS);
            return false;
        };
        let (max, sum) = self
            .queue
            .at(doc)
            .map(Scorer::score)
            .fold((0.0f32, 0.0f32), |(max, sum), s| (max.max(s), sum + s));
        self.doc = Some(doc);
        self.score = max + (sum - max) * self.tie_breaker;
        true
    }

    pub fn next(&mut self) -> bool {
        match self.doc {
            Some(NO_MORE_DOCS) => false,
            None => self.settle(),
            Some(doc) => {
                self.queue.advance_past(doc);
                self.settle()
            }
        }
    }

    pub fn skip_to(&mut self, target: u32) -> bool {
        match self.doc {
            Some(NO_MORE_DOCS) => false,
            Some(doc) if doc >= target => true,
            _ => {
                self.queue.skip_below(target);
                self.settle()
            }
        }
    }

    pub fn doc(&self) -> u32 {
        self.doc.unwrap_or(NO_MORE_DOCS)
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::document::Document;
    use crate::index::{DirectoryReader, IndexWriter, IndexWriterConfig};
    use crate::query::term::TermScorer;
    use crate::search::similarity::DefaultSimilarity;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn searcher(bodies: &[&str]) -> IndexSearcher {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let config = IndexWriterConfig::default().analyzer(Arc::new(WhitespaceAnalyzer::new()));
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for body in bodies {
            writer.add_document(Document::builder().add_text("body", *body).build()).unwrap();
        }
        writer.close().unwrap();
        IndexSearcher::from_reader(DirectoryReader::open(storage).unwrap())
    }

    fn constant(docs: &[u32], value: f32) -> Scorer {
        let freqs = docs.iter().map(|_| 1).collect();
        Scorer::Term(TermScorer::new(docs.to_vec(), freqs, None, value, Arc::new(DefaultSimilarity)))
    }

    #[test]
    fn test_max_plus_tie() {
        let mut scorer = DisjunctionMaxScorer::new(vec![constant(&[0, 2], 0.8), constant(&[2, 5], 0.3)], 0.1);
        let mut hits = Vec::new();
        while scorer.next() {
            hits.push((scorer.doc(), scorer.score()));
        }
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], (0, 0.8));
        assert_eq!(hits[1].0, 2);
        assert!((hits[1].1 - 0.83).abs() < 1e-6);
        assert_eq!(hits[2], (5, 0.3));
    }

    #[test]
    fn test_skip_to() {
        let mut scorer = DisjunctionMaxScorer::new(vec![constant(&[1, 6], 1.0), constant(&[3, 9], 1.0)], 0.0);
        assert!(scorer.skip_to(4));
        assert_eq!(scorer.doc(), 6);
        assert!(scorer.skip_to(6));
        assert_eq!(scorer.doc(), 6);
        assert!(scorer.next());
        assert_eq!(scorer.doc(), 9);
        assert!(!scorer.next());
    }

    #[test]
    fn test_display_and_equality() {
        let a = DisjunctionMaxQuery::with_disjuncts([Query::term("title", "x"), Query::term("body", "x")], 0.5);
        assert_eq!(a.to_string(), "(title:x | body:x)~0.5");
        let reversed = DisjunctionMaxQuery::with_disjuncts([Query::term("body", "x"), Query::term("title", "x")], 0.5);
        assert_ne!(a, reversed);
        assert_eq!(a, a.clone());
        assert_ne!(a, a.clone().with_boost(2.0));
    }

    #[test]
    fn test_weight_normalization() {
        let searcher = searcher(&["a b", "a", "a c", "d"]);
        let a = Arc::new(Query::term("body", "a"));
        let b = Arc::new(Query::term("body", "b"));
        let squared = |q: &Arc<Query>| q.create_weight(&searcher).unwrap().sum_of_squared_weights();
        let (sa, sb) = (squared(&a), squared(&b));
        assert!(sb > sa);

        let query = Arc::new(Query::DisjunctionMax(
            DisjunctionMaxQuery::with_disjuncts([Arc::clone(&a), Arc::clone(&b)], 0.5).with_boost(2.0),
        ));
        let Weight::DisjunctionMax(mut weight) = query.create_weight(&searcher).unwrap() else {
            panic!("expected a disjunction weight");
        };
        let expected = (sa * 0.25 + sb) * 4.0;
        assert!((weight.sum_of_squared_weights() - expected).abs() < 1e-5);

        // Children see the norm scaled by the disjunction's boost.
        weight.normalize(0.1);
        for (child, q) in weight.weights.iter().zip([&a, &b]) {
            let mut alone = q.create_weight(&searcher).unwrap();
            alone.sum_of_squared_weights();
            alone.normalize(0.2);
            assert!(child.value() > 0.0);
            assert!((child.value() - alone.value()).abs() < 1e-6);
        }
    }
}
