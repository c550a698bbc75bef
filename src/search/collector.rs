//! Collectors gathering the hits of a search.

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::sort::{HitComparator, SortField, SortValue};
use crate::util::priority_queue::PriorityQueue;

/// Receives every matching document of a search.
pub trait Collector: Send + Debug {
    /// Collect a document hit.
    fn collect(&mut self, doc: u32, score: f32) -> Result<()>;
}

/// A document id with its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    pub doc: u32,
    pub score: f32,
}

/// The best hits of a search, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// Number of documents with a positive score.
    pub total_hits: usize,
    pub score_docs: Vec<ScoreDoc>,
    /// Highest score seen, or zero without hits.
    pub max_score: f32,
}

impl TopDocs {
    pub fn is_empty(&self) -> bool {
        self.score_docs.is_empty()
    }

    /// Document ids in rank order.
    pub fn docs(&self) -> Vec<u32> {
        self.score_docs.iter().map(|sd| sd.doc).collect()
    }
}

/// The lower score is less; among equal scores the higher document id.
fn hit_less(a: &ScoreDoc, b: &ScoreDoc) -> bool {
    if a.score == b.score {
        a.doc > b.doc
    } else {
        a.score < b.score
    }
}

/// Keeps the `n` highest scoring documents.
#[derive(Debug)]
pub struct TopDocsCollector {
    queue: PriorityQueue<ScoreDoc>,
    total_hits: usize,
    max_score: f32,
}

impl TopDocsCollector {
    pub fn new(n: usize) -> Self {
        TopDocsCollector {
            queue: PriorityQueue::new(n, hit_less as fn(&ScoreDoc, &ScoreDoc) -> bool),
            total_hits: 0,
            max_score: 0.0,
        }
    }

    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// The collected hits, best first.
    pub fn top_docs(self) -> TopDocs {
        let mut score_docs = self.queue.into_sorted_vec();
        score_docs.reverse();
        TopDocs {
            total_hits: self.total_hits,
            score_docs,
            max_score: self.max_score,
        }
    }
}

impl Collector for TopDocsCollector {
    fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
        if score > 0.0 {
            self.total_hits += 1;
            self.max_score = self.max_score.max(score);
            self.queue.insert_with_overflow(ScoreDoc { doc, score });
        }
        Ok(())
    }
}

/// A hit with the values it was sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDoc {
    pub doc: u32,
    pub score: f32,
    pub fields: Vec<SortValue>,
}

/// The first hits of a sorted search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFieldDocs {
    pub total_hits: usize,
    pub score_docs: Vec<FieldDoc>,
    pub fields: Vec<SortField>,
    pub max_score: f32,
}

type FieldLess = Box<dyn Fn(&ScoreDoc, &ScoreDoc) -> bool + Send>;

/// Keeps the first `n` documents under a sort order.
pub struct TopFieldCollector {
    queue: PriorityQueue<ScoreDoc, FieldLess>,
    comparator: HitComparator,
    fields: Vec<SortField>,
    total_hits: usize,
    max_score: f32,
}

impl TopFieldCollector {
    pub(crate) fn new(n: usize, comparator: HitComparator, fields: Vec<SortField>) -> Self {
        let order = comparator.clone();
        let less: FieldLess = Box::new(move |a: &ScoreDoc, b: &ScoreDoc| {
            order.compare((a.doc, a.score), (b.doc, b.score)) == Ordering::Greater
        });
        TopFieldCollector {
            queue: PriorityQueue::new(n, less),
            comparator,
            fields,
            total_hits: 0,
            max_score: 0.0,
        }
    }

    /// The collected hits in sort order.
    pub fn top_docs(self) -> TopFieldDocs {
        let mut hits = self.queue.into_sorted_vec();
        hits.reverse();
        let score_docs = hits
            .into_iter()
            .map(|sd| FieldDoc {
                doc: sd.doc,
                score: sd.score,
                fields: self.comparator.values(sd.doc, sd.score),
            })
            .collect();
        TopFieldDocs {
            total_hits: self.total_hits,
            score_docs,
            fields: self.fields,
            max_score: self.max_score,
        }
    }
}

impl Debug for TopFieldCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopFieldCollector")
            .field("size", &self.queue.size())
            .field("fields", &self.fields)
            .field("total_hits", &self.total_hits)
            .finish()
    }
}

impl Collector for TopFieldCollector {
    fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
        if score > 0.0 {
            self.total_hits += 1;
            self.max_score = self.max_score.max(score);
            self.queue.insert_with_overflow(ScoreDoc { doc, score });
        }
        Ok(())
    }
}

/// Counts matching documents.
#[derive(Debug, Default)]
pub struct CountCollector {
    count: usize,
}

impl CountCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Collector for CountCollector {
    fn collect(&mut self, _doc: u32, _score: f32) -> Result<()> {
        self.count += 1;
        Ok(())
    }
}

/// Records every hit in collection order.
#[derive(Debug, Default)]
pub struct AllDocsCollector {
    hits: Vec<ScoreDoc>,
}

impl AllDocsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> &[ScoreDoc] {
        &self.hits
    }
}

impl Collector for AllDocsCollector {
    fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
        self.hits.push(ScoreDoc { doc, score });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_docs_collector() {
        let mut collector = TopDocsCollector::new(3);
        for (doc, score) in [(0, 0.5), (1, 0.8), (2, 0.3), (3, 0.0), (4, 0.9), (5, 0.8)] {
            collector.collect(doc, score).unwrap();
        }
        assert_eq!(collector.total_hits(), 5);
        let top = collector.top_docs();
        assert_eq!(top.docs(), vec![4, 1, 5]);
        assert_eq!(top.max_score, 0.9);
    }

    #[test]
    fn test_ties_prefer_lower_doc() {
        let mut collector = TopDocsCollector::new(2);
        for doc in [7, 3, 5, 1] {
            collector.collect(doc, 1.0).unwrap();
        }
        assert_eq!(collector.top_docs().docs(), vec![1, 3]);
    }

    #[test]
    fn test_count_and_all_docs() {
        let mut count = CountCollector::new();
        let mut all = AllDocsCollector::new();
        for doc in 0..4 {
            count.collect(doc, 0.1).unwrap();
            all.collect(doc, 0.1).unwrap();
        }
        assert_eq!(count.count(), 4);
        assert_eq!(all.hits().len(), 4);
    }
}
