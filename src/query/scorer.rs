//! Per-document scoring iterators.
//!
//! A [`Scorer`] walks the matching documents of one reader in increasing id
//! order. It starts unpositioned; [`next`](Scorer::next) or
//! [`skip_to`](Scorer::skip_to) must succeed before [`doc`](Scorer::doc) and
//! [`score`](Scorer::score) mean anything. Once either returns `false` the
//! scorer is exhausted and stays so.

use std::sync::Arc;

use bit_vec::BitVec;

use crate::query::boolean::BooleanScorer;
use crate::query::disjunction_max::DisjunctionMaxScorer;
use crate::query::filtered::FilteredScorer;
use crate::query::term::TermScorer;
use crate::search::value_source::DocValues;
use crate::util::priority_queue::PriorityQueue;

/// Document id reported by a scorer that has no current document.
pub const NO_MORE_DOCS: u32 = u32::MAX;

/// Iterator over matching documents and their scores.
#[derive(Debug)]
pub enum Scorer {
    Term(TermScorer),
    Boolean(Box<BooleanScorer>),
    DisjunctionMax(Box<DisjunctionMaxScorer>),
    Filtered(Box<FilteredScorer>),
    /// Every live document with the same score.
    MatchAll(ConstantScorer),
    /// Every live document, scored by a per-document function.
    ValueSource(FunctionScorer),
}

impl Scorer {
    /// Advance to the next matching document.
    pub fn next(&mut self) -> bool {
        match self {
            Scorer::Term(s) => s.next(),
            Scorer::Boolean(s) => s.next(),
            Scorer::DisjunctionMax(s) => s.next(),
            Scorer::Filtered(s) => s.next(),
            Scorer::MatchAll(s) => s.docs.next(),
            Scorer::ValueSource(s) => s.docs.next(),
        }
    }

    /// Advance to the first matching document at or after `target`.
    ///
    /// A scorer already positioned at or beyond `target` does not move.
    pub fn skip_to(&mut self, target: u32) -> bool {
        match self {
            Scorer::Term(s) => s.skip_to(target),
            Scorer::Boolean(s) => s.skip_to(target),
            Scorer::DisjunctionMax(s) => s.skip_to(target),
            Scorer::Filtered(s) => s.skip_to(target),
            Scorer::MatchAll(s) => s.docs.skip_to(target),
            Scorer::ValueSource(s) => s.docs.skip_to(target),
        }
    }

    /// The current document.
    pub fn doc(&self) -> u32 {
        match self {
            Scorer::Term(s) => s.doc(),
            Scorer::Boolean(s) => s.doc(),
            Scorer::DisjunctionMax(s) => s.doc(),
            Scorer::Filtered(s) => s.doc(),
            Scorer::MatchAll(s) => s.docs.doc(),
            Scorer::ValueSource(s) => s.docs.doc(),
        }
    }

    /// Score of the current document.
    pub fn score(&self) -> f32 {
        match self {
            Scorer::Term(s) => s.score(),
            Scorer::Boolean(s) => s.score(),
            Scorer::DisjunctionMax(s) => s.score(),
            Scorer::Filtered(s) => s.score(),
            Scorer::MatchAll(s) => s.score,
            Scorer::ValueSource(s) => s.score(),
        }
    }

    /// Feed every remaining document to `sink`.
    pub fn for_each<E>(&mut self, mut sink: impl FnMut(u32, f32) -> Result<(), E>) -> Result<(), E> {
        while self.next() {
            sink(self.doc(), self.score())?;
        }
        Ok(())
    }
}

/// Live documents of a reader in id order.
#[derive(Debug, Clone)]
pub struct LiveDocs {
    max_doc: u32,
    deleted: Option<Arc<BitVec>>,
    doc: Option<u32>,
}

impl LiveDocs {
    pub fn new(max_doc: u32, deleted: Option<Arc<BitVec>>) -> Self {
        LiveDocs {
            max_doc,
            deleted,
            doc: None,
        }
    }

    fn is_live(&self, doc: u32) -> bool {
        self.deleted
            .as_ref()
            .is_none_or(|bits| !bits.get(doc as usize).unwrap_or(false))
    }

    fn seek(&mut self, mut candidate: u32) -> bool {
        while candidate < self.max_doc {
            if self.is_live(candidate) {
                self.doc = Some(candidate);
                return true;
            }
            candidate += 1;
        }
        self.doc = Some(NO_MORE_DOCS);
        false
    }

    pub fn next(&mut self) -> bool {
        match self.doc {
            None => self.seek(0),
            Some(NO_MORE_DOCS) => false,
            Some(doc) => self.seek(doc + 1),
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
}

/// Scores every live document with one value.
#[derive(Debug, Clone)]
pub struct ConstantScorer {
    pub(crate) docs: LiveDocs,
    pub(crate) score: f32,
}

impl ConstantScorer {
    pub fn new(docs: LiveDocs, score: f32) -> Self {
        ConstantScorer { docs, score }
    }
}

/// Scores every live document by `weight · values[doc]`.
#[derive(Debug, Clone)]
pub struct FunctionScorer {
    pub(crate) docs: LiveDocs,
    weight: f32,
    values: DocValues,
}

impl FunctionScorer {
    pub fn new(docs: LiveDocs, weight: f32, values: DocValues) -> Self {
        FunctionScorer { docs, weight, values }
    }

    fn score(&self) -> f32 {
        self.weight * self.values.float_val(self.docs.doc())
    }
}

fn scorer_doc_less(a: &Scorer, b: &Scorer) -> bool {
    a.doc() < b.doc()
}

/// Positioned sub-scorers ordered by their current document, the least on
/// top. Scorers that run dry are dropped.
#[derive(Debug)]
pub(crate) struct ScorerQueue {
    queue: PriorityQueue<Scorer>,
}

impl ScorerQueue {
    /// Position each scorer on its first document and queue the live ones.
    pub(crate) fn new(scorers: Vec<Scorer>) -> Self {
        let mut queue = PriorityQueue::new(scorers.len().max(1), scorer_doc_less as fn(&Scorer, &Scorer) -> bool);
        for mut scorer in scorers {
            if scorer.next() {
                queue.put(scorer);
            }
        }
        ScorerQueue { queue }
    }

    /// Least current document over all sub-scorers.
    pub(crate) fn top_doc(&self) -> Option<u32> {
        self.queue.top().map(Scorer::doc)
    }

    /// Move every sub-scorer positioned at `doc` past it.
    pub(crate) fn advance_past(&mut self, doc: u32) {
        while let Some(top) = self.queue.top_mut() {
            if top.doc() != doc {
                break;
            }
            if top.next() {
                self.queue.adjust_top();
            } else {
                self.queue.pop();
            }
        }
    }

    /// Move every sub-scorer positioned before `target` to `target` or
    /// beyond.
    pub(crate) fn skip_below(&mut self, target: u32) {
        while let Some(top) = self.queue.top_mut() {
            if top.doc() >= target {
                break;
            }
            if top.skip_to(target) {
                self.queue.adjust_top();
            } else {
                self.queue.pop();
            }
        }
    }

    /// Sub-scorers positioned at `doc`.
    pub(crate) fn at(&self, doc: u32) -> impl Iterator<Item = &Scorer> {
        self.queue.iter().filter(move |s| s.doc() == doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_docs_skip_deleted() {
        let mut deleted = BitVec::from_elem(5, false);
        deleted.set(1, true);
        deleted.set(4, true);
        let mut docs = LiveDocs::new(5, Some(Arc::new(deleted)));
        let mut seen = Vec::new();
        while docs.next() {
            seen.push(docs.doc());
        }
        assert_eq!(seen, vec![0, 2, 3]);
        assert!(!docs.next());
        assert!(!docs.skip_to(0));
    }

    #[test]
    fn test_skip_to_stays_when_ahead() {
        let mut docs = LiveDocs::new(10, None);
        assert!(docs.skip_to(6));
        assert_eq!(docs.doc(), 6);
        assert!(docs.skip_to(3));
        assert_eq!(docs.doc(), 6);
        assert!(!docs.skip_to(10));
    }

    #[test]
    fn test_constant_scorer() {
        let mut scorer = Scorer::MatchAll(ConstantScorer::new(LiveDocs::new(3, None), 0.5));
        let mut hits = Vec::new();
        scorer
            .for_each::<()>(|doc, score| {
                hits.push((doc, score));
                Ok(())
            })
            .unwrap();
        assert_eq!(hits, vec![(0, 0.5), (1, 0.5), (2, 0.5)]);
    }
}
