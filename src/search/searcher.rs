//! Running queries against a reader.

use std::sync::Arc;

use tracing::debug;

use crate::document::Document;
use crate::error::Result;
use crate::index::{IndexReader, Term};
use crate::query::{Query, Weight};
use crate::search::collector::{Collector, TopDocs, TopDocsCollector, TopFieldCollector, TopFieldDocs};
use crate::search::explanation::Explanation;
use crate::search::filter::Filter;
use crate::search::similarity::{DefaultSimilarity, Similarity, safe_query_norm};
use crate::search::sort::{HitComparator, Sort};

/// Searches one point-in-time reader. Cheap to clone and safe to share
/// between threads.
#[derive(Debug, Clone)]
pub struct IndexSearcher {
    reader: Arc<dyn IndexReader>,
    similarity: Arc<dyn Similarity>,
}

impl IndexSearcher {
    /// A searcher scoring with [`DefaultSimilarity`].
    pub fn new(reader: Arc<dyn IndexReader>) -> Self {
        Self::with_similarity(reader, Arc::new(DefaultSimilarity))
    }

    /// A searcher scoring with `similarity`.
    pub fn with_similarity(reader: Arc<dyn IndexReader>, similarity: Arc<dyn Similarity>) -> Self {
        IndexSearcher { reader, similarity }
    }

    /// Wrap a concrete reader.
    pub fn from_reader<R: IndexReader + 'static>(reader: R) -> Self {
        Self::new(Arc::new(reader))
    }

    pub fn reader(&self) -> &Arc<dyn IndexReader> {
        &self.reader
    }

    pub fn similarity(&self) -> &Arc<dyn Similarity> {
        &self.similarity
    }

    pub fn doc_freq(&self, term: &Term) -> u32 {
        self.reader.doc_freq(term)
    }

    pub fn max_doc(&self) -> u32 {
        self.reader.max_doc()
    }

    /// Stored fields of `doc`.
    pub fn doc(&self, doc: u32) -> Result<Document> {
        self.reader.document(doc)
    }

    /// Rewrite `query` until it no longer changes.
    pub fn rewrite(&self, query: &Arc<Query>) -> Result<Arc<Query>> {
        let mut current = Arc::clone(query);
        loop {
            let rewritten = current.rewrite(self.reader.as_ref())?;
            if Arc::ptr_eq(&rewritten, &current) {
                return Ok(current);
            }
            current = rewritten;
        }
    }

    /// Rewrite and compile `query`, then normalize its weights.
    pub fn create_weight(&self, query: &Arc<Query>) -> Result<Weight> {
        let rewritten = self.rewrite(query)?;
        let mut weight = rewritten.create_weight(self)?;
        let sum = weight.sum_of_squared_weights();
        let norm = safe_query_norm(self.similarity.as_ref(), sum);
        weight.normalize(norm);
        Ok(weight)
    }

    /// Feed every match of `query` that passes `filter` to `collector`.
    pub fn search_with_collector(
        &self,
        query: impl Into<Arc<Query>>,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()> {
        let query = query.into();
        let weight = self.create_weight(&query)?;
        self.collect(&weight, filter, collector)
    }

    fn collect(&self, weight: &Weight, filter: Option<&dyn Filter>, collector: &mut dyn Collector) -> Result<()> {
        let reader = self.reader.as_ref();
        let Some(mut scorer) = weight.scorer(reader)? else {
            return Ok(());
        };
        let bits = filter.map(|f| f.bits(reader)).transpose()?;
        scorer.for_each(|doc, score| {
            if bits.as_ref().is_some_and(|b| !b.get(doc as usize).unwrap_or(false)) {
                return Ok(());
            }
            collector.collect(doc, score)
        })
    }

    /// The `n` best matches of `query`.
    pub fn search(&self, query: impl Into<Arc<Query>>, filter: Option<&dyn Filter>, n: usize) -> Result<TopDocs> {
        let query = query.into();
        let weight = self.create_weight(&query)?;
        let mut collector = TopDocsCollector::new(n);
        self.collect(&weight, filter, &mut collector)?;
        let top = collector.top_docs();
        debug!(query = %query, total_hits = top.total_hits, "searched");
        Ok(top)
    }

    /// The first `n` matches of `query` in `sort` order.
    pub fn search_sorted(
        &self,
        query: impl Into<Arc<Query>>,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs> {
        let query = query.into();
        let weight = self.create_weight(&query)?;
        let comparator = HitComparator::new(sort, self.reader.as_ref())?;
        let mut collector = TopFieldCollector::new(n, comparator, sort.fields.clone());
        self.collect(&weight, filter, &mut collector)?;
        Ok(collector.top_docs())
    }

    /// How `doc` scores against `query`.
    pub fn explain(&self, query: impl Into<Arc<Query>>, doc: u32) -> Result<Explanation> {
        let query = query.into();
        let weight = self.create_weight(&query)?;
        weight.explain(self.reader.as_ref(), doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::index::{DirectoryReader, IndexWriter, IndexWriterConfig};
    use crate::query::{BooleanQuery, FuzzyQuery, MatchAllDocsQuery, Occur, RangeQuery};
    use crate::search::sort::{SortField, SortType, SortValue};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn searcher(docs: &[(&str, &str)]) -> IndexSearcher {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let config = IndexWriterConfig::default().analyzer(Arc::new(WhitespaceAnalyzer::new()));
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for (body, rank) in docs {
            writer
                .add_document(Document::builder().add_text("body", *body).add_keyword("rank", *rank).build())
                .unwrap();
        }
        writer.close().unwrap();
        IndexSearcher::from_reader(DirectoryReader::open(storage).unwrap())
    }

    #[test]
    fn test_term_search_ranks_by_tf() {
        let s = searcher(&[("a b", "1"), ("a a a a", "2"), ("c", "3")]);
        let top = s.search(Query::term("body", "a"), None, 10).unwrap();
        assert_eq!(top.total_hits, 2);
        assert_eq!(top.docs(), vec![1, 0]);
        assert_eq!(top.max_score, top.score_docs[0].score);
        assert!(s.search(Query::term("body", "zzz"), None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_fixpoint() {
        let s = searcher(&[("apple", "1"), ("apply", "2"), ("banana", "3")]);
        let fuzzy: Arc<Query> = FuzzyQuery::new(Term::new("body", "appla")).into();
        let rewritten = s.rewrite(&fuzzy).unwrap();
        let Query::Boolean(bq) = rewritten.as_ref() else {
            panic!("expected a boolean query, got {rewritten}");
        };
        assert_eq!(bq.clauses().len(), 2);
        assert!(bq.is_coord_disabled());

        let term: Arc<Query> = Query::term("body", "apple").into();
        assert!(Arc::ptr_eq(&s.rewrite(&term).unwrap(), &term));

        let wrapped: Arc<Query> = BooleanQuery::new()
            .with_clause(Query::term("body", "apple"), Occur::Must)
            .unwrap()
            .into();
        assert_eq!(s.rewrite(&wrapped).unwrap().to_string(), "body:apple");
        assert!(fuzzy.create_weight(&s).is_err());
    }

    #[test]
    fn test_range_and_match_all() {
        let s = searcher(&[("x", "1"), ("x", "2"), ("x", "3"), ("x", "4")]);
        let range = RangeQuery::new("rank", Some("2".into()), Some("3".into()), true).unwrap();
        assert_eq!(s.search(range, None, 10).unwrap().docs(), vec![1, 2]);

        let all = s.search(MatchAllDocsQuery::new(), None, 10).unwrap();
        assert_eq!(all.docs(), vec![0, 1, 2, 3]);
        assert!(all.score_docs.iter().all(|sd| sd.score == all.max_score));
    }

    #[test]
    fn test_sorted_search() {
        let s = searcher(&[("x", "30"), ("x", "10"), ("x y", "20")]);
        let by_rank = Sort::by(SortField::new("rank", SortType::Int));
        let top = s.search_sorted(Query::term("body", "x"), None, 10, &by_rank).unwrap();
        assert_eq!(top.score_docs.iter().map(|d| d.doc).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(top.score_docs[0].fields, vec![SortValue::Int(10)]);

        let reversed = Sort::by(SortField::new("rank", SortType::String).reversed());
        let top = s.search_sorted(Query::term("body", "x"), None, 2, &reversed).unwrap();
        assert_eq!(top.score_docs.iter().map(|d| d.doc).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(top.total_hits, 3);

        let top = s.search_sorted(Query::term("body", "x"), None, 10, &Sort::index_order()).unwrap();
        assert_eq!(top.score_docs.iter().map(|d| d.doc).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_explain_matches_score() {
        let s = searcher(&[("a b", "1"), ("a a c", "2"), ("b c", "3")]);
        let query: Arc<Query> = BooleanQuery::new()
            .with_clause(Query::term("body", "a"), Occur::Should)
            .unwrap()
            .with_clause(Query::term("body", "c"), Occur::Should)
            .unwrap()
            .into();
        let top = s.search(Arc::clone(&query), None, 10).unwrap();
        assert_eq!(top.total_hits, 3);
        for hit in &top.score_docs {
            let expl = s.explain(Arc::clone(&query), hit.doc).unwrap();
            assert!((expl.value - hit.score).abs() < 1e-5, "{expl}");
        }
    }
}
