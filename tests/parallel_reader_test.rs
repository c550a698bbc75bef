//! Field-disjoint indexes joined by document id search like one index.

mod common;

use std::sync::Arc;

use pilum::document::Document;
use pilum::error::PilumError;
use pilum::index::{DirectoryReader, IndexReader, IndexWriter, ParallelReader, Term};
use pilum::query::{BooleanQuery, Occur, Query};
use pilum::search::IndexSearcher;
use pilum::storage::Storage;

use common::{assert_close, index_documents, whitespace_config};

fn doc(fields: &[(&str, &str)]) -> Document {
    fields
        .iter()
        .fold(Document::builder(), |builder, (name, value)| builder.add_text(*name, *value))
        .build()
}

/// Fields 1 to 4 indexed together.
fn single() -> IndexSearcher {
    let storage = index_documents(vec![
        doc(&[("f1", "v1"), ("f2", "v1"), ("f3", "v1"), ("f4", "v1")]),
        doc(&[("f1", "v2"), ("f2", "v2"), ("f3", "v2"), ("f4", "v2")]),
    ]);
    IndexSearcher::from_reader(DirectoryReader::open(storage).unwrap())
}

fn storage1() -> Arc<dyn Storage> {
    index_documents(vec![doc(&[("f1", "v1"), ("f2", "v1")]), doc(&[("f1", "v2"), ("f2", "v2")])])
}

fn storage2() -> Arc<dyn Storage> {
    index_documents(vec![doc(&[("f3", "v1"), ("f4", "v1")]), doc(&[("f3", "v2"), ("f4", "v2")])])
}

fn open(storage: Arc<dyn Storage>) -> Arc<dyn IndexReader> {
    Arc::new(DirectoryReader::open(storage).unwrap())
}

/// Fields 1 and 2 in one index, 3 and 4 in the other.
fn parallel() -> ParallelReader {
    let mut pr = ParallelReader::new();
    pr.add(open(storage1())).unwrap();
    pr.add(open(storage2())).unwrap();
    pr
}

fn assert_same_hits(parallel: &IndexSearcher, single: &IndexSearcher, query: Query) {
    let query = Arc::new(query);
    let expected = single.search(Arc::clone(&query), None, 10).unwrap();
    let actual = parallel.search(Arc::clone(&query), None, 10).unwrap();
    assert_eq!(actual.total_hits, expected.total_hits, "{query}");
    for (a, e) in actual.score_docs.iter().zip(&expected.score_docs) {
        assert_close(a.score, e.score);
        let (a, e) = (parallel.doc(a.doc).unwrap(), single.doc(e.doc).unwrap());
        for field in ["f1", "f2", "f3", "f4"] {
            assert_eq!(a.get(field), e.get(field), "{query} {field}");
        }
    }
}

#[test]
fn test_queries_match_single_index() {
    let single = single();
    let parallel = IndexSearcher::from_reader(parallel());
    for field in ["f1", "f2", "f3", "f4"] {
        for value in ["v1", "v2"] {
            assert_same_hits(&parallel, &single, Query::term(field, value));
        }
    }

    let both = BooleanQuery::new()
        .with_clause(Query::term("f1", "v1"), Occur::Must)
        .unwrap()
        .with_clause(Query::term("f4", "v1"), Occur::Must)
        .unwrap();
    assert_same_hits(&parallel, &single, Query::Boolean(both));
}

#[test]
fn test_field_names_span_all_readers() {
    assert_eq!(parallel().field_names(), vec!["f1", "f2", "f3", "f4"]);
}

#[test]
fn test_documents_join_stored_fields() {
    let pr = parallel();
    let doc11 = pr.document_with_fields(0, &["f1"]).unwrap();
    let doc24 = pr.document_with_fields(1, &["f4"]).unwrap();
    let doc223 = pr.document_with_fields(1, &["f2", "f3"]).unwrap();

    assert_eq!(doc11.len(), 1);
    assert_eq!(doc24.len(), 1);
    assert_eq!(doc223.len(), 2);
    assert_eq!(doc11.get("f1"), Some("v1"));
    assert_eq!(doc24.get("f4"), Some("v2"));
    assert_eq!(doc223.get("f2"), Some("v2"));
    assert_eq!(doc223.get("f3"), Some("v2"));

    assert_eq!(pr.document(1).unwrap().len(), 4);
}

#[test]
fn test_incompatible_indexes_rejected() {
    let other = index_documents(vec![doc(&[("f3", "v1")])]);
    let mut pr = ParallelReader::new();
    pr.add(open(storage1())).unwrap();
    let err = pr.add(open(other)).unwrap_err();
    assert!(matches!(err, PilumError::InvalidArgument(_)), "{err}");
    assert_eq!(pr.readers().len(), 1);
}

#[test]
fn test_deletions_must_agree() {
    let delete_first = |storage: &Arc<dyn Storage>, field: &str| {
        let mut writer = IndexWriter::open(Arc::clone(storage), whitespace_config()).unwrap();
        writer.delete_documents(Term::new(field, "v1")).unwrap();
        writer.close().unwrap();
    };
    let (s1, s2) = (storage1(), storage2());
    delete_first(&s1, "f1");

    let mut pr = ParallelReader::new();
    pr.add(open(Arc::clone(&s1))).unwrap();
    assert!(pr.add(open(Arc::clone(&s2))).is_err());

    delete_first(&s2, "f3");
    let mut pr = ParallelReader::new();
    pr.add(open(s1)).unwrap();
    pr.add(open(s2)).unwrap();
    assert_eq!((pr.max_doc(), pr.num_docs()), (2, 1));
    assert!(pr.is_deleted(0));

    let searcher = IndexSearcher::from_reader(pr);
    let top = searcher.search(Query::term("f4", "v1"), None, 10).unwrap();
    assert_eq!(top.total_hits, 0);
    let top = searcher.search(Query::term("f4", "v2"), None, 10).unwrap();
    assert_eq!(top.total_hits, 1);
    assert_eq!(searcher.doc(top.score_docs[0].doc).unwrap().get("f1"), Some("v2"));
}
