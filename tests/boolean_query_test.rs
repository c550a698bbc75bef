//! Boolean queries over a small fixed corpus, checked against set
//! semantics.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pilum::query::{BooleanQuery, Occur, Query};
use pilum::search::IndexSearcher;

use common::{assert_close, searcher_over};

const DOCS: [&str; 4] = ["w1 w2 w3 w4 w5", "w1 w3 w2 w3", "w1 xx w2 yy w3", "w1 w3 xx w2 yy w3"];
const VOCABULARY: [&str; 8] = ["w1", "w2", "w3", "w4", "w5", "xx", "yy", "zz"];

fn fixture() -> IndexSearcher {
    searcher_over("field", &DOCS)
}

fn parse(text: &str) -> BooleanQuery {
    let mut query = BooleanQuery::new();
    for token in text.split_whitespace() {
        let (occur, text) = match token.as_bytes()[0] {
            b'+' => (Occur::Must, &token[1..]),
            b'-' => (Occur::MustNot, &token[1..]),
            _ => (Occur::Should, token),
        };
        query.add(Query::term("field", text), occur).unwrap();
    }
    query
}

fn hits(searcher: &IndexSearcher, query: impl Into<Arc<Query>>) -> Vec<u32> {
    searcher.search(query, None, 10).unwrap().docs()
}

fn hit_set(searcher: &IndexSearcher, query: impl Into<Arc<Query>>) -> BTreeSet<u32> {
    hits(searcher, query).into_iter().collect()
}

#[test]
fn test_fixed_queries() {
    let s = fixture();
    let cases: [(&str, &[u32]); 9] = [
        ("+w3 +xx", &[2, 3]),
        ("+w3 xx", &[0, 1, 2, 3]),
        ("w3 xx", &[0, 1, 2, 3]),
        ("w3 -xx", &[0, 1]),
        ("+w3 -xx", &[0, 1]),
        ("+w3 xx -w5", &[1, 2, 3]),
        ("-w3 -xx -w5", &[]),
        ("+w3 -xx -w5", &[1]),
        ("+w1 +w2 +w3 +w4", &[0]),
    ];
    for (text, expected) in cases {
        let expected: BTreeSet<u32> = expected.iter().copied().collect();
        assert_eq!(hit_set(&s, parse(text)), expected, "query {text}");
    }
}

#[test]
fn test_optional_clauses_raise_rank() {
    let s = fixture();
    let ranked = hits(&s, parse("+w3 xx"));
    let top: BTreeSet<u32> = ranked[..2].iter().copied().collect();
    assert_eq!(top, BTreeSet::from([2, 3]));
    assert_eq!(&ranked[2..], &[1, 0]);
}

#[test]
fn test_minimum_should_match() {
    let s = fixture();
    let query = parse("w1 w4 w5 xx").with_minimum_should_match(2);
    assert_eq!(hit_set(&s, query), BTreeSet::from([0, 2, 3]));
    let query = parse("w1 w4 w5 xx").with_minimum_should_match(3);
    assert_eq!(hit_set(&s, query), BTreeSet::from([0]));
}

#[test]
fn test_unknown_terms() {
    let s = fixture();
    assert!(hits(&s, parse("+w1 +zz")).is_empty());
    assert_eq!(hit_set(&s, parse("zz xx")), BTreeSet::from([2, 3]));
    assert_eq!(hit_set(&s, parse("+w4 -zz")), BTreeSet::from([0]));
}

#[test]
fn test_coord_disabled_changes_scores_only() {
    let s = fixture();
    let with_coord = s.search(parse("w4 xx yy"), None, 10).unwrap();
    let mut without = BooleanQuery::with_coord_disabled();
    for term in ["w4", "xx", "yy"] {
        without.add(Query::term("field", term), Occur::Should).unwrap();
    }
    let without = s.search(without, None, 10).unwrap();
    let doc_set = |top: &pilum::search::TopDocs| top.docs().into_iter().collect::<BTreeSet<_>>();
    assert_eq!(doc_set(&with_coord), doc_set(&without));

    // Document 0 matches one of three clauses.
    let score_of = |top: &pilum::search::TopDocs, doc| {
        top.score_docs.iter().find(|sd| sd.doc == doc).map(|sd| sd.score).unwrap()
    };
    assert_close(score_of(&with_coord, 0) * 3.0, score_of(&without, 0));
}

/// A random query tree with the documents it must match.
fn random_query(rng: &mut StdRng, depth: usize) -> (BooleanQuery, BTreeSet<u32>) {
    let mut query = BooleanQuery::new();
    let mut required: Vec<BTreeSet<u32>> = Vec::new();
    let mut optional: Vec<BTreeSet<u32>> = Vec::new();
    let mut prohibited: Vec<BTreeSet<u32>> = Vec::new();

    for _ in 0..rng.random_range(1..5) {
        let (sub, matches): (Arc<Query>, BTreeSet<u32>) = if depth > 0 && rng.random_bool(0.25) {
            let (nested, matches) = random_query(rng, depth - 1);
            (nested.into(), matches)
        } else {
            let text = VOCABULARY[rng.random_range(0..VOCABULARY.len())];
            let matches = DOCS
                .iter()
                .enumerate()
                .filter(|(_, body)| body.split_whitespace().any(|t| t == text))
                .map(|(d, _)| d as u32)
                .collect();
            (Query::term("field", text).into(), matches)
        };
        let occur = match rng.random_range(0..3) {
            0 => Occur::Must,
            1 => Occur::Should,
            _ => Occur::MustNot,
        };
        match occur {
            Occur::Must => required.push(matches),
            Occur::Should => optional.push(matches),
            Occur::MustNot => prohibited.push(matches),
        }
        query.add(sub, occur).unwrap();
    }

    let expected = (0..DOCS.len() as u32)
        .filter(|doc| {
            let positive = if required.is_empty() {
                optional.iter().any(|m| m.contains(doc))
            } else {
                required.iter().all(|m| m.contains(doc))
            };
            positive && !prohibited.iter().any(|m| m.contains(doc))
        })
        .collect();
    (query, expected)
}

#[test]
fn test_random_queries_match_set_semantics() {
    let s = fixture();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..300 {
        let (query, expected) = random_query(&mut rng, 2);
        let query: Arc<Query> = query.into();
        let top = s.search(Arc::clone(&query), None, 10).unwrap();
        let got: BTreeSet<u32> = top.docs().into_iter().collect();
        assert_eq!(got, expected, "query {query}");
        assert_eq!(top.total_hits, expected.len());

        for hit in &top.score_docs {
            let explanation = s.explain(Arc::clone(&query), hit.doc).unwrap();
            assert!(explanation.is_match(), "query {query} doc {}", hit.doc);
            assert_close(explanation.value, hit.score);
        }
    }
}
