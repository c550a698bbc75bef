#![allow(dead_code)]

use std::sync::Arc;

use pilum::analysis::WhitespaceAnalyzer;
use pilum::document::Document;
use pilum::index::{DirectoryReader, IndexWriter, IndexWriterConfig};
use pilum::search::IndexSearcher;
use pilum::storage::Storage;
use pilum::storage::memory::MemoryStorage;

pub fn whitespace_config() -> IndexWriterConfig {
    IndexWriterConfig::default().analyzer(Arc::new(WhitespaceAnalyzer::new()))
}

/// Index `docs` in order into a fresh memory storage.
pub fn index_documents(docs: Vec<Document>) -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let mut writer = IndexWriter::open(Arc::clone(&storage), whitespace_config()).unwrap();
    for doc in docs {
        writer.add_document(doc).unwrap();
    }
    writer.close().unwrap();
    storage
}

/// A searcher over one document per entry, each with its text in `field`
/// and its position in the `id` keyword field.
pub fn searcher_over(field: &str, texts: &[&str]) -> IndexSearcher {
    let docs = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Document::builder().add_keyword("id", i.to_string()).add_text(field, *text).build())
        .collect();
    let storage = index_documents(docs);
    IndexSearcher::from_reader(DirectoryReader::open(storage).unwrap())
}

pub fn assert_close(actual: f32, expected: f32) {
    let tolerance = 1e-5 * expected.abs().max(1.0);
    assert!((actual - expected).abs() <= tolerance, "{actual} != {expected}");
}
