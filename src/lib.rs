//! # Pilum
//!
//! An embedded full-text search engine core.
//!
//! ## Features
//!
//! - Segmented inverted index with incremental flushing and log-structured
//!   merging
//! - Compound files packing a segment into one physical file
//! - Commit points with pluggable deletion policies
//! - Term, boolean, disjunction-max, filtered, fuzzy, range and function
//!   queries with TF-IDF scoring and score explanations
//! - Pluggable storage backends (file system, memory)
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use pilum::document::Document;
//! use pilum::index::{DirectoryReader, IndexWriter, IndexWriterConfig};
//! use pilum::query::Query;
//! use pilum::search::IndexSearcher;
//! use pilum::storage::Storage;
//! use pilum::storage::memory::MemoryStorage;
//!
//! # fn main() -> pilum::error::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//! let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default())?;
//! writer.add_document(Document::builder().add_text("body", "hello world").build())?;
//! writer.close()?;
//!
//! let searcher = IndexSearcher::from_reader(DirectoryReader::open(storage)?);
//! let top = searcher.search(Query::term("body", "hello"), None, 10)?;
//! assert_eq!(top.total_hits, 1);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod search;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::document::Document;
    pub use crate::error::{PilumError, Result};
    pub use crate::index::{DirectoryReader, IndexReader, IndexWriter, IndexWriterConfig, Term};
    pub use crate::query::{BooleanQuery, Occur, Query};
    pub use crate::search::{IndexSearcher, TopDocs};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
