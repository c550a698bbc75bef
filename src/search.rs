//! Searching: scoring factors, filters, collectors and the searcher.

pub mod collector;
pub mod explanation;
pub mod field_cache;
pub mod filter;
pub mod searcher;
pub mod similarity;
pub mod sort;
pub mod value_source;

pub use collector::{
    AllDocsCollector, Collector, CountCollector, FieldDoc, ScoreDoc, TopDocs, TopDocsCollector,
    TopFieldCollector, TopFieldDocs,
};
pub use explanation::Explanation;
pub use field_cache::{FieldCache, StringIndex};
pub use filter::{CachingWrapperFilter, DocSetFilter, Filter, RangeFilter};
pub use searcher::IndexSearcher;
pub use similarity::{DefaultSimilarity, Similarity};
pub use sort::{Sort, SortField, SortType, SortValue};
pub use value_source::{DocValues, ValueSource};
