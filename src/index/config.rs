//! Index writer configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::index::deletion_policy::{IndexDeletionPolicy, KeepOnlyLastCommitDeletionPolicy};
use crate::index::merge_policy::{LogDocMergePolicy, MergePolicy};
use crate::search::similarity::{DefaultSimilarity, Similarity};

/// How [`IndexWriter::open`](crate::index::IndexWriter::open) treats an
/// existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Start an empty index, dropping any existing documents.
    Create,
    /// Open an existing index; fails when there is none.
    Append,
    /// Append when an index exists, create one otherwise.
    #[default]
    CreateOrAppend,
}

/// Configuration for [`IndexWriter`](crate::index::IndexWriter).
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexWriterConfig {
    /// What to do with an existing index.
    pub open_mode: OpenMode,

    /// Number of documents buffered in memory before a segment is flushed.
    pub max_buffered_docs: usize,

    /// Number of same-level segments merged at once.
    pub merge_factor: usize,

    /// Segments with at least this many documents are not merged further.
    pub max_merge_docs: u32,

    /// Pack new segments into compound files.
    pub use_compound_file: bool,

    /// Analyzer for tokenized fields.
    #[serde(skip, default = "default_analyzer")]
    pub analyzer: Arc<dyn Analyzer>,

    /// Similarity used to compute norms.
    #[serde(skip, default = "default_similarity")]
    pub similarity: Arc<dyn Similarity>,

    /// Which commits to keep.
    #[serde(skip, default = "default_deletion_policy")]
    pub deletion_policy: Arc<dyn IndexDeletionPolicy>,

    /// Overrides the log-doc policy built from `merge_factor` and
    /// `max_merge_docs` when set.
    #[serde(skip)]
    pub merge_policy: Option<Arc<dyn MergePolicy>>,
}

fn default_analyzer() -> Arc<dyn Analyzer> {
    Arc::new(StandardAnalyzer::new())
}

fn default_similarity() -> Arc<dyn Similarity> {
    Arc::new(DefaultSimilarity)
}

fn default_deletion_policy() -> Arc<dyn IndexDeletionPolicy> {
    Arc::new(KeepOnlyLastCommitDeletionPolicy)
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            open_mode: OpenMode::default(),
            max_buffered_docs: 10,
            merge_factor: 10,
            max_merge_docs: u32::MAX,
            use_compound_file: true,
            analyzer: default_analyzer(),
            similarity: default_similarity(),
            deletion_policy: default_deletion_policy(),
            merge_policy: None,
        }
    }
}

impl IndexWriterConfig {
    /// Set the open mode.
    pub fn open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    /// Set the flush threshold; values below one count as one.
    pub fn max_buffered_docs(mut self, max_buffered_docs: usize) -> Self {
        self.max_buffered_docs = max_buffered_docs.max(1);
        self
    }

    /// Set the merge factor; values below two count as two.
    pub fn merge_factor(mut self, merge_factor: usize) -> Self {
        self.merge_factor = merge_factor.max(2);
        self
    }

    /// Set the largest segment size still eligible for merging.
    pub fn max_merge_docs(mut self, max_merge_docs: u32) -> Self {
        self.max_merge_docs = max_merge_docs;
        self
    }

    /// Enable or disable compound files.
    pub fn use_compound_file(mut self, use_compound_file: bool) -> Self {
        self.use_compound_file = use_compound_file;
        self
    }

    /// Set the analyzer.
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Set the similarity.
    pub fn similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Set the deletion policy.
    pub fn deletion_policy(mut self, deletion_policy: Arc<dyn IndexDeletionPolicy>) -> Self {
        self.deletion_policy = deletion_policy;
        self
    }

    /// Set a custom merge policy.
    pub fn merge_policy(mut self, merge_policy: Arc<dyn MergePolicy>) -> Self {
        self.merge_policy = Some(merge_policy);
        self
    }

    /// The merge policy in effect.
    pub(crate) fn effective_merge_policy(&self) -> Arc<dyn MergePolicy> {
        match &self.merge_policy {
            Some(policy) => Arc::clone(policy),
            None => {
                let mut policy = LogDocMergePolicy::new(self.merge_factor, self.max_buffered_docs as u32);
                policy.max_merge_docs = self.max_merge_docs;
                Arc::new(policy)
            }
        }
    }
}

impl fmt::Debug for IndexWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWriterConfig")
            .field("open_mode", &self.open_mode)
            .field("max_buffered_docs", &self.max_buffered_docs)
            .field("merge_factor", &self.merge_factor)
            .field("max_merge_docs", &self.max_merge_docs)
            .field("use_compound_file", &self.use_compound_file)
            .field("analyzer", &self.analyzer)
            .field("deletion_policy", &self.deletion_policy)
            .field("merge_policy", &self.merge_policy.as_ref().map(|p| p.get_config()))
            .finish_non_exhaustive()
    }
}
