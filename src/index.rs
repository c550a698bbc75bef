//! The index: segments on storage, the writer that produces them and the
//! readers that search them.
//!
//! An index is a list of segments recorded in a commit file
//! (`segments_N`). Each segment is an immutable set of documents with its
//! own term dictionary, postings, stored fields and norms; deletions are
//! tracked in a separate bitset file per segment. The [`IndexWriter`] adds
//! segments, merges them and writes new commits; an
//! [`IndexDeletionPolicy`] decides which older commits survive.

pub mod commit;
pub mod config;
pub mod deletion_policy;
pub mod directory_reader;
pub(crate) mod file_deleter;
pub mod field_infos;
pub mod file_names;
pub mod merge_policy;
pub(crate) mod merger;
pub mod parallel_reader;
pub mod reader;
pub mod segment_info;
pub mod segment_reader;
pub(crate) mod segment_writer;
pub mod term;
pub mod writer;

pub use commit::{CommitPoint, ReaderLease, ReaderLeases};
pub use config::{IndexWriterConfig, OpenMode};
pub use deletion_policy::{
    ExpirationTimeDeletionPolicy, IndexDeletionPolicy, KeepAllDeletionPolicy, KeepLastNDeletionPolicy,
    KeepOnlyLastCommitDeletionPolicy,
};
pub use directory_reader::DirectoryReader;
pub use merge_policy::{LogDocMergePolicy, MergePolicy};
pub use parallel_reader::ParallelReader;
pub use reader::{IndexReader, Postings};
pub use segment_info::{SegmentInfo, SegmentInfos};
pub use segment_reader::SegmentReader;
pub use segment_writer::DEFAULT_NORM;
pub use term::Term;
pub use writer::IndexWriter;
