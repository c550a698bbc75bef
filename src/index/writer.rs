//! Adding and deleting documents.
//!
//! An [`IndexWriter`] owns `write.lock` for as long as it lives, so only one
//! writer works on an index at a time. Added documents are buffered and
//! flushed as new segments; segments are merged according to the configured
//! [`MergePolicy`]. Nothing becomes visible to readers until
//! [`commit`](IndexWriter::commit) writes a new `segments_N` file.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pilum::document::Document;
//! use pilum::index::{DirectoryReader, IndexReader, IndexWriter, IndexWriterConfig};
//! use pilum::storage::Storage;
//! use pilum::storage::memory::MemoryStorage;
//!
//! # fn main() -> pilum::error::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//! let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default())?;
//! writer.add_document(Document::builder().add_text("body", "hello world").build())?;
//! writer.close()?;
//!
//! let reader = DirectoryReader::open(storage)?;
//! assert_eq!(reader.num_docs(), 1);
//! # Ok(())
//! # }
//! ```

use std::ops::Range;
use std::sync::Arc;

use bit_vec::BitVec;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::index::commit::ReaderLeases;
use crate::index::config::{IndexWriterConfig, OpenMode};
use crate::index::file_deleter::IndexFileDeleter;
use crate::index::file_names::WRITE_LOCK;
use crate::index::merge_policy::MergePolicy;
use crate::index::merger::SegmentMerger;
use crate::index::reader::IndexReader;
use crate::index::segment_info::{SegmentInfo, SegmentInfos};
use crate::index::segment_reader::{SegmentReader, write_deletions};
use crate::index::segment_writer::{DocumentsBuffer, write_compound_file};
use crate::storage::{Storage, StorageLock};

/// A delete-by-term waiting for the next flush, with the number of buffered
/// documents it applies to.
#[derive(Debug, Clone)]
struct BufferedDelete {
    term: Term,
    doc_limit: u32,
}

/// Writes to an index in a [`Storage`].
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,
    merge_policy: Arc<dyn MergePolicy>,
    lock: Option<Box<dyn StorageLock>>,
    segment_infos: SegmentInfos,
    buffer: DocumentsBuffer,
    deletes: Vec<BufferedDelete>,
    deleter: IndexFileDeleter,
    leases: Arc<ReaderLeases>,
    changed: bool,
}

impl IndexWriter {
    /// Open a writer with a fresh lease table.
    pub fn open(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Result<Self> {
        Self::open_with_leases(storage, config, ReaderLeases::new())
    }

    /// Open a writer that honors the reader leases in `leases`.
    ///
    /// Fails with [`PilumError::LockObtainFailed`] when another writer holds
    /// the index, and with [`PilumError::NotFound`] in
    /// [`OpenMode::Append`] when there is no index yet.
    pub fn open_with_leases(
        storage: Arc<dyn Storage>,
        config: IndexWriterConfig,
        leases: Arc<ReaderLeases>,
    ) -> Result<Self> {
        let lock = storage.obtain_lock(WRITE_LOCK)?;

        let existing = match SegmentInfos::read_latest(storage.as_ref()) {
            Ok(infos) => Some(infos),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let segment_infos = match (config.open_mode, existing) {
            (OpenMode::Append, None) => {
                return Err(PilumError::not_found("no index to append to"));
            }
            (OpenMode::Append | OpenMode::CreateOrAppend, Some(infos)) => infos,
            (OpenMode::Create | OpenMode::CreateOrAppend, existing) => {
                // Keep counters running so new files never reuse old names.
                let mut infos = SegmentInfos::new();
                if let Some(old) = existing {
                    infos.counter = old.counter;
                    infos.generation = old.generation;
                    infos.version = old.version;
                }
                infos.commit(storage.as_ref())?;
                info!(generation = infos.generation, "created index");
                infos
            }
        };

        let deleter = IndexFileDeleter::new(
            Arc::clone(&storage),
            Arc::clone(&config.deletion_policy),
            Arc::clone(&leases),
            &segment_infos,
        )?;

        debug!(
            generation = segment_infos.generation,
            segments = segment_infos.segments.len(),
            mode = ?config.open_mode,
            "opened index writer"
        );

        Ok(IndexWriter {
            merge_policy: config.effective_merge_policy(),
            storage,
            config,
            lock: Some(lock),
            segment_infos,
            buffer: DocumentsBuffer::new(),
            deletes: Vec::new(),
            deleter,
            leases,
            changed: false,
        })
    }

    /// The configuration this writer was opened with.
    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    /// Leases consulted before deleting a commit's files.
    pub fn reader_leases(&self) -> &Arc<ReaderLeases> {
        &self.leases
    }

    /// The writer's current segment list, flushed but possibly uncommitted.
    pub fn segment_infos(&self) -> &SegmentInfos {
        &self.segment_infos
    }

    /// Number of flushed segments.
    pub fn segment_count(&self) -> usize {
        self.segment_infos.segments.len()
    }

    /// Documents in flushed segments and the buffer, deleted ones included.
    pub fn max_doc(&self) -> u64 {
        self.segment_infos.total_doc_count() + self.buffer.num_docs() as u64
    }

    /// Live documents, ignoring deletes not applied yet.
    pub fn num_docs(&self) -> Result<u64> {
        let mut count = self.buffer.num_docs() as u64;
        for info in &self.segment_infos.segments {
            count += SegmentReader::open(&self.storage, info)?.num_docs() as u64;
        }
        Ok(count)
    }

    /// Add a document.
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.buffer
            .add_document(&doc, self.config.analyzer.as_ref(), self.config.similarity.as_ref())?;
        if self.buffer.num_docs() as usize >= self.config.max_buffered_docs {
            self.flush()?;
        }
        Ok(())
    }

    /// Delete every document containing `term` that was added before this
    /// call.
    pub fn delete_documents(&mut self, term: Term) -> Result<()> {
        self.deletes.push(BufferedDelete {
            term,
            doc_limit: self.buffer.num_docs(),
        });
        Ok(())
    }

    /// Delete the documents containing `term`, then add `doc`.
    pub fn update_document(&mut self, term: Term, doc: Document) -> Result<()> {
        self.delete_documents(term)?;
        self.add_document(doc)
    }

    /// Write buffered documents as a new segment and apply buffered deletes.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() && self.deletes.is_empty() {
            return Ok(());
        }

        let mut new_segment = None;
        if !self.buffer.is_empty() {
            let name = self.segment_infos.new_segment_name();
            let doc_count = self.buffer.num_docs();
            let files = self.buffer.flush(Arc::clone(&self.storage), &name)?;
            let mut info = SegmentInfo::new(name, doc_count, false);
            if self.config.use_compound_file {
                write_compound_file(&self.storage, &info.name, &files)?;
                info.is_compound = true;
            }
            debug!(segment = %info.name, docs = doc_count, compound = info.is_compound, "flushed segment");
            new_segment = Some(info);
        }

        self.apply_deletes(new_segment.as_mut())?;
        self.segment_infos.segments.extend(new_segment);
        self.changed = true;
        self.deleter.checkpoint(&self.segment_infos, false)?;
        self.maybe_merge()
    }

    fn apply_deletes(&mut self, new_segment: Option<&mut SegmentInfo>) -> Result<()> {
        let deletes = std::mem::take(&mut self.deletes);
        if deletes.is_empty() {
            return Ok(());
        }
        let mut deleted = 0;
        for info in &mut self.segment_infos.segments {
            deleted += delete_in_segment(&self.storage, info, &deletes, false)?;
        }
        if let Some(info) = new_segment {
            deleted += delete_in_segment(&self.storage, info, &deletes, true)?;
        }
        debug!(terms = deletes.len(), deleted, "applied deletes");
        Ok(())
    }

    /// Run the merges the merge policy asks for until it is satisfied.
    pub fn maybe_merge(&mut self) -> Result<()> {
        loop {
            let merges = self.merge_policy.find_merges(&self.segment_infos.segments);
            if merges.is_empty() {
                return Ok(());
            }
            // Back to front, so earlier ranges stay valid.
            for range in merges.into_iter().rev() {
                self.merge_segments(range)?;
            }
        }
    }

    /// Flush, then merge the index down to a single segment.
    pub fn optimize(&mut self) -> Result<()> {
        self.flush()?;
        let merges = self
            .merge_policy
            .find_merges_for_optimize(&self.segment_infos.segments, 1);
        for range in merges.into_iter().rev() {
            self.merge_segments(range)?;
        }
        Ok(())
    }

    fn merge_segments(&mut self, range: Range<usize>) -> Result<()> {
        let name = self.segment_infos.new_segment_name();
        let (doc_count, files) = {
            let readers = self.segment_infos.segments[range.clone()]
                .iter()
                .map(|info| SegmentReader::open(&self.storage, info).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            SegmentMerger::new(Arc::clone(&self.storage), &name, &readers).merge()?
        };

        let mut info = SegmentInfo::new(name, doc_count, false);
        if self.config.use_compound_file {
            write_compound_file(&self.storage, &info.name, &files)?;
            info.is_compound = true;
        }
        let merged: Vec<String> = self.segment_infos.segments[range.clone()]
            .iter()
            .map(|s| s.name.clone())
            .collect();
        info!(segment = %info.name, docs = doc_count, sources = ?merged, "merged segments");

        self.segment_infos.segments.splice(range, [info]);
        self.changed = true;
        self.deleter.checkpoint(&self.segment_infos, false)
    }

    /// Flush and, when anything changed since the last commit, write a new
    /// commit point.
    pub fn commit(&mut self) -> Result<()> {
        self.flush()?;
        if !self.changed {
            return Ok(());
        }
        self.segment_infos.commit(self.storage.as_ref())?;
        self.storage.sync()?;
        self.changed = false;
        self.deleter.checkpoint(&self.segment_infos, true)
    }

    /// Retry file deletions that failed earlier and drop the files of
    /// commits whose reader leases were released.
    pub fn delete_unused_files(&mut self) {
        self.deleter.delete_pending_files();
        self.deleter.release_deferred();
    }

    /// Generations of deleted commits still held by reader leases.
    pub fn deferred_commits(&self) -> Vec<u64> {
        self.deleter.deferred_generations()
    }

    /// Commit and release the write lock.
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        self.release_lock();
        Ok(())
    }

    /// Discard everything since the last commit and release the write lock.
    pub fn rollback(mut self) -> Result<()> {
        self.buffer = DocumentsBuffer::new();
        self.deletes.clear();
        let committed = match SegmentInfos::read(self.storage.as_ref(), &self.segment_infos.segments_file_name()) {
            Ok(infos) => infos,
            Err(e) if e.is_not_found() => SegmentInfos::new(),
            Err(e) => return Err(e),
        };
        self.segment_infos = committed;
        self.deleter.checkpoint(&self.segment_infos, false)?;
        self.changed = false;
        info!(generation = self.segment_infos.generation, "rolled back writer");
        self.release_lock();
        Ok(())
    }

    fn release_lock(&mut self) {
        if let Some(mut lock) = self.lock.take()
            && let Err(e) = lock.release()
        {
            warn!(error = %e, "failed to release write lock");
        }
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.lock.is_some() {
            if self.changed || !self.buffer.is_empty() {
                warn!("index writer dropped with uncommitted changes");
            }
            self.release_lock();
        }
    }
}

/// Mark the documents matching `deletes` in one segment. With `limited`,
/// only documents below each delete's limit are affected.
fn delete_in_segment(
    storage: &Arc<dyn Storage>,
    info: &mut SegmentInfo,
    deletes: &[BufferedDelete],
    limited: bool,
) -> Result<u32> {
    let reader = SegmentReader::open(storage, info)?;
    let mut bits = reader
        .deleted_docs()
        .map(|bits| (*bits).clone())
        .unwrap_or_else(|| BitVec::from_elem(info.doc_count as usize, false));

    let mut count = 0;
    for delete in deletes {
        let Some(postings) = reader.term_docs(&delete.term)? else {
            continue;
        };
        for &doc in postings.docs() {
            if limited && doc >= delete.doc_limit {
                break;
            }
            if !bits.get(doc as usize).unwrap_or(true) {
                bits.set(doc as usize, true);
                count += 1;
            }
        }
    }
    drop(reader);

    if count > 0 {
        let name = info.advance_del_gen();
        write_deletions(storage.as_ref(), &name, &bits)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::index::DirectoryReader;
    use crate::storage::memory::MemoryStorage;

    fn config() -> IndexWriterConfig {
        IndexWriterConfig::default().analyzer(Arc::new(WhitespaceAnalyzer::new()))
    }

    fn doc(id: &str, body: &str) -> Document {
        Document::builder().add_keyword("id", id).add_text("body", body).build()
    }

    #[test]
    fn test_nothing_visible_before_commit() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage), config()).unwrap();
        writer.add_document(doc("1", "a b")).unwrap();
        writer.flush().unwrap();

        let reader = DirectoryReader::open(Arc::clone(&storage)).unwrap();
        assert_eq!(reader.max_doc(), 0);

        writer.commit().unwrap();
        let reader = DirectoryReader::open(storage).unwrap();
        assert_eq!(reader.max_doc(), 1);
        assert_eq!(reader.document(0).unwrap().get("id"), Some("1"));
    }

    #[test]
    fn test_second_writer_fails_to_lock() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let writer = IndexWriter::open(Arc::clone(&storage), config()).unwrap();
        let err = IndexWriter::open(Arc::clone(&storage), config()).unwrap_err();
        assert!(matches!(err, PilumError::LockObtainFailed(_)));

        writer.close().unwrap();
        assert!(IndexWriter::open(storage, config()).is_ok());
    }

    #[test]
    fn test_append_requires_index() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let err = IndexWriter::open(Arc::clone(&storage), config().open_mode(OpenMode::Append)).unwrap_err();
        assert!(err.is_not_found());
        // The lock was released on failure.
        assert!(IndexWriter::open(storage, config()).is_ok());
    }

    #[test]
    fn test_create_drops_existing_documents() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage), config()).unwrap();
        writer.add_document(doc("1", "a")).unwrap();
        writer.close().unwrap();

        let writer = IndexWriter::open(Arc::clone(&storage), config().open_mode(OpenMode::Create)).unwrap();
        assert_eq!(writer.segment_infos().generation, 3);
        writer.close().unwrap();

        let reader = DirectoryReader::open(Arc::clone(&storage)).unwrap();
        assert_eq!(reader.max_doc(), 0);
        assert_eq!(storage.list_files().unwrap(), vec!["segments_3".to_string()]);
    }

    #[test]
    fn test_delete_applies_to_earlier_documents_only() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage), config().max_buffered_docs(100)).unwrap();
        writer.add_document(doc("1", "x")).unwrap();
        writer.commit().unwrap();
        writer.add_document(doc("2", "x")).unwrap();
        writer.delete_documents(Term::new("body", "x")).unwrap();
        writer.add_document(doc("3", "x")).unwrap();
        writer.commit().unwrap();

        let reader = DirectoryReader::open(storage).unwrap();
        assert_eq!(reader.max_doc(), 3);
        assert_eq!(reader.num_docs(), 1);
        let postings = reader.term_docs(&Term::new("body", "x")).unwrap().unwrap();
        assert_eq!(postings.docs(), &[2]);
        assert_eq!(reader.document(2).unwrap().get("id"), Some("3"));
    }

    #[test]
    fn test_update_document_replaces() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage), config()).unwrap();
        writer.add_document(doc("1", "old")).unwrap();
        writer.update_document(Term::new("id", "1"), doc("1", "new")).unwrap();
        writer.close().unwrap();

        let reader = DirectoryReader::open(storage).unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert!(reader.term_docs(&Term::new("body", "old")).unwrap().unwrap().is_empty());
        assert_eq!(reader.doc_freq(&Term::new("body", "new")), 1);
    }

    #[test]
    fn test_merges_and_optimize() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(
            Arc::clone(&storage),
            config().max_buffered_docs(2).merge_factor(3),
        )
        .unwrap();
        for i in 0..12 {
            writer.add_document(doc(&i.to_string(), "common")).unwrap();
        }
        // Six flushes of two documents: two level-one merges of three.
        assert_eq!(writer.segment_count(), 2);
        assert_eq!(writer.max_doc(), 12);

        writer.delete_documents(Term::new("id", "5")).unwrap();
        writer.optimize().unwrap();
        assert_eq!(writer.segment_count(), 1);
        writer.close().unwrap();

        let reader = DirectoryReader::open(Arc::clone(&storage)).unwrap();
        assert_eq!(reader.max_doc(), 11);
        assert!(!reader.has_deletions());
        let ids: Vec<String> = (0..11)
            .map(|d| reader.document(d).unwrap().get("id").unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4", "6", "7", "8", "9", "10", "11"]);

        let segment = &reader.segment_infos().segments[0];
        let mut expected = vec![segment.file_name("cfs"), reader.segment_infos().segments_file_name()];
        expected.sort();
        assert_eq!(storage.list_files().unwrap(), expected);
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage), config()).unwrap();
        writer.add_document(doc("1", "kept")).unwrap();
        writer.commit().unwrap();
        writer.add_document(doc("2", "lost")).unwrap();
        writer.flush().unwrap();
        writer.rollback().unwrap();

        let reader = DirectoryReader::open(Arc::clone(&storage)).unwrap();
        assert_eq!(reader.max_doc(), 1);
        assert!(!storage.file_exists("_1.cfs"));
    }
}
