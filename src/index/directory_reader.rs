//! A reader over every segment of one commit.

use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::document::Document;
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::index::commit::{ReaderLease, ReaderLeases};
use crate::index::file_names;
use crate::index::reader::{IndexReader, Postings};
use crate::index::segment_info::SegmentInfos;
use crate::index::segment_reader::SegmentReader;
use crate::index::segment_writer::DEFAULT_NORM;
use crate::search::field_cache::FieldCache;
use crate::storage::Storage;
use crate::util::priority_queue::PriorityQueue;

/// How often opening the latest commit is retried when a concurrent writer
/// removes it mid-open.
const MAX_OPEN_ATTEMPTS: usize = 10;

/// Read-only view of an index as of one commit.
///
/// Document ids of segment `i` are shifted by the total document count of
/// the segments before it.
#[derive(Debug)]
pub struct DirectoryReader {
    id: Uuid,
    storage: Arc<dyn Storage>,
    segment_infos: SegmentInfos,
    segments: Vec<Arc<SegmentReader>>,
    starts: Vec<u32>,
    max_doc: u32,
    num_docs: u32,
    deleted: Option<Arc<BitVec>>,
    norms: RwLock<AHashMap<String, Option<Arc<[u8]>>>>,
    lease: Option<ReaderLease>,
}

impl DirectoryReader {
    /// Open the newest commit in `storage`.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::open_latest(storage, None)
    }

    /// Open the newest commit and hold it with a lease from `leases`, so a
    /// writer sharing the same leases keeps its files until this reader is
    /// dropped.
    pub fn open_leased(storage: Arc<dyn Storage>, leases: &Arc<ReaderLeases>) -> Result<Self> {
        Self::open_latest(storage, Some(leases))
    }

    /// Open a specific commit generation.
    pub fn open_commit(storage: Arc<dyn Storage>, generation: u64) -> Result<Self> {
        Self::open_generation(storage, generation, None)
    }

    fn open_latest(storage: Arc<dyn Storage>, leases: Option<&Arc<ReaderLeases>>) -> Result<Self> {
        let mut last_error = None;
        for attempt in 0..MAX_OPEN_ATTEMPTS {
            let files = storage.list_files()?;
            let generation = file_names::latest_generation(&files)
                .ok_or_else(|| PilumError::not_found("no segments file in index"))?;

            // Lease before reading so the commit cannot vanish once opened.
            let lease = leases.map(|leases| leases.acquire(generation));
            match Self::open_generation(Arc::clone(&storage), generation, lease) {
                Ok(reader) => return Ok(reader),
                Err(e) if e.is_not_found() => {
                    debug!(generation, attempt, error = %e, "commit removed while opening, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| PilumError::not_found("no readable commit in index")))
    }

    fn open_generation(storage: Arc<dyn Storage>, generation: u64, lease: Option<ReaderLease>) -> Result<Self> {
        let name = file_names::segments_file_name(generation);
        let segment_infos = SegmentInfos::read(storage.as_ref(), &name)?;

        let segments = segment_infos
            .segments
            .iter()
            .map(|info| SegmentReader::open(&storage, info).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let mut starts = Vec::with_capacity(segments.len() + 1);
        let mut max_doc = 0u32;
        for segment in &segments {
            starts.push(max_doc);
            max_doc += segment.max_doc();
        }
        starts.push(max_doc);
        let num_docs = segments.iter().map(|s| s.num_docs()).sum();

        let deleted = if segments.iter().any(|s| s.has_deletions()) {
            let mut bits = BitVec::from_elem(max_doc as usize, false);
            for (segment, &base) in segments.iter().zip(&starts) {
                if let Some(seg_bits) = segment.deleted_docs() {
                    for doc in seg_bits.iter().enumerate().filter_map(|(d, del)| del.then_some(d)) {
                        bits.set(base as usize + doc, true);
                    }
                }
            }
            Some(Arc::new(bits))
        } else {
            None
        };

        debug!(
            generation,
            segments = segments.len(),
            max_doc,
            num_docs,
            leased = lease.is_some(),
            "opened index reader"
        );

        Ok(DirectoryReader {
            id: Uuid::new_v4(),
            storage,
            segment_infos,
            segments,
            starts,
            max_doc,
            num_docs,
            deleted,
            norms: RwLock::new(AHashMap::new()),
            lease,
        })
    }

    /// The commit this reader was opened on.
    pub fn segment_infos(&self) -> &SegmentInfos {
        &self.segment_infos
    }

    /// Generation of that commit.
    pub fn generation(&self) -> u64 {
        self.segment_infos.generation
    }

    /// Per-segment readers in index order.
    pub fn segments(&self) -> &[Arc<SegmentReader>] {
        &self.segments
    }

    /// The storage the index lives in.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Whether a lease holds this reader's commit.
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Whether no newer commit has been written since this reader opened.
    pub fn is_current(&self) -> Result<bool> {
        let files = self.storage.list_files()?;
        Ok(file_names::latest_generation(&files) == Some(self.generation()))
    }

    fn segment_for(&self, doc: u32) -> Result<(usize, u32)> {
        if doc >= self.max_doc {
            return Err(PilumError::invalid_argument(format!(
                "document {doc} out of range ({} docs)",
                self.max_doc
            )));
        }
        let index = self.starts[..self.segments.len()].partition_point(|&start| start <= doc) - 1;
        Ok((index, doc - self.starts[index]))
    }
}

impl IndexReader for DirectoryReader {
    fn reader_id(&self) -> Uuid {
        self.id
    }

    fn max_doc(&self) -> u32 {
        self.max_doc
    }

    fn num_docs(&self) -> u32 {
        self.num_docs
    }

    fn is_deleted(&self, doc: u32) -> bool {
        self.deleted
            .as_ref()
            .is_some_and(|bits| bits.get(doc as usize).unwrap_or(false))
    }

    fn deleted_docs(&self) -> Option<Arc<BitVec>> {
        self.deleted.clone()
    }

    fn document(&self, doc: u32) -> Result<Document> {
        let (index, local) = self.segment_for(doc)?;
        self.segments[index].document(local)
    }

    fn doc_freq(&self, term: &Term) -> u32 {
        self.segments.iter().map(|s| s.doc_freq(term)).sum()
    }

    fn term_docs(&self, term: &Term) -> Result<Option<Postings>> {
        let mut postings = Postings::new();
        let mut found = false;
        for (segment, &base) in self.segments.iter().zip(&self.starts) {
            if let Some(part) = segment.term_docs(term)? {
                postings.append_rebased(&part, base);
                found = true;
            }
        }
        Ok(found.then_some(postings))
    }

    fn terms(&self, field: &str) -> Vec<(String, u32)> {
        struct Cursor {
            terms: Vec<(String, u32)>,
            position: usize,
        }

        let mut queue = PriorityQueue::new(self.segments.len(), |a: &Cursor, b: &Cursor| {
            a.terms[a.position].0 < b.terms[b.position].0
        });
        for segment in &self.segments {
            let terms = segment.terms(field);
            if !terms.is_empty() {
                queue.put(Cursor { terms, position: 0 });
            }
        }

        let mut merged: Vec<(String, u32)> = Vec::new();
        while let Some(cursor) = queue.top_mut() {
            let (text, doc_freq) = std::mem::take(&mut cursor.terms[cursor.position]);
            cursor.position += 1;
            let exhausted = cursor.position >= cursor.terms.len();
            if exhausted {
                queue.pop();
            } else {
                queue.adjust_top();
            }
            match merged.last_mut() {
                Some((last, sum)) if *last == text => *sum += doc_freq,
                _ => merged.push((text, doc_freq)),
            }
        }
        merged
    }

    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        if let Some(norms) = self.norms.read().get(field) {
            return Ok(norms.clone());
        }
        let mut bytes = Vec::with_capacity(self.max_doc as usize);
        let mut found = false;
        for segment in &self.segments {
            match segment.norms(field)? {
                Some(part) => {
                    bytes.extend_from_slice(&part);
                    found = true;
                }
                None => bytes.resize(bytes.len() + segment.max_doc() as usize, DEFAULT_NORM),
            }
        }
        let norms: Option<Arc<[u8]>> = found.then(|| bytes.into());
        self.norms.write().insert(field.to_string(), norms.clone());
        Ok(norms)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.segments.iter().flat_map(|s| s.field_names()).collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Drop for DirectoryReader {
    fn drop(&mut self) {
        FieldCache::default_cache().purge(self.id);
    }
}
