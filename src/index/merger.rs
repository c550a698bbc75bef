//! Merging segments.
//!
//! Stored fields and norms are copied segment by segment with deleted
//! documents dropped. Terms are merged N ways: every source segment
//! contributes a cursor over its sorted term dictionary, and a
//! [`PriorityQueue`] ordered by term (then by segment position) yields the
//! cursors positioned on the smallest term.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::error::Result;
use crate::index::Term;
use crate::index::field_infos::FieldInfos;
use crate::index::reader::IndexReader;
use crate::index::segment_reader::{SegmentReader, TermEntry};
use crate::index::segment_writer::{DEFAULT_NORM, SegmentWriter, StoredField};
use crate::storage::Storage;
use crate::util::priority_queue::PriorityQueue;

/// Position of one source segment in the term merge.
struct SegmentMergeInfo<'a> {
    /// Id of the segment's first document in the merged segment.
    base: u32,
    ordinal: usize,
    reader: &'a SegmentReader,
    terms: Vec<(&'a str, &'a TermEntry)>,
    position: usize,
    doc_map: &'a [Option<u32>],
}

impl<'a> SegmentMergeInfo<'a> {
    fn new(ordinal: usize, base: u32, reader: &'a SegmentReader, doc_map: &'a [Option<u32>]) -> Self {
        let terms = reader
            .sorted_fields()
            .into_iter()
            .flat_map(|field| reader.term_entries(field).iter().map(move |e| (field, e)))
            .collect();
        SegmentMergeInfo {
            base,
            ordinal,
            reader,
            terms,
            position: 0,
            doc_map,
        }
    }

    fn current(&self) -> Option<(&'a str, &'a TermEntry)> {
        self.terms.get(self.position).copied()
    }

    /// Advance to the next term; false when exhausted.
    fn next(&mut self) -> bool {
        self.position += 1;
        self.position < self.terms.len()
    }
}

fn merge_info_less_than(a: &SegmentMergeInfo<'_>, b: &SegmentMergeInfo<'_>) -> bool {
    match (a.current(), b.current()) {
        (Some((fa, ea)), Some((fb, eb))) => {
            (fa, ea.text.as_str(), a.base, a.ordinal) < (fb, eb.text.as_str(), b.base, b.ordinal)
        }
        (Some(_), None) => true,
        _ => false,
    }
}

/// Merges several segments into a new one.
pub(crate) struct SegmentMerger<'a> {
    storage: Arc<dyn Storage>,
    segment: String,
    readers: &'a [Arc<SegmentReader>],
}

impl<'a> SegmentMerger<'a> {
    pub fn new(storage: Arc<dyn Storage>, segment: &str, readers: &'a [Arc<SegmentReader>]) -> Self {
        SegmentMerger {
            storage,
            segment: segment.to_string(),
            readers,
        }
    }

    /// Write the merged segment. Returns its document count and file names.
    pub fn merge(&self) -> Result<(u32, Vec<String>)> {
        let mut field_infos = FieldInfos::new();
        for reader in self.readers {
            for info in reader.field_infos().iter() {
                field_infos.add(&info.name, info.indexed, info.stored);
            }
        }

        // Old id -> new id, `None` for deleted documents.
        let mut doc_maps = Vec::with_capacity(self.readers.len());
        let mut bases = Vec::with_capacity(self.readers.len());
        let mut next_doc = 0u32;
        for reader in self.readers {
            bases.push(next_doc);
            let map: Vec<Option<u32>> = (0..reader.max_doc())
                .map(|doc| {
                    if reader.is_deleted(doc) {
                        None
                    } else {
                        next_doc += 1;
                        Some(next_doc - 1)
                    }
                })
                .collect();
            doc_maps.push(map);
        }
        let doc_count = next_doc;

        let mut writer = SegmentWriter::create(Arc::clone(&self.storage), &self.segment)?;
        self.merge_stored_fields(&mut writer, &field_infos)?;
        let terms = self.merge_terms(&mut writer, &field_infos, &bases, &doc_maps)?;
        let norms = self.merge_norms(&field_infos, &doc_maps, doc_count)?;
        let files = writer.finish(&field_infos, &norms)?;

        debug!(
            segment = %self.segment,
            sources = self.readers.len(),
            docs = doc_count,
            terms,
            "merged segments"
        );
        Ok((doc_count, files))
    }

    fn merge_stored_fields(&self, writer: &mut SegmentWriter, field_infos: &FieldInfos) -> Result<()> {
        for reader in self.readers {
            for doc in 0..reader.max_doc() {
                if reader.is_deleted(doc) {
                    continue;
                }
                let fields = reader
                    .raw_document(doc)?
                    .into_iter()
                    .filter_map(|(name, indexing, value)| {
                        field_infos.number(&name).map(|number| StoredField {
                            number,
                            indexing,
                            value,
                        })
                    })
                    .collect::<Vec<_>>();
                writer.add_document(&fields)?;
            }
        }
        Ok(())
    }

    fn merge_terms(
        &self,
        writer: &mut SegmentWriter,
        field_infos: &FieldInfos,
        bases: &[u32],
        doc_maps: &[Vec<Option<u32>>],
    ) -> Result<usize> {
        let mut queue = PriorityQueue::new(self.readers.len(), merge_info_less_than);
        for (ordinal, reader) in self.readers.iter().enumerate() {
            let info = SegmentMergeInfo::new(ordinal, bases[ordinal], reader, &doc_maps[ordinal]);
            if info.current().is_some() {
                queue.put(info);
            }
        }

        let mut term_count = 0;
        let mut matching: Vec<SegmentMergeInfo<'_>> = Vec::with_capacity(self.readers.len());
        while let Some((field, entry)) = queue.top().and_then(SegmentMergeInfo::current) {
            let term = Term::new(field, entry.text.as_str());

            // Pop every segment positioned on this term; they come out in
            // segment order because ties break on the base.
            while queue
                .top()
                .and_then(SegmentMergeInfo::current)
                .is_some_and(|(f, e)| f == term.field() && e.text == term.text())
            {
                if let Some(info) = queue.pop() {
                    matching.push(info);
                }
            }

            let mut postings = Vec::new();
            for info in &matching {
                if let Some((_, entry)) = info.current() {
                    for (doc, freq) in info.reader.raw_postings(entry)? {
                        if let Some(Some(new_doc)) = info.doc_map.get(doc as usize) {
                            postings.push((*new_doc, freq));
                        }
                    }
                }
            }
            if let Some(number) = field_infos.number(term.field())
                && !postings.is_empty()
            {
                writer.add_term(number, &term, &postings)?;
                term_count += 1;
            }

            for mut info in matching.drain(..) {
                if info.next() {
                    queue.put(info);
                }
            }
        }
        Ok(term_count)
    }

    fn merge_norms(
        &self,
        field_infos: &FieldInfos,
        doc_maps: &[Vec<Option<u32>>],
        doc_count: u32,
    ) -> Result<AHashMap<u32, Vec<u8>>> {
        let mut norms = AHashMap::new();
        for info in field_infos.indexed() {
            let mut column = Vec::with_capacity(doc_count as usize);
            for (reader, map) in self.readers.iter().zip(doc_maps) {
                let source = reader.norms(&info.name)?;
                for (doc, mapped) in map.iter().enumerate() {
                    if mapped.is_some() {
                        column.push(source.as_ref().map_or(DEFAULT_NORM, |n| n[doc]));
                    }
                }
            }
            norms.insert(info.number, column);
        }
        Ok(norms)
    }
}
