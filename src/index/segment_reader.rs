//! Reading a single segment.
//!
//! A [`SegmentReader`] loads the field infos and the term dictionary when it
//! opens and keeps one handle each on the stored fields, postings and norms
//! files. The handles are shared behind mutexes, so any number of threads can
//! read through the same segment.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use parking_lot::{Mutex, RwLock};
use tracing::trace;
use uuid::Uuid;

use crate::document::{Document, Field};
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::index::field_infos::FieldInfos;
use crate::index::file_names::{self, COMPOUND_EXTENSION};
use crate::index::reader::{IndexReader, Postings};
use crate::index::segment_info::SegmentInfo;
use crate::index::segment_writer::{NORMS_HEADER, indexing_from_byte};
use crate::search::field_cache::FieldCache;
use crate::storage::compound::CompoundFileReader;
use crate::storage::data::{DataInput, DataOutput};
use crate::storage::{Storage, StorageInput};

type SharedInput = Mutex<Box<dyn StorageInput>>;

/// One term of the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TermEntry {
    pub text: String,
    pub doc_freq: u32,
    pub pointer: u64,
}

/// A stored field as read back from `.fdt`.
pub(crate) type RawStoredField = (String, crate::document::Indexing, String);

/// Read-only access to one segment.
#[derive(Debug)]
pub struct SegmentReader {
    id: Uuid,
    info: SegmentInfo,
    compound: Option<Arc<CompoundFileReader>>,
    field_infos: FieldInfos,
    terms: AHashMap<String, Vec<TermEntry>>,
    fields_index: SharedInput,
    fields_data: SharedInput,
    freq: SharedInput,
    norms_input: SharedInput,
    norms: RwLock<AHashMap<String, Arc<[u8]>>>,
    deleted: Option<Arc<BitVec>>,
    num_docs: u32,
}

impl SegmentReader {
    /// Open the segment described by `info` in `storage`.
    pub fn open(storage: &Arc<dyn Storage>, info: &SegmentInfo) -> Result<Self> {
        let (files, compound): (Arc<dyn Storage>, Option<Arc<CompoundFileReader>>) =
            if info.is_compound {
                let cfs = Arc::new(CompoundFileReader::open(
                    Arc::clone(storage),
                    &info.file_name(COMPOUND_EXTENSION),
                )?);
                (Arc::clone(&cfs) as Arc<dyn Storage>, Some(cfs))
            } else {
                (Arc::clone(storage), None)
            };

        let field_infos =
            FieldInfos::read(files.as_ref(), &info.file_name(file_names::FIELD_INFOS_EXTENSION))?;
        let terms = read_terms(
            files.as_ref(),
            &info.file_name(file_names::TERMS_EXTENSION),
            &field_infos,
        )?;

        let open = |ext: &str| -> Result<SharedInput> {
            Ok(Mutex::new(files.open_input(&info.file_name(ext))?))
        };
        let fields_index = open(file_names::FIELDS_INDEX_EXTENSION)?;
        let fields_data = open(file_names::FIELDS_EXTENSION)?;
        let freq = open(file_names::FREQ_EXTENSION)?;
        let norms_input = open(file_names::NORMS_EXTENSION)?;

        let deleted = match info.deletes_file_name() {
            Some(name) => Some(Arc::new(read_deletions(storage.as_ref(), &name, info.doc_count)?)),
            None => None,
        };
        let deleted_count = deleted
            .as_ref()
            .map_or(0, |bits| bits.iter().filter(|&b| b).count() as u32);

        trace!(segment = %info.name, docs = info.doc_count, deleted = deleted_count, "opened segment");

        Ok(SegmentReader {
            id: Uuid::new_v4(),
            info: info.clone(),
            compound,
            field_infos,
            terms,
            fields_index,
            fields_data,
            freq,
            norms_input,
            norms: RwLock::new(AHashMap::new()),
            deleted,
            num_docs: info.doc_count - deleted_count,
        })
    }

    /// The segment metadata this reader was opened from.
    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Field metadata of this segment.
    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    /// The compound file the segment is read from, if packed.
    pub fn compound_file(&self) -> Option<&Arc<CompoundFileReader>> {
        self.compound.as_ref()
    }

    pub(crate) fn term_entries(&self, field: &str) -> &[TermEntry] {
        self.terms.get(field).map_or(&[], Vec::as_slice)
    }

    fn term_entry(&self, term: &Term) -> Option<&TermEntry> {
        let entries = self.term_entries(term.field());
        entries
            .binary_search_by(|e| e.text.as_str().cmp(term.text()))
            .ok()
            .map(|i| &entries[i])
    }

    /// Indexed field names in sorted order.
    pub(crate) fn sorted_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.terms.keys().map(String::as_str).collect();
        fields.sort_unstable();
        fields
    }

    /// Postings of a dictionary entry, deleted documents included.
    pub(crate) fn raw_postings(&self, entry: &TermEntry) -> Result<Vec<(u32, u32)>> {
        let mut input = self.freq.lock();
        input.seek(SeekFrom::Start(entry.pointer))?;
        let mut postings = Vec::with_capacity(entry.doc_freq as usize);
        let mut doc = 0u32;
        for _ in 0..entry.doc_freq {
            let code = input.read_vint()?;
            doc += code >> 1;
            let freq = if code & 1 != 0 { 1 } else { input.read_vint()? };
            if doc >= self.info.doc_count {
                return Err(PilumError::corrupt(format!(
                    "{}: posting for doc {doc} beyond {}",
                    self.info.name, self.info.doc_count
                )));
            }
            postings.push((doc, freq));
        }
        Ok(postings)
    }

    /// Stored fields of `doc`, deleted or not.
    pub(crate) fn raw_document(&self, doc: u32) -> Result<Vec<RawStoredField>> {
        if doc >= self.info.doc_count {
            return Err(PilumError::invalid_argument(format!(
                "document {doc} out of range for segment {} ({} docs)",
                self.info.name, self.info.doc_count
            )));
        }
        let pointer = {
            let mut index = self.fields_index.lock();
            index.seek(SeekFrom::Start(doc as u64 * 8))?;
            index.read_long()?
        };
        let pointer = u64::try_from(pointer)
            .map_err(|_| PilumError::corrupt(format!("{}: negative field pointer", self.info.name)))?;

        let mut data = self.fields_data.lock();
        data.seek(SeekFrom::Start(pointer))?;
        let count = data.read_vint()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let number = data.read_vint()?;
            let indexing = indexing_from_byte(data.read_byte()?)?;
            let value = data.read_string()?;
            let name = self
                .field_infos
                .by_number(number)
                .map(|info| info.name.clone())
                .ok_or_else(|| PilumError::corrupt(format!("{}: unknown field {number}", self.info.name)))?;
            fields.push((name, indexing, value));
        }
        Ok(fields)
    }

    fn load_norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        if let Some(norms) = self.norms.read().get(field) {
            return Ok(Some(Arc::clone(norms)));
        }
        let Some(info) = self.field_infos.get(field).filter(|info| info.indexed) else {
            return Ok(None);
        };
        let slot = self
            .field_infos
            .indexed()
            .position(|i| i.number == info.number)
            .unwrap_or_default() as u64;
        let max_doc = self.info.doc_count as u64;

        let mut bytes = vec![0u8; max_doc as usize];
        {
            let mut input = self.norms_input.lock();
            input.seek(SeekFrom::Start(NORMS_HEADER.len() as u64 + slot * max_doc))?;
            input.read_exact(&mut bytes)?;
        }
        let norms: Arc<[u8]> = bytes.into();
        self.norms
            .write()
            .insert(field.to_string(), Arc::clone(&norms));
        Ok(Some(norms))
    }
}

impl IndexReader for SegmentReader {
    fn reader_id(&self) -> Uuid {
        self.id
    }

    fn max_doc(&self) -> u32 {
        self.info.doc_count
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
        if self.is_deleted(doc) {
            return Err(PilumError::invalid_argument(format!("document {doc} is deleted")));
        }
        let mut document = Document::new();
        for (name, indexing, value) in self.raw_document(doc)? {
            document.add(Field::new(name, value, true, indexing));
        }
        Ok(document)
    }

    fn doc_freq(&self, term: &Term) -> u32 {
        self.term_entry(term).map_or(0, |e| e.doc_freq)
    }

    fn term_docs(&self, term: &Term) -> Result<Option<Postings>> {
        let Some(entry) = self.term_entry(term) else {
            return Ok(None);
        };
        let mut postings = Postings::new();
        for (doc, freq) in self.raw_postings(entry)? {
            if !self.is_deleted(doc) {
                postings.push(doc, freq);
            }
        }
        Ok(Some(postings))
    }

    fn terms(&self, field: &str) -> Vec<(String, u32)> {
        self.term_entries(field)
            .iter()
            .map(|e| (e.text.clone(), e.doc_freq))
            .collect()
    }

    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        self.load_norms(field)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.field_infos.iter().map(|i| i.name.clone()).collect();
        names.sort();
        names
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        FieldCache::default_cache().purge(self.id);
    }
}

fn read_terms(
    storage: &dyn Storage,
    name: &str,
    field_infos: &FieldInfos,
) -> Result<AHashMap<String, Vec<TermEntry>>> {
    let mut input = storage.open_input(name)?;
    let count = input.read_vint()?;
    let mut terms: AHashMap<String, Vec<TermEntry>> = AHashMap::new();
    for _ in 0..count {
        let number = input.read_vint()?;
        let text = input.read_string()?;
        let doc_freq = input.read_vint()?;
        let pointer = input.read_vlong()?;
        let field = field_infos
            .by_number(number)
            .ok_or_else(|| PilumError::corrupt(format!("{name}: unknown field number {number}")))?;
        let entries = terms.entry(field.name.clone()).or_default();
        if entries.last().is_some_and(|last| last.text >= text) {
            return Err(PilumError::corrupt(format!("{name}: terms of {} out of order", field.name)));
        }
        entries.push(TermEntry {
            text,
            doc_freq,
            pointer,
        });
    }
    input.close()?;
    Ok(terms)
}

/// Read a deletion file.
///
/// Layout: `Int32` bit count, `Int32` number of set bits, then the bit
/// bytes, most significant bit first.
pub(crate) fn read_deletions(storage: &dyn Storage, name: &str, max_doc: u32) -> Result<BitVec> {
    let mut input = storage.open_input(name)?;
    let len = input.read_int()?;
    let count = input.read_int()?;
    if len < 0 || len as u32 != max_doc {
        return Err(PilumError::corrupt(format!("{name}: {len} bits, expected {max_doc}")));
    }
    let mut bytes = vec![0u8; (len as usize).div_ceil(8)];
    input.read_exact(&mut bytes)?;
    input.close()?;

    let mut bits = BitVec::from_bytes(&bytes);
    bits.truncate(len as usize);
    let set = bits.iter().filter(|&b| b).count();
    if set as i32 != count {
        return Err(PilumError::corrupt(format!("{name}: {set} deletions, header says {count}")));
    }
    Ok(bits)
}

/// Write a deletion file.
pub(crate) fn write_deletions(storage: &dyn Storage, name: &str, bits: &BitVec) -> Result<()> {
    let mut output = storage.create_output(name)?;
    output.write_int(bits.len() as i32)?;
    output.write_int(bits.iter().filter(|&b| b).count() as i32)?;
    output.write_all(&bits.to_bytes())?;
    output.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::index::segment_writer::{DocumentsBuffer, write_compound_file};
    use crate::search::similarity::DefaultSimilarity;
    use crate::storage::memory::MemoryStorage;

    fn build_segment(storage: &Arc<dyn Storage>, compound: bool) -> SegmentInfo {
        let mut buffer = DocumentsBuffer::new();
        for text in ["a b c", "b c", "c"] {
            let doc = Document::builder()
                .add_text("body", text)
                .add_keyword("len", text.len().to_string())
                .build();
            buffer
                .add_document(&doc, &WhitespaceAnalyzer::new(), &DefaultSimilarity)
                .unwrap();
        }
        let files = buffer.flush(Arc::clone(storage), "_0").unwrap();
        if compound {
            write_compound_file(storage, "_0", &files).unwrap();
        }
        SegmentInfo::new("_0", 3, compound)
    }

    #[test]
    fn test_terms_and_postings() {
        for compound in [false, true] {
            let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
            let info = build_segment(&storage, compound);
            let reader = SegmentReader::open(&storage, &info).unwrap();

            assert_eq!(reader.max_doc(), 3);
            assert_eq!(reader.compound_file().is_some(), compound);
            assert_eq!(
                reader.terms("body"),
                vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
            );
            let postings = reader.term_docs(&Term::new("body", "c")).unwrap().unwrap();
            assert_eq!(postings.docs(), &[0, 1, 2]);
            assert!(reader.term_docs(&Term::new("body", "zzz")).unwrap().is_none());
            assert_eq!(reader.field_names(), vec!["body", "len"]);

            let doc = reader.document(1).unwrap();
            assert_eq!(doc.get("body"), Some("b c"));
            assert_eq!(doc.get("len"), Some("3"));
        }
    }

    #[test]
    fn test_norms_follow_length() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let info = build_segment(&storage, true);
        let reader = SegmentReader::open(&storage, &info).unwrap();

        let norms = reader.norms("body").unwrap().unwrap();
        assert_eq!(norms.len(), 3);
        assert!(norms[0] < norms[1] && norms[1] < norms[2]);
        assert!(reader.norms("missing").unwrap().is_none());

        let again = reader.norms("body").unwrap().unwrap();
        assert!(Arc::ptr_eq(&norms, &again));
    }

    #[test]
    fn test_deletions_are_skipped() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut info = build_segment(&storage, false);
        let mut bits = BitVec::from_elem(3, false);
        bits.set(1, true);
        let name = info.advance_del_gen();
        write_deletions(storage.as_ref(), &name, &bits).unwrap();

        let reader = SegmentReader::open(&storage, &info).unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert!(reader.is_deleted(1));
        assert_eq!(reader.doc_freq(&Term::new("body", "b")), 2);
        let postings = reader.term_docs(&Term::new("body", "b")).unwrap().unwrap();
        assert_eq!(postings.docs(), &[0]);
        assert!(reader.document(1).is_err());
    }
}
