//! Writing segment files.
//!
//! [`DocumentsBuffer`] inverts added documents in memory; [`SegmentWriter`]
//! streams stored fields and postings of one new segment to storage and is
//! shared by flushing and merging.
//!
//! Stored fields: `.fdx` holds one `Int64` pointer into `.fdt` per document;
//! each `.fdt` record is `VInt` field count, then per field `VInt` number,
//! `Byte` indexing flag and `String` value.
//!
//! Term dictionary `.tis`: `VInt` term count, then per term `VInt` field
//! number, `String` text, `VInt` doc freq and `VLong` pointer into `.frq`.
//!
//! Postings `.frq`: per document `VInt (delta << 1 | freq == 1)`, followed by
//! `VInt freq` when the frequency is not one.
//!
//! Norms `.nrm`: `NRM` + `0xFF`, then one byte per document for every indexed
//! field in field number order.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::analysis::Analyzer;
use crate::document::{Document, Indexing};
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::index::field_infos::FieldInfos;
use crate::index::file_names::{self, COMPOUND_EXTENSION, COMPOUND_EXTENSIONS};
use crate::search::similarity::Similarity;
use crate::storage::compound::CompoundFileWriter;
use crate::storage::data::DataOutput;
use crate::storage::{Storage, StorageOutput};

/// Header of a norms file.
pub(crate) const NORMS_HEADER: [u8; 4] = [b'N', b'R', b'M', 0xFF];

/// Encoded norm of 1.0, used for documents lacking a field.
pub const DEFAULT_NORM: u8 = 124;

/// A stored field value with its segment-local field number.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredField {
    pub number: u32,
    pub indexing: Indexing,
    pub value: String,
}

pub(crate) fn indexing_to_byte(indexing: Indexing) -> u8 {
    match indexing {
        Indexing::No => 0,
        Indexing::Tokenized => 1,
        Indexing::Untokenized => 2,
    }
}

pub(crate) fn indexing_from_byte(flag: u8) -> Result<Indexing> {
    match flag {
        0 => Ok(Indexing::No),
        1 => Ok(Indexing::Tokenized),
        2 => Ok(Indexing::Untokenized),
        other => Err(PilumError::corrupt(format!("unknown stored field flag {other}"))),
    }
}

/// Streams the files of one segment.
pub(crate) struct SegmentWriter {
    storage: Arc<dyn Storage>,
    segment: String,
    fdx: Box<dyn StorageOutput>,
    fdt: Box<dyn StorageOutput>,
    fdt_pointer: u64,
    frq: Box<dyn StorageOutput>,
    frq_pointer: u64,
    terms: Vec<u8>,
    term_count: u32,
    last_term: Option<Term>,
    doc_count: u32,
}

impl SegmentWriter {
    /// Start writing `segment`.
    pub fn create(storage: Arc<dyn Storage>, segment: &str) -> Result<Self> {
        let name = |ext: &str| file_names::segment_file_name(segment, ext);
        let fdx = storage.create_output(&name(file_names::FIELDS_INDEX_EXTENSION))?;
        let fdt = storage.create_output(&name(file_names::FIELDS_EXTENSION))?;
        let frq = storage.create_output(&name(file_names::FREQ_EXTENSION))?;
        Ok(SegmentWriter {
            storage,
            segment: segment.to_string(),
            fdx,
            fdt,
            fdt_pointer: 0,
            frq,
            frq_pointer: 0,
            terms: Vec::new(),
            term_count: 0,
            last_term: None,
            doc_count: 0,
        })
    }

    /// Append the stored fields of the next document.
    pub fn add_document(&mut self, fields: &[StoredField]) -> Result<()> {
        self.fdx.write_long(self.fdt_pointer as i64)?;

        let mut record = Vec::new();
        record.write_vint(fields.len() as u32)?;
        for field in fields {
            record.write_vint(field.number)?;
            record.write_byte(indexing_to_byte(field.indexing))?;
            record.write_string(&field.value)?;
        }
        self.fdt.write_all(&record)?;
        self.fdt_pointer += record.len() as u64;
        self.doc_count += 1;
        Ok(())
    }

    /// Append the postings of the next term. Terms must arrive in order.
    pub fn add_term(&mut self, field_number: u32, term: &Term, postings: &[(u32, u32)]) -> Result<()> {
        if postings.is_empty() {
            return Ok(());
        }
        if let Some(last) = &self.last_term
            && last >= term
        {
            return Err(PilumError::index(format!(
                "{}: term {term} added after {last}",
                self.segment
            )));
        }

        let mut encoded = Vec::new();
        let mut last_doc = 0u32;
        for (i, &(doc, freq)) in postings.iter().enumerate() {
            if i > 0 && doc <= last_doc {
                return Err(PilumError::index(format!(
                    "{}: postings of {term} out of order at doc {doc}",
                    self.segment
                )));
            }
            let delta = doc - last_doc;
            last_doc = doc;
            if freq == 1 {
                encoded.write_vint(delta << 1 | 1)?;
            } else {
                encoded.write_vint(delta << 1)?;
                encoded.write_vint(freq)?;
            }
        }

        self.terms.write_vint(field_number)?;
        self.terms.write_string(term.text())?;
        self.terms.write_vint(postings.len() as u32)?;
        self.terms.write_vlong(self.frq_pointer)?;
        self.term_count += 1;

        self.frq.write_all(&encoded)?;
        self.frq_pointer += encoded.len() as u64;
        self.last_term = Some(term.clone());
        Ok(())
    }

    /// Write the remaining files and return every file name, in packing order.
    pub fn finish(mut self, field_infos: &FieldInfos, norms: &AHashMap<u32, Vec<u8>>) -> Result<Vec<String>> {
        let name = |ext: &str| file_names::segment_file_name(&self.segment, ext);

        field_infos.write(self.storage.as_ref(), &name(file_names::FIELD_INFOS_EXTENSION))?;

        let mut tis = self.storage.create_output(&name(file_names::TERMS_EXTENSION))?;
        tis.write_vint(self.term_count)?;
        tis.write_all(&self.terms)?;
        tis.close()?;

        let mut nrm = self.storage.create_output(&name(file_names::NORMS_EXTENSION))?;
        nrm.write_all(&NORMS_HEADER)?;
        for info in field_infos.indexed() {
            match norms.get(&info.number) {
                Some(column) if column.len() == self.doc_count as usize => nrm.write_all(column)?,
                Some(column) => {
                    return Err(PilumError::index(format!(
                        "{}: {} norms for field {}, expected {}",
                        self.segment,
                        column.len(),
                        info.name,
                        self.doc_count
                    )));
                }
                None => nrm.write_all(&vec![DEFAULT_NORM; self.doc_count as usize])?,
            }
        }
        nrm.close()?;

        self.fdx.close()?;
        self.fdt.close()?;
        self.frq.close()?;

        debug!(
            segment = %self.segment,
            docs = self.doc_count,
            terms = self.term_count,
            "wrote segment"
        );

        Ok(COMPOUND_EXTENSIONS.iter().map(|ext| name(ext)).collect())
    }
}

/// Pack the given segment files into `<segment>.cfs` and remove them.
pub(crate) fn write_compound_file(storage: &Arc<dyn Storage>, segment: &str, files: &[String]) -> Result<String> {
    let compound = file_names::segment_file_name(segment, COMPOUND_EXTENSION);
    let mut writer = CompoundFileWriter::new(Arc::clone(storage), &compound);
    for file in files {
        writer.add_file(file)?;
    }
    writer.close()?;
    for file in files {
        storage.delete_file(file)?;
    }
    Ok(compound)
}

/// Documents added since the last flush, inverted in memory.
#[derive(Debug, Default)]
pub(crate) struct DocumentsBuffer {
    field_infos: FieldInfos,
    stored: Vec<Vec<StoredField>>,
    norms: AHashMap<u32, Vec<u8>>,
    postings: BTreeMap<Term, Vec<(u32, u32)>>,
}

impl DocumentsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered documents.
    pub fn num_docs(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Analyze and buffer one document.
    pub fn add_document(
        &mut self,
        doc: &Document,
        analyzer: &dyn Analyzer,
        similarity: &dyn Similarity,
    ) -> Result<()> {
        let doc_id = self.num_docs();
        let mut stored = Vec::new();
        let mut lengths: AHashMap<u32, (usize, f32)> = AHashMap::new();
        let mut freqs: AHashMap<Term, u32> = AHashMap::new();

        for field in doc.fields() {
            let number = self
                .field_infos
                .add(field.name(), field.is_indexed(), field.is_stored());
            if field.is_stored() {
                stored.push(StoredField {
                    number,
                    indexing: field.indexing(),
                    value: field.value().to_string(),
                });
            }
            if !field.is_indexed() {
                continue;
            }

            let stats = lengths.entry(number).or_insert((0, 1.0));
            stats.1 *= field.boost();
            match field.indexing() {
                Indexing::Untokenized => {
                    *freqs.entry(Term::new(field.name(), field.value())).or_insert(0) += 1;
                    stats.0 += 1;
                }
                Indexing::Tokenized => {
                    for token in analyzer.analyze(field.value())? {
                        *freqs.entry(Term::new(field.name(), token.text)).or_insert(0) += 1;
                        stats.0 += 1;
                    }
                }
                Indexing::No => {}
            }
        }

        for (number, (length, boost)) in lengths {
            let name = self
                .field_infos
                .by_number(number)
                .map(|info| info.name.clone())
                .unwrap_or_default();
            let norm = doc.boost() * boost * similarity.length_norm(&name, length);
            let column = self
                .norms
                .entry(number)
                .or_insert_with(|| vec![DEFAULT_NORM; doc_id as usize]);
            column.push(similarity.encode_norm(norm));
        }
        for column in self.norms.values_mut() {
            column.resize(doc_id as usize + 1, DEFAULT_NORM);
        }

        for (term, freq) in freqs {
            self.postings.entry(term).or_default().push((doc_id, freq));
        }
        self.stored.push(stored);
        Ok(())
    }

    /// Write the buffered documents as `segment` and reset the buffer.
    pub fn flush(&mut self, storage: Arc<dyn Storage>, segment: &str) -> Result<Vec<String>> {
        let buffer = std::mem::take(self);
        let mut writer = SegmentWriter::create(storage, segment)?;
        for fields in &buffer.stored {
            writer.add_document(fields)?;
        }
        for (term, postings) in &buffer.postings {
            let number = buffer
                .field_infos
                .number(term.field())
                .ok_or_else(|| PilumError::index(format!("unknown field {}", term.field())))?;
            writer.add_term(number, term, postings)?;
        }
        writer.finish(&buffer.field_infos, &buffer.norms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;
    use crate::document::Field;
    use crate::search::similarity::DefaultSimilarity;
    use crate::storage::memory::MemoryStorage;
    use std::io::Read;

    fn read_all(storage: &dyn Storage, name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        storage.open_input(name).unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_postings_layout() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut buffer = DocumentsBuffer::new();
        let analyzer = WhitespaceAnalyzer::new();
        let similarity = DefaultSimilarity;

        buffer
            .add_document(&Document::builder().add_text("f", "a a b").build(), &analyzer, &similarity)
            .unwrap();
        buffer
            .add_document(&Document::builder().add_keyword("id", "x").build(), &analyzer, &similarity)
            .unwrap();
        buffer
            .add_document(&Document::builder().add_text("f", "a").build(), &analyzer, &similarity)
            .unwrap();
        assert_eq!(buffer.num_docs(), 3);

        let files = buffer.flush(Arc::clone(&storage), "_0").unwrap();
        assert!(buffer.is_empty());
        assert_eq!(files.len(), 6);

        // f:a -> doc 0 freq 2, doc 2 freq 1; f:b -> doc 0 freq 1; id:x -> doc 1.
        // Terms sort by field name, so f:a, f:b, id:x.
        assert_eq!(read_all(storage.as_ref(), "_0.frq"), vec![0, 2, 5, 1, 3]);

        let norms = read_all(storage.as_ref(), "_0.nrm");
        assert_eq!(&norms[..4], &NORMS_HEADER);
        // Field f: doc 1 lacks it and keeps the default norm.
        assert_eq!(norms[5], DEFAULT_NORM);
        assert_eq!(norms.len(), 4 + 2 * 3);
    }

    #[test]
    fn test_out_of_order_terms_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = SegmentWriter::create(storage, "_0").unwrap();
        writer.add_term(0, &Term::new("f", "b"), &[(0, 1)]).unwrap();
        assert!(writer.add_term(0, &Term::new("f", "a"), &[(0, 1)]).is_err());
    }

    #[test]
    fn test_compound_packing_removes_loose_files() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut buffer = DocumentsBuffer::new();
        buffer
            .add_document(
                &Document::builder().add(Field::text("f", "hello world")).build(),
                &WhitespaceAnalyzer::new(),
                &DefaultSimilarity,
            )
            .unwrap();
        let files = buffer.flush(Arc::clone(&storage), "_0").unwrap();
        let compound = write_compound_file(&storage, "_0", &files).unwrap();

        assert_eq!(compound, "_0.cfs");
        assert_eq!(storage.list_files().unwrap(), vec!["_0.cfs".to_string()]);
    }
}
