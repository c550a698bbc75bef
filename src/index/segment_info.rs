//! Segment metadata and the commit file (`segments_N`).
//!
//! ```text
//! Int32  format (-1)
//! Int64  version, incremented by every change
//! Int32  segment name counter
//! Int32  segment count
//! repeat: String name, Int32 doc count, Int64 deletion generation (-1 none),
//!         Byte is_compound
//! Int64  CRC-32 of all preceding bytes
//! ```

use std::io::{Cursor, Read, Write};

use tracing::debug;

use crate::error::{PilumError, Result};
use crate::index::file_names::{self, COMPOUND_EXTENSION, COMPOUND_EXTENSIONS};
use crate::storage::Storage;
use crate::storage::data::{DataInput, DataOutput};

const FORMAT: i32 = -1;

/// Metadata of one segment as recorded in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment name, e.g. `_4`.
    pub name: String,
    /// Number of documents, deleted ones included.
    pub doc_count: u32,
    /// Generation of the deletion file, `-1` when nothing is deleted.
    pub del_gen: i64,
    /// Whether the segment files are packed into `<name>.cfs`.
    pub is_compound: bool,
}

impl SegmentInfo {
    /// A freshly written segment without deletions.
    pub fn new<S: Into<String>>(name: S, doc_count: u32, is_compound: bool) -> Self {
        SegmentInfo {
            name: name.into(),
            doc_count,
            del_gen: -1,
            is_compound,
        }
    }

    /// Whether a deletion file exists.
    pub fn has_deletions(&self) -> bool {
        self.del_gen >= 0
    }

    /// Name of the current deletion file.
    pub fn deletes_file_name(&self) -> Option<String> {
        u64::try_from(self.del_gen)
            .ok()
            .map(|generation| file_names::deletes_file_name(&self.name, generation))
    }

    /// Name the next deletion file will get; advances the generation.
    pub fn advance_del_gen(&mut self) -> String {
        self.del_gen = if self.del_gen < 0 { 1 } else { self.del_gen + 1 };
        file_names::deletes_file_name(&self.name, self.del_gen as u64)
    }

    /// Name of a segment file with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        file_names::segment_file_name(&self.name, extension)
    }

    /// Every file this segment needs.
    pub fn files(&self) -> Vec<String> {
        let mut files = if self.is_compound {
            vec![self.file_name(COMPOUND_EXTENSION)]
        } else {
            COMPOUND_EXTENSIONS
                .iter()
                .map(|ext| self.file_name(ext))
                .collect()
        };
        files.extend(self.deletes_file_name());
        files
    }
}

/// The ordered segment list of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentInfos {
    /// Incremented on every change.
    pub version: i64,
    /// Next segment number to hand out.
    pub counter: u32,
    /// Generation of the commit this was read from or last written as.
    pub generation: u64,
    /// Segments in index order.
    pub segments: Vec<SegmentInfo>,
}

impl SegmentInfos {
    /// An empty segment list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the commit file for the current generation.
    pub fn segments_file_name(&self) -> String {
        file_names::segments_file_name(self.generation)
    }

    /// Reserve the next segment name.
    pub fn new_segment_name(&mut self) -> String {
        let name = file_names::segment_name(self.counter as u64);
        self.counter += 1;
        name
    }

    /// Total documents, deleted ones included.
    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    /// Files referenced by this commit, optionally with the commit file.
    pub fn files(&self, include_segments_file: bool) -> Vec<String> {
        let mut files: Vec<String> = self.segments.iter().flat_map(SegmentInfo::files).collect();
        if include_segments_file && self.generation > 0 {
            files.push(self.segments_file_name());
        }
        files
    }

    /// Read the commit file `name`, verifying its checksum.
    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let generation = file_names::generation_from_segments_file_name(name)
            .ok_or_else(|| PilumError::invalid_argument(format!("{name} is not a commit file")))?;

        let mut input = storage.open_input(name)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        input.close()?;

        if bytes.len() < 8 {
            return Err(PilumError::corrupt(format!("{name}: truncated commit file")));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 8);
        let expected = Cursor::new(trailer).read_long()?;
        let actual = crc32fast::hash(body) as i64;
        if expected != actual {
            return Err(PilumError::corrupt(format!(
                "{name}: checksum mismatch (expected {expected:#x}, got {actual:#x})"
            )));
        }

        let mut input = Cursor::new(body);
        let format = input.read_int()?;
        if format != FORMAT {
            return Err(PilumError::corrupt(format!("{name}: unknown format {format}")));
        }
        let version = input.read_long()?;
        let counter = input.read_int()?;
        let count = input.read_int()?;
        if counter < 0 || count < 0 {
            return Err(PilumError::corrupt(format!("{name}: negative counter or count")));
        }

        let mut segments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let seg_name = input.read_string()?;
            let doc_count = input.read_int()?;
            let del_gen = input.read_long()?;
            let is_compound = input.read_byte()? == 1;
            if doc_count < 0 {
                return Err(PilumError::corrupt(format!("{name}: negative doc count in {seg_name}")));
            }
            segments.push(SegmentInfo {
                name: seg_name,
                doc_count: doc_count as u32,
                del_gen,
                is_compound,
            });
        }

        Ok(SegmentInfos {
            version,
            counter: counter as u32,
            generation,
            segments,
        })
    }

    /// Read the newest commit in `storage`.
    pub fn read_latest(storage: &dyn Storage) -> Result<Self> {
        let files = storage.list_files()?;
        let generation = file_names::latest_generation(&files)
            .ok_or_else(|| PilumError::not_found("no segments file in index"))?;
        Self::read(storage, &file_names::segments_file_name(generation))
    }

    /// Write this segment list as the commit `generation + 1` and return the
    /// new file name.
    pub fn commit(&mut self, storage: &dyn Storage) -> Result<String> {
        self.generation += 1;
        self.version += 1;
        let name = self.segments_file_name();

        let mut body = Vec::new();
        body.write_int(FORMAT)?;
        body.write_long(self.version)?;
        body.write_int(self.counter as i32)?;
        body.write_int(self.segments.len() as i32)?;
        for segment in &self.segments {
            body.write_string(&segment.name)?;
            body.write_int(segment.doc_count as i32)?;
            body.write_long(segment.del_gen)?;
            body.write_byte(u8::from(segment.is_compound))?;
        }
        let checksum = crc32fast::hash(&body) as i64;
        body.write_long(checksum)?;

        let mut output = storage.create_output(&name)?;
        output.write_all(&body)?;
        output.flush_and_sync()?;
        output.close()?;

        debug!(file = %name, segments = self.segments.len(), "wrote commit");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn sample() -> SegmentInfos {
        let mut infos = SegmentInfos::new();
        let a = infos.new_segment_name();
        let b = infos.new_segment_name();
        infos.segments.push(SegmentInfo::new(a, 10, true));
        let mut seg = SegmentInfo::new(b, 3, false);
        seg.advance_del_gen();
        infos.segments.push(seg);
        infos
    }

    #[test]
    fn test_files() {
        let mut infos = sample();
        infos.generation = 2;
        let files = infos.files(true);
        assert_eq!(
            files,
            vec![
                "_0.cfs", "_1.fnm", "_1.fdx", "_1.fdt", "_1.tis", "_1.frq", "_1.nrm", "_1_1.del",
                "segments_2"
            ]
        );
        assert_eq!(infos.total_doc_count(), 13);
    }

    #[test]
    fn test_commit_and_read() {
        let storage = MemoryStorage::new_default();
        let mut infos = sample();
        assert_eq!(infos.commit(&storage).unwrap(), "segments_1");
        assert_eq!(infos.commit(&storage).unwrap(), "segments_2");

        let read = SegmentInfos::read_latest(&storage).unwrap();
        assert_eq!(read, infos);
        assert_eq!(read.counter, 2);
        assert_eq!(read.segments[1].deletes_file_name().as_deref(), Some("_1_1.del"));
    }

    #[test]
    fn test_checksum_mismatch() {
        let storage = MemoryStorage::new_default();
        let mut infos = sample();
        infos.commit(&storage).unwrap();

        let mut bytes = Vec::new();
        storage.open_input("segments_1").unwrap().read_to_end(&mut bytes).unwrap();
        bytes[5] ^= 0xFF;
        let mut output = storage.create_output("segments_1").unwrap();
        output.write_all(&bytes).unwrap();
        output.close().unwrap();

        let err = SegmentInfos::read(&storage, "segments_1").unwrap_err();
        assert!(matches!(err, PilumError::CorruptIndex(_)));
    }

    #[test]
    fn test_missing_commit() {
        let storage = MemoryStorage::new_default();
        assert!(SegmentInfos::read_latest(&storage).unwrap_err().is_not_found());
    }
}
