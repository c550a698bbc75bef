//! Compound files: many logical files packed into one physical file.
//!
//! A compound file starts with a directory followed by the raw bytes of every
//! sub-file, back to back:
//!
//! ```text
//! VInt   entry count
//! repeat entry count times:
//!     Int64  offset   (absolute position of the sub-file in this file)
//!     String name
//! [bytes of sub-file 0][bytes of sub-file 1]...
//! ```
//!
//! A sub-file's length is the distance to the next entry's offset; the last
//! one runs to the end of the physical file.
//!
//! [`CompoundFileReader`] exposes the sub-files through the [`Storage`]
//! trait. Every [`CompoundInput`] it hands out shares the reader's single
//! physical handle, which is locked for the duration of each seek-and-read.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{PilumError, Result};
use crate::storage::data::{DataInput, DataOutput, string_encoded_len};
use crate::storage::{FileMetadata, Storage, StorageInput, StorageLock, StorageOutput};
use crate::util::varint;

/// Default refill size of a virtual sub-file handle.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

const COPY_BUFFER_SIZE: usize = 16 * 1024;

type SharedStream = Arc<Mutex<Option<Box<dyn StorageInput>>>>;

/// Location of one sub-file inside a compound file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

/// Read-only [`Storage`] over the sub-files of one compound file.
#[derive(Debug)]
pub struct CompoundFileReader {
    directory: Arc<dyn Storage>,
    file_name: String,
    read_buffer_size: usize,
    stream: SharedStream,
    closed: AtomicBool,
    entries: AHashMap<String, FileEntry>,
    names: Vec<String>,
}

impl CompoundFileReader {
    /// Open `name` in `directory` with the default buffer size.
    pub fn open(directory: Arc<dyn Storage>, name: &str) -> Result<Self> {
        Self::open_with_buffer(directory, name, DEFAULT_BUFFER_SIZE)
    }

    /// Open `name` in `directory`, using `read_buffer_size` both for the
    /// physical handle and as the default for sub-file handles.
    ///
    /// If the directory header cannot be parsed the physical handle is closed
    /// before the error is returned.
    pub fn open_with_buffer(
        directory: Arc<dyn Storage>,
        name: &str,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let mut stream = directory.open_input_with_buffer(name, read_buffer_size)?;

        let (names, entries) = match read_directory(stream.as_mut()) {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Err(close_err) = stream.close() {
                    warn!(file = name, error = %close_err, "ignoring close failure after bad compound header");
                }
                return Err(match e {
                    PilumError::MalformedDirectory(_) => e,
                    other => PilumError::malformed(format!("{name}: {other}")),
                });
            }
        };

        debug!(file = name, entries = names.len(), "opened compound file");

        Ok(CompoundFileReader {
            directory,
            file_name: name.to_string(),
            read_buffer_size,
            stream: Arc::new(Mutex::new(Some(stream))),
            closed: AtomicBool::new(false),
            entries,
            names,
        })
    }

    /// The storage holding the physical compound file.
    pub fn directory(&self) -> &Arc<dyn Storage> {
        &self.directory
    }

    /// Name of the physical compound file.
    pub fn name(&self) -> &str {
        &self.file_name
    }

    /// Location of a sub-file, if present.
    pub fn entry(&self, name: &str) -> Option<FileEntry> {
        self.entries.get(name).copied()
    }

    /// All sub-files with their locations, in directory order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, FileEntry)> {
        self.names
            .iter()
            .filter_map(|n| self.entries.get(n).map(|e| (n.as_str(), *e)))
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PilumError::already_closed(format!("{}: stream closed", self.file_name)))
        } else {
            Ok(())
        }
    }

    fn lookup(&self, name: &str) -> Result<FileEntry> {
        self.entries.get(name).copied().ok_or_else(|| {
            PilumError::not_found(format!("no sub-file with id {name} found in {}", self.file_name))
        })
    }
}

fn read_directory(
    stream: &mut dyn StorageInput,
) -> Result<(Vec<String>, AHashMap<String, FileEntry>)> {
    let physical_length = stream.size()?;
    let count = stream.read_vint()? as usize;

    let mut listed: Vec<(String, u64)> = Vec::with_capacity(count.min(1024));
    let mut seen = AHashSet::with_capacity(count.min(1024));
    for _ in 0..count {
        let offset = stream.read_long()?;
        let name = stream.read_string()?;

        let offset = u64::try_from(offset)
            .map_err(|_| PilumError::malformed(format!("negative offset {offset} for {name}")))?;
        if offset > physical_length {
            return Err(PilumError::malformed(format!(
                "offset {offset} for {name} is past the end ({physical_length})"
            )));
        }
        if listed.last().is_some_and(|(_, prev)| offset < *prev) {
            return Err(PilumError::malformed(format!("offset of {name} precedes its predecessor")));
        }
        if !seen.insert(name.clone()) {
            return Err(PilumError::malformed(format!("duplicate sub-file {name}")));
        }
        listed.push((name, offset));
    }

    let header_end = stream.stream_position()?;
    if listed.first().is_some_and(|(_, first)| *first < header_end) {
        return Err(PilumError::malformed("first sub-file overlaps the directory"));
    }

    let mut entries = AHashMap::with_capacity(listed.len());
    let mut names = Vec::with_capacity(listed.len());
    for (i, (name, offset)) in listed.iter().enumerate() {
        let end = listed.get(i + 1).map_or(physical_length, |(_, next)| *next);
        entries.insert(
            name.clone(),
            FileEntry {
                offset: *offset,
                length: end - offset,
            },
        );
        names.push(name.clone());
    }

    Ok((names, entries))
}

impl Storage for CompoundFileReader {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.open_input_with_buffer(name, self.read_buffer_size)
    }

    fn open_input_with_buffer(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> Result<Box<dyn StorageInput>> {
        let guard = self.stream.lock();
        if guard.is_none() {
            return Err(PilumError::already_closed(format!("{}: stream closed", self.file_name)));
        }
        let entry = self.lookup(name)?;
        Ok(Box::new(CompoundInput::new(
            Arc::clone(&self.stream),
            entry,
            buffer_size,
        )))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Err(PilumError::unsupported(format!(
            "cannot create {name} inside compound file {}",
            self.file_name
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        !self.closed.load(Ordering::Acquire) && self.entries.contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        Err(PilumError::unsupported(format!(
            "cannot delete {name} inside compound file {}",
            self.file_name
        )))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.names.clone())
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.check_open()?;
        Ok(self.lookup(name)?.length)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.check_open()?;
        let entry = self.lookup(name)?;
        let outer = self.directory.metadata(&self.file_name)?;
        Ok(FileMetadata {
            size: entry.length,
            modified: outer.modified,
            readonly: true,
        })
    }

    fn rename_file(&self, old_name: &str, _new_name: &str) -> Result<()> {
        Err(PilumError::unsupported(format!(
            "cannot rename {old_name} inside compound file {}",
            self.file_name
        )))
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        Err(PilumError::unsupported(format!(
            "cannot lock {name} inside compound file {}",
            self.file_name
        )))
    }

    fn sync(&self) -> Result<()> {
        self.check_open()
    }

    /// Release the physical handle. Sub-file handles still alive fail on
    /// their next refill.
    fn close(&self) -> Result<()> {
        let stream = self.stream.lock().take();
        let Some(mut stream) = stream else {
            return Err(PilumError::already_closed(format!("{}: already closed", self.file_name)));
        };
        self.closed.store(true, Ordering::Release);
        debug!(file = %self.file_name, "closed compound file");
        stream.close()
    }
}

fn read_at(base: &SharedStream, entry: FileEntry, position: u64, buf: &mut [u8]) -> Result<()> {
    let mut guard = base.lock();
    let stream = guard
        .as_mut()
        .ok_or_else(|| PilumError::already_closed("compound stream closed"))?;
    let len = buf.len() as u64;
    if position.checked_add(len).is_none_or(|end| end > entry.length) {
        return Err(PilumError::OutOfBoundsRead {
            position,
            len,
            length: entry.length,
        });
    }
    stream.seek(SeekFrom::Start(entry.offset + position))?;
    stream.read_exact(buf)?;
    Ok(())
}

/// A buffered cursor over one sub-file of a compound file.
///
/// Seeking only moves the logical cursor; the shared physical handle is
/// positioned on the next refill. [`Read::read`] returns short reads at the
/// end of the sub-file, while [`Read::read_exact`],
/// [`CompoundInput::read_bytes`] and [`CompoundInput::read_at`] reject any
/// request crossing it with [`PilumError::OutOfBoundsRead`].
#[derive(Debug)]
pub struct CompoundInput {
    base: SharedStream,
    entry: FileEntry,
    buffer: Vec<u8>,
    buffer_size: usize,
    buffer_start: u64,
    buffer_len: usize,
    buffer_pos: usize,
}

impl CompoundInput {
    fn new(base: SharedStream, entry: FileEntry, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        CompoundInput {
            base,
            entry,
            buffer: vec![0u8; buffer_size],
            buffer_size,
            buffer_start: 0,
            buffer_len: 0,
            buffer_pos: 0,
        }
    }

    /// Current logical position within the sub-file.
    pub fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    /// Length of the sub-file.
    pub fn length(&self) -> u64 {
        self.entry.length
    }

    /// Read exactly `buf.len()` bytes at `position`, bypassing the buffer and
    /// leaving the cursor untouched.
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        read_at(&self.base, self.entry, position, buf)
    }

    /// Read exactly `buf.len()` bytes from the cursor.
    ///
    /// Fails with [`PilumError::OutOfBoundsRead`] without consuming anything
    /// if the sub-file has fewer bytes left.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let position = self.file_pointer();
        let len = buf.len() as u64;
        if position.checked_add(len).is_none_or(|end| end > self.entry.length) {
            return Err(PilumError::OutOfBoundsRead {
                position,
                len,
                length: self.entry.length,
            });
        }
        self.fill(buf)?;
        Ok(())
    }

    fn refill(&mut self) -> Result<bool> {
        let start = self.file_pointer();
        if start >= self.entry.length {
            return Ok(false);
        }
        let n = (self.entry.length - start).min(self.buffer_size as u64) as usize;
        read_at(&self.base, self.entry, start, &mut self.buffer[..n])?;
        self.buffer_start = start;
        self.buffer_len = n;
        self.buffer_pos = 0;
        Ok(true)
    }

    fn fill(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            if self.buffer_pos >= self.buffer_len {
                let wanted = out.len() - copied;
                if wanted >= self.buffer_size {
                    let start = self.file_pointer();
                    let n = (wanted as u64).min(self.entry.length.saturating_sub(start)) as usize;
                    if n == 0 {
                        break;
                    }
                    read_at(&self.base, self.entry, start, &mut out[copied..copied + n])?;
                    self.buffer_start = start + n as u64;
                    self.buffer_len = 0;
                    self.buffer_pos = 0;
                    copied += n;
                    continue;
                }
                if !self.refill()? {
                    break;
                }
            }
            let n = (self.buffer_len - self.buffer_pos).min(out.len() - copied);
            out[copied..copied + n]
                .copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + n]);
            self.buffer_pos += n;
            copied += n;
        }
        Ok(copied)
    }
}

impl Read for CompoundInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf)?)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Ok(self.read_bytes(buf)?)
    }
}

impl Seek for CompoundInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.entry.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.file_pointer().checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of sub-file"))?;

        let buffered_end = self.buffer_start + self.buffer_len as u64;
        if target >= self.buffer_start && target < buffered_end {
            self.buffer_pos = (target - self.buffer_start) as usize;
        } else {
            self.buffer_start = target;
            self.buffer_len = 0;
            self.buffer_pos = 0;
        }
        Ok(target)
    }
}

impl StorageInput for CompoundInput {
    fn size(&self) -> Result<u64> {
        Ok(self.entry.length)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let mut clone = CompoundInput::new(Arc::clone(&self.base), self.entry, self.buffer_size);
        clone.buffer_start = self.file_pointer();
        Ok(Box::new(clone))
    }

    /// Sub-file handles own nothing; the compound reader owns the stream.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Packs existing files of a storage into one compound file.
#[derive(Debug)]
pub struct CompoundFileWriter {
    directory: Arc<dyn Storage>,
    file_name: String,
    entries: Vec<String>,
    ids: AHashSet<String>,
    merged: bool,
}

impl CompoundFileWriter {
    /// Prepare to write compound file `name` into `directory`.
    pub fn new(directory: Arc<dyn Storage>, name: &str) -> Self {
        CompoundFileWriter {
            directory,
            file_name: name.to_string(),
            entries: Vec::new(),
            ids: AHashSet::new(),
            merged: false,
        }
    }

    /// Name of the compound file being written.
    pub fn name(&self) -> &str {
        &self.file_name
    }

    /// Register a file of the directory to be packed. Order is preserved.
    pub fn add_file(&mut self, name: &str) -> Result<()> {
        if self.merged {
            return Err(PilumError::already_closed(format!("{} already merged", self.file_name)));
        }
        if !self.ids.insert(name.to_string()) {
            return Err(PilumError::invalid_argument(format!("file {name} already added")));
        }
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Write the directory and copy every registered file.
    pub fn close(&mut self) -> Result<()> {
        if self.merged {
            return Err(PilumError::already_closed(format!("{} already merged", self.file_name)));
        }
        if self.entries.is_empty() {
            return Err(PilumError::invalid_operation("no entries to merge have been defined"));
        }
        self.merged = true;

        let sizes = self
            .entries
            .iter()
            .map(|name| self.directory.file_size(name))
            .collect::<Result<Vec<u64>>>()?;
        let count = u32::try_from(self.entries.len())
            .map_err(|_| PilumError::invalid_argument("too many compound entries"))?;
        let header_len = varint::encoded_len_u32(count) as u64
            + self
                .entries
                .iter()
                .map(|name| 8 + string_encoded_len(name) as u64)
                .sum::<u64>();

        let mut output = self.directory.create_output(&self.file_name)?;
        output.write_vint(count)?;
        let mut offset = header_len;
        for (name, size) in self.entries.iter().zip(&sizes) {
            let encoded = i64::try_from(offset)
                .map_err(|_| PilumError::invalid_argument("compound file too large"))?;
            output.write_long(encoded)?;
            output.write_string(name)?;
            offset += size;
        }

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        for (name, &size) in self.entries.iter().zip(&sizes) {
            let mut input = self.directory.open_input(name)?;
            let mut remaining = size;
            while remaining > 0 {
                let chunk = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
                input.read_exact(&mut buffer[..chunk])?;
                io::Write::write_all(&mut output, &buffer[..chunk])?;
                remaining -= chunk as u64;
            }
            input.close()?;
        }

        let written = output.position()?;
        output.close()?;
        if written != offset {
            return Err(PilumError::corrupt(format!(
                "{}: wrote {written} bytes, expected {offset}",
                self.file_name
            )));
        }

        debug!(file = %self.file_name, entries = self.entries.len(), bytes = written, "wrote compound file");
        Ok(())
    }
}
