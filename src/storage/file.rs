//! A storage backed by one directory on the local file system.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PilumError, Result};
use crate::storage::{FileMetadata, Storage, StorageError, StorageInput, StorageLock, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the index files.
    pub path: PathBuf,

    /// Read and write buffer size in bytes, unless a caller asks for another.
    pub buffer_size: usize,

    /// Read through memory maps instead of buffered handles.
    pub use_mmap: bool,

    /// Fsync each output when it is closed.
    pub sync_writes: bool,

    /// Create a lock file for every obtained lock. Without lock files a lock
    /// only excludes holders in the same process.
    pub use_locking: bool,
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            buffer_size: 64 * 1024,
            use_mmap: false,
            sync_writes: false,
            use_locking: true,
        }
    }
}

/// Index files as plain files in one directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
    locks: Arc<FileLocks>,
    closed: AtomicBool,
}

impl FileStorage {
    /// Use `directory`, creating it when it does not exist yet.
    pub fn new<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(|e| {
                PilumError::storage(format!("cannot create {}: {e}", directory.display()))
            })?;
        }
        if !directory.is_dir() {
            return Err(PilumError::storage(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        let locks = Arc::new(FileLocks {
            directory: directory.clone(),
            lock_files: config.use_locking,
            held: Mutex::new(AHashMap::new()),
        });
        Ok(FileStorage {
            directory,
            config,
            locks,
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.open_input_with_buffer(name, self.config.buffer_size)
    }

    fn open_input_with_buffer(&self, name: &str, buffer_size: usize) -> Result<Box<dyn StorageInput>> {
        self.ensure_open()?;
        let path = self.path_of(name);
        let file = File::open(&path).map_err(|e| StorageError::from_io(name, e))?;

        if self.config.use_mmap {
            let len = file.metadata().map_err(|e| StorageError::from_io(name, e))?.len();
            // Zero-length files cannot be mapped on every platform.
            if len > 0 {
                // SAFETY: index files are never modified after their output closes.
                let map = unsafe { Mmap::map(&file) }.map_err(|e| StorageError::from_io(name, e))?;
                return Ok(Box::new(MmapInput::new(Arc::new(map))));
            }
        }

        Ok(Box::new(FileInput::open(file, path, buffer_size)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.ensure_open()?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path_of(name))
            .map_err(|e| StorageError::from_io(name, e))?;
        Ok(Box::new(FileOutput {
            writer: BufWriter::with_capacity(self.config.buffer_size.max(1), file),
            sync_on_close: self.config.sync_writes,
            written: 0,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        !self.closed.load(Ordering::Acquire) && self.path_of(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        match fs::remove_file(self.path_of(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(StorageError::from_io(name, e).into()),
            _ => Ok(()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let dir_name = self.directory.display().to_string();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory).map_err(|e| StorageError::from_io(&dir_name, e))? {
            let path = entry.map_err(|e| StorageError::from_io(&dir_name, e))?.path();
            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.metadata(name)?.size)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.ensure_open()?;
        let meta = self
            .path_of(name)
            .metadata()
            .map_err(|e| StorageError::from_io(name, e))?;
        let modified = meta
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or_default();
        Ok(FileMetadata {
            size: meta.len(),
            modified,
            readonly: meta.permissions().readonly(),
        })
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.ensure_open()?;
        fs::rename(self.path_of(old_name), self.path_of(new_name))
            .map_err(|e| StorageError::from_io(old_name, e).into())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        self.ensure_open()?;
        self.locks.obtain(name)
    }

    fn sync(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.locks.release_all()
    }
}

/// A buffered read handle on one file.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    path: PathBuf,
    size: u64,
}

impl FileInput {
    fn open(file: File, path: PathBuf, buffer_size: usize) -> Result<Self> {
        let name = path.display().to_string();
        let size = file.metadata().map_err(|e| StorageError::from_io(&name, e))?.len();
        Ok(FileInput {
            reader: BufReader::with_capacity(buffer_size.max(1), file),
            path,
            size,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let name = self.path.display().to_string();
        let file = File::open(&self.path).map_err(|e| StorageError::from_io(&name, e))?;
        let mut clone = FileInput::open(file, self.path.clone(), self.reader.capacity())?;
        // The OS cursor is ahead of the logical one by whatever is still buffered.
        let logical = self.reader.get_ref().stream_position()? - self.reader.buffer().len() as u64;
        clone.seek(SeekFrom::Start(logical))?;
        Ok(Box::new(clone))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SharedMap(Arc<Mmap>);

impl AsRef<[u8]> for SharedMap {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// A read handle over a memory map. Clones share the map.
#[derive(Debug)]
pub struct MmapInput {
    cursor: Cursor<SharedMap>,
}

impl MmapInput {
    fn new(map: Arc<Mmap>) -> Self {
        MmapInput {
            cursor: Cursor::new(SharedMap(map)),
        }
    }
}

impl Read for MmapInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MmapInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MmapInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().as_ref().len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let mut cursor = Cursor::new(self.cursor.get_ref().clone());
        cursor.set_position(self.cursor.position());
        Ok(Box::new(MmapInput { cursor }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A buffered write handle.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    sync_on_close: bool,
    written: u64,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.written)
    }

    fn close(&mut self) -> Result<()> {
        if self.sync_on_close {
            return self.flush_and_sync();
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Locks taken through one [`FileStorage`].
///
/// A lock is exclusive within the process through `held`, and across
/// processes through a `create_new` lock file when lock files are enabled.
#[derive(Debug)]
struct FileLocks {
    directory: PathBuf,
    lock_files: bool,
    held: Mutex<AHashMap<String, Arc<Mutex<LockState>>>>,
}

impl FileLocks {
    fn obtain(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        let mut held = self.held.lock();
        if held.get(name).is_some_and(|state| !state.lock().released) {
            return Err(StorageError::LockFailed(name.to_string()).into());
        }

        let path = self.directory.join(name);
        let file = if self.lock_files {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => StorageError::LockFailed(name.to_string()),
                    _ => StorageError::from_io(name, e),
                })?;
            Some(file)
        } else {
            None
        };

        debug!(lock = name, "obtained lock");
        let state = Arc::new(Mutex::new(LockState {
            path,
            file,
            released: false,
        }));
        held.insert(name.to_string(), Arc::clone(&state));
        Ok(Box::new(FileLock {
            name: name.to_string(),
            state,
        }))
    }

    fn release_all(&self) -> Result<()> {
        for (_, state) in self.held.lock().drain() {
            state.lock().release()?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LockState {
    path: PathBuf,
    file: Option<File>,
    released: bool,
}

impl LockState {
    fn release(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.released, true) {
            return Ok(());
        }
        if self.file.take().is_some() {
            match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => {
                    return Err(StorageError::from_io(&self.path.display().to_string(), e).into());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FileLock {
    name: String,
    state: Arc<Mutex<LockState>>,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        self.state.lock().release()
    }

    fn is_valid(&self) -> bool {
        !self.state.lock().released
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.state.lock().release() {
            warn!(lock = %self.name, error = %e, "failed to release lock on drop");
        }
    }
}
