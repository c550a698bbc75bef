//! A storage that lives entirely in process memory.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{FileMetadata, Storage, StorageError, StorageInput, StorageLock, StorageOutput};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Number of file slots to reserve up front.
    pub initial_capacity: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        MemoryStorageConfig { initial_capacity: 16 }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    modified: i64,
}

type Files = Arc<RwLock<AHashMap<String, Entry>>>;
type HeldLocks = Arc<Mutex<AHashSet<String>>>;

/// Files kept as shared immutable buffers.
///
/// An output becomes visible when it is closed or dropped. An input reads the
/// buffer it was opened on, so replacing or deleting the file does not
/// disturb readers that already hold it.
#[derive(Debug)]
pub struct MemoryStorage {
    files: Files,
    locks: HeldLocks,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(AHashMap::with_capacity(config.initial_capacity))),
            locks: Arc::new(Mutex::new(AHashSet::new())),
            closed: AtomicBool::new(false),
        }
    }

    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Entry> {
        self.ensure_open()?;
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()).into())
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Sum of all file lengths.
    pub fn total_size(&self) -> u64 {
        self.files.read().values().map(|e| e.bytes.len() as u64).sum()
    }

    /// Backdate (or postdate) a file. Used to exercise age-based commit
    /// expiration.
    pub fn set_modified(&self, name: &str, modified: i64) -> Result<()> {
        self.ensure_open()?;
        match self.files.write().get_mut(name) {
            Some(entry) => {
                entry.modified = modified;
                Ok(())
            }
            None => Err(StorageError::FileNotFound(name.to_string()).into()),
        }
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let entry = self.entry(name)?;
        Ok(Box::new(MemoryInput::new(entry.bytes)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.ensure_open()?;
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
            published: false,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        !self.closed.load(Ordering::Acquire) && self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.files.write().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.entry(name)?.bytes.len() as u64)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        let entry = self.entry(name)?;
        Ok(FileMetadata {
            size: entry.bytes.len() as u64,
            modified: entry.modified,
            readonly: false,
        })
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut files = self.files.write();
        let entry = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;
        files.insert(new_name.to_string(), entry);
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        self.ensure_open()?;
        if !self.locks.lock().insert(name.to_string()) {
            return Err(StorageError::LockFailed(name.to_string()).into());
        }
        Ok(Box::new(MemoryLock {
            name: name.to_string(),
            locks: Arc::clone(&self.locks),
            held: true,
        }))
    }

    fn sync(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.locks.lock().clear();
        Ok(())
    }
}

/// A cursor over one published buffer.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
}

impl MemoryInput {
    fn new(bytes: Arc<[u8]>) -> Self {
        MemoryInput {
            cursor: Cursor::new(bytes),
        }
    }
}

impl From<Vec<u8>> for MemoryInput {
    fn from(bytes: Vec<u8>) -> Self {
        MemoryInput::new(Arc::from(bytes))
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let mut clone = MemoryInput::new(Arc::clone(self.cursor.get_ref()));
        clone.cursor.set_position(self.cursor.position());
        Ok(Box::new(clone))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects bytes and publishes them under its name on close.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: Files,
    published: bool,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.published {
            return Err(std::io::Error::other(format!("{} is already closed", self.name)));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        if self.published {
            return Ok(());
        }
        let entry = Entry {
            bytes: Arc::from(std::mem::take(&mut self.buffer)),
            modified: Utc::now().timestamp_millis(),
        };
        self.files.write().insert(self.name.clone(), entry);
        self.published = true;
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[derive(Debug)]
struct MemoryLock {
    name: String,
    locks: HeldLocks,
    held: bool,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.held, false) {
            self.locks.lock().remove(&self.name);
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.held && self.locks.lock().contains(&self.name)
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PilumError;

    #[test]
    fn test_output_visible_after_close() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("_0.frq").unwrap();
        output.write_all(b"postings").unwrap();
        assert_eq!(output.position().unwrap(), 8);
        assert!(!storage.file_exists("_0.frq"));
        output.close().unwrap();
        assert!(output.write_all(b"more").is_err());

        assert!(storage.file_exists("_0.frq"));
        assert_eq!(storage.file_size("_0.frq").unwrap(), 8);
        assert_eq!(storage.file_count(), 1);
        assert_eq!(storage.total_size(), 8);
    }

    #[test]
    fn test_open_input_survives_delete() {
        let storage = MemoryStorage::new_default();
        let mut output = storage.create_output("segments_1").unwrap();
        output.write_all(b"abc").unwrap();
        drop(output);

        let mut input = storage.open_input("segments_1").unwrap();
        storage.delete_file("segments_1").unwrap();
        assert!(!storage.file_exists("segments_1"));

        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");
        assert!(storage.open_input("segments_1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_and_modified_time() {
        let storage = MemoryStorage::new_default();
        storage.create_output("a").unwrap().close().unwrap();
        assert!(storage.metadata("a").unwrap().modified > 0);

        storage.rename_file("a", "b").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["b"]);

        storage.set_modified("b", 42).unwrap();
        assert_eq!(storage.metadata("b").unwrap().modified, 42);
        assert!(storage.rename_file("a", "c").unwrap_err().is_not_found());
        assert!(storage.set_modified("a", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let storage = MemoryStorage::new_default();
        let lock = storage.obtain_lock("write.lock").unwrap();
        assert!(lock.is_valid());
        assert!(matches!(
            storage.obtain_lock("write.lock"),
            Err(PilumError::LockObtainFailed(_))
        ));
        drop(lock);
        assert!(storage.obtain_lock("write.lock").is_ok());
    }

    #[test]
    fn test_clone_input_keeps_position() {
        let mut input = MemoryInput::from(b"0123456789".to_vec());
        input.seek(SeekFrom::Start(6)).unwrap();
        let mut clone = input.clone_input().unwrap();
        let mut buf = Vec::new();
        clone.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"6789");
        assert_eq!(input.size().unwrap(), 10);
    }

    #[test]
    fn test_closed_storage_rejects_operations() {
        let storage = MemoryStorage::new_default();
        let lock = storage.obtain_lock("write.lock").unwrap();
        storage.close().unwrap();
        assert!(!lock.is_valid());
        assert!(storage.open_input("x").unwrap_err().is_already_closed());
        assert!(!storage.file_exists("x"));
        assert!(storage.set_modified("x", 1).unwrap_err().is_already_closed());
    }
}
