//! Named-file storage underneath the index.
//!
//! Everything the index persists goes through a [`Storage`]: segment files,
//! commit points, compound files and the writer lock. The index code never
//! builds a path itself. Implementations:
//!
//! - [`file::FileStorage`] keeps one OS file per name in a directory and can
//!   serve reads from a memory map.
//! - [`memory::MemoryStorage`] keeps immutable byte buffers in a map.
//! - [`compound::CompoundFileReader`] exposes the sub-files packed into a
//!   `.cfs` file of another storage, read-only.
//!
//! [`data`] holds the primitive encodings (vints, strings, big-endian longs)
//! shared by every file format.
//!
//! # Example
//!
//! ```
//! use pilum::storage::{StorageFactory, StorageConfig};
//! use pilum::storage::memory::MemoryStorageConfig;
//! use std::io::{Read, Write};
//!
//! # fn main() -> pilum::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//!
//! let mut output = storage.create_output("segments_1")?;
//! output.write_all(b"data")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("segments_1")?;
//! let mut buf = Vec::new();
//! input.read_to_end(&mut buf)?;
//! assert_eq!(buf, b"data");
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{PilumError, Result};

pub mod compound;
pub mod data;
pub mod file;
pub mod memory;

/// What a storage knows about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Length in bytes.
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: i64,
    pub readonly: bool,
}

/// A flat namespace of files.
///
/// Names never contain a path separator. Files are written once through a
/// [`StorageOutput`] and are immutable afterwards; the index replaces a file
/// only by writing a new name.
pub trait Storage: Send + Sync + Debug {
    /// Open `name` for reading. A missing file is [`PilumError::NotFound`].
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Open `name` with a read buffer of `buffer_size` bytes. Storages that
    /// do not buffer ignore the size.
    fn open_input_with_buffer(&self, name: &str, buffer_size: usize) -> Result<Box<dyn StorageInput>> {
        let _ = buffer_size;
        self.open_input(name)
    }

    /// Create `name`, replacing any previous content once the output closes.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    /// Remove `name`. Removing a file that is already gone succeeds.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// All file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    fn file_size(&self, name: &str) -> Result<u64>;

    fn metadata(&self, name: &str) -> Result<FileMetadata>;

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Take the exclusive lock `name`. While another holder keeps it this
    /// fails with [`PilumError::LockObtainFailed`].
    fn obtain_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;

    /// Make every closed output durable.
    fn sync(&self) -> Result<()>;

    /// Reject further operations and release every lock taken here.
    fn close(&self) -> Result<()>;
}

/// A readable, seekable file handle.
pub trait StorageInput: Read + Seek + Send + Debug {
    fn size(&self) -> Result<u64>;

    /// An independent handle on the same bytes, positioned where this one is.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    fn close(&mut self) -> Result<()>;
}

/// An append-only file handle. Content is published by [`close`](Self::close).
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and fsync them.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Bytes written so far.
    fn position(&self) -> Result<u64>;

    fn close(&mut self) -> Result<()>;
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        (**self).size()
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        (**self).clone_input()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        (**self).flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        (**self).position()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A held lock. Dropping it releases the lock.
pub trait StorageLock: Send + Debug {
    fn name(&self) -> &str;

    fn release(&mut self) -> Result<()>;

    /// Whether the lock is still held by this handle.
    fn is_valid(&self) -> bool;
}

/// Which storage [`StorageFactory::create`] builds.
///
/// ```
/// use pilum::storage::StorageConfig;
/// use pilum::storage::file::FileStorageConfig;
///
/// let mut file_config = FileStorageConfig::new("/data/index");
/// file_config.use_mmap = true;
/// let config = StorageConfig::File(file_config);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    File(file::FileStorageConfig),
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// Builds a shared storage from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        Ok(match config {
            StorageConfig::Memory(config) => Arc::new(memory::MemoryStorage::new(config)),
            StorageConfig::File(config) => {
                let path = config.path.clone();
                Arc::new(file::FileStorage::new(path, config)?)
            }
        })
    }
}

/// Failures raised inside the storage implementations before they are
/// folded into [`PilumError`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no such file: {0}")]
    FileNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("lock {0} is held")]
    LockFailed(String),

    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Classify an I/O error raised while working on `name`.
    pub(crate) fn from_io(name: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => StorageError::FileNotFound(name.to_string()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(name.to_string()),
            _ => StorageError::Io {
                name: name.to_string(),
                source,
            },
        }
    }
}

impl From<StorageError> for PilumError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileNotFound(name) => PilumError::NotFound(name),
            StorageError::LockFailed(name) => PilumError::LockObtainFailed(name),
            StorageError::Closed => PilumError::AlreadyClosed("storage".to_string()),
            other => PilumError::storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorageConfig;
    use crate::storage::memory::MemoryStorageConfig;

    #[test]
    fn test_default_config_is_memory() {
        assert!(matches!(
            StorageConfig::default(),
            StorageConfig::Memory(MemoryStorageConfig { initial_capacity: 16 })
        ));
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: PilumError = StorageError::FileNotFound("_0.tis".to_string()).into();
        assert!(err.is_not_found());

        let err: PilumError = StorageError::Closed.into();
        assert!(err.is_already_closed());

        let err: PilumError = StorageError::LockFailed("write.lock".to_string()).into();
        assert!(matches!(err, PilumError::LockObtainFailed(_)));

        let err = StorageError::from_io("_0.frq", io::Error::other("disk on fire"));
        assert_eq!(err.to_string(), "I/O error on _0.frq: disk on fire");
        let err = StorageError::from_io("_0.frq", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, StorageError::FileNotFound(name) if name == "_0.frq"));
    }

    #[test]
    fn test_factory_builds_both_kinds() {
        let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default())).unwrap();
        assert!(!storage.file_exists("segments_1"));

        let dir = tempfile::TempDir::new().unwrap();
        let mut config = FileStorageConfig::new(dir.path());
        config.use_mmap = true;
        let storage = StorageFactory::create(StorageConfig::File(config)).unwrap();

        let mut output = storage.create_output("_0.fdt").unwrap();
        output.write_all(b"stored fields").unwrap();
        output.close().unwrap();

        let mut buf = Vec::new();
        storage.open_input("_0.fdt").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"stored fields");
    }

    #[test]
    fn test_config_serde() {
        let config = StorageConfig::File(FileStorageConfig::new("/tmp/idx"));
        let json = serde_json::to_string(&config).unwrap();
        match serde_json::from_str::<StorageConfig>(&json).unwrap() {
            StorageConfig::File(c) => assert_eq!(c.path, std::path::PathBuf::from("/tmp/idx")),
            other => panic!("unexpected config {other:?}"),
        }
    }
}
