//! Error types for the Pilum library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`PilumError`] enum. Storage-level failures that callers routinely branch
//! on (missing files, closed stores, reads past the end of a sub-file) have
//! their own variants so they can be matched without string inspection.
//!
//! # Examples
//!
//! ```
//! use pilum::error::{PilumError, Result};
//!
//! fn open_segment(name: &str) -> Result<()> {
//!     Err(PilumError::not_found(name))
//! }
//!
//! match open_segment("_0.cfs") {
//!     Err(e) if e.is_not_found() => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Pilum operations.
#[derive(Error, Debug)]
pub enum PilumError {
    /// I/O errors from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A named file or sub-file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource was already closed.
    #[error("Already closed: {0}")]
    AlreadyClosed(String),

    /// A read would cross the end of a bounded input.
    #[error("Read past EOF: position {position} + {len} bytes exceeds length {length}")]
    OutOfBoundsRead {
        /// Cursor position at the start of the read.
        position: u64,
        /// Number of bytes requested.
        len: u64,
        /// Logical length of the input.
        length: u64,
    },

    /// The operation is not supported by this implementation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The directory header of a compound file could not be parsed.
    #[error("Malformed compound directory: {0}")]
    MalformedDirectory(String),

    /// An index file is corrupt or has an unknown format.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Commit points were not presented in strictly increasing generation order.
    #[error("Commit order violation: {0}")]
    CommitOrder(String),

    /// A storage lock could not be obtained.
    #[error("Lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// A boolean query exceeded the maximum clause count.
    #[error("Too many clauses: maximum is {0}")]
    TooManyClauses(usize),

    /// Index-related errors.
    #[error("Index error: {0}")]
    Index(String),

    /// Query-related errors.
    #[error("Query error: {0}")]
    Query(String),

    /// Storage-related errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Field-related errors.
    #[error("Field error: {0}")]
    Field(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation for the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PilumError.
pub type Result<T> = std::result::Result<T, PilumError>;

impl PilumError {
    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PilumError::NotFound(msg.into())
    }

    /// Create a new already closed error.
    pub fn already_closed<S: Into<String>>(msg: S) -> Self {
        PilumError::AlreadyClosed(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        PilumError::UnsupportedOperation(msg.into())
    }

    /// Create a new malformed directory error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        PilumError::MalformedDirectory(msg.into())
    }

    /// Create a new corrupt index error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        PilumError::CorruptIndex(msg.into())
    }

    /// Create a new commit order error.
    pub fn commit_order<S: Into<String>>(msg: S) -> Self {
        PilumError::CommitOrder(msg.into())
    }

    /// Create a new lock obtain error.
    pub fn lock_obtain_failed<S: Into<String>>(msg: S) -> Self {
        PilumError::LockObtainFailed(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PilumError::Index(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        PilumError::Query(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PilumError::Storage(msg.into())
    }

    /// Create a new field error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        PilumError::Field(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PilumError::InvalidArgument(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        PilumError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PilumError::Other(msg.into())
    }

    /// Whether this error reports a missing file.
    ///
    /// I/O errors of kind [`io::ErrorKind::NotFound`] count as well.
    pub fn is_not_found(&self) -> bool {
        match self {
            PilumError::NotFound(_) => true,
            PilumError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error reports use of a closed resource.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, PilumError::AlreadyClosed(_))
    }

    /// Whether this error reports a read crossing the end of a bounded
    /// input such as a compound sub-file.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, PilumError::OutOfBoundsRead { .. })
    }
}

/// Errors that travelled through `std::io` as the payload of an
/// [`io::Error`] come back out as themselves.
impl From<io::Error> for PilumError {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<PilumError>()) {
            return PilumError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<PilumError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => PilumError::Io(io::Error::other(inner)),
            None => PilumError::other("empty I/O error payload"),
        }
    }
}

impl From<PilumError> for io::Error {
    fn from(err: PilumError) -> Self {
        match err {
            PilumError::Io(e) => e,
            PilumError::OutOfBoundsRead { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            PilumError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PilumError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = PilumError::not_found("_0.fnm");
        assert_eq!(error.to_string(), "Not found: _0.fnm");
        assert!(error.is_not_found());

        let error = PilumError::OutOfBoundsRead {
            position: 8,
            len: 4,
            length: 10,
        };
        assert_eq!(
            error.to_string(),
            "Read past EOF: position 8 + 4 bytes exceeds length 10"
        );
        assert!(error.is_out_of_bounds());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let pilum_error = PilumError::from(io_error);

        match pilum_error {
            PilumError::Io(ref e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            _ => panic!("Expected IO error variant"),
        }
        assert!(pilum_error.is_not_found());
    }

    #[test]
    fn test_out_of_bounds_survives_io_round_trip() {
        let err = PilumError::OutOfBoundsRead {
            position: 0,
            len: 1,
            length: 0,
        };
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);

        let back = PilumError::from(io_err);
        assert!(matches!(
            back,
            PilumError::OutOfBoundsRead { position: 0, len: 1, length: 0 }
        ));
    }

    #[test]
    fn test_plain_eof_is_not_out_of_bounds() {
        let err = PilumError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, PilumError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(!err.is_out_of_bounds());

        let closed: io::Error = PilumError::already_closed("_0.cfs").into();
        assert!(PilumError::from(closed).is_already_closed());
    }
}
