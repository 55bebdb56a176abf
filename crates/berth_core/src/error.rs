//! Error types for the state engine.

use berth_codec::CodecError;
use berth_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for state engine operations.
pub type StateResult<T> = Result<T, StateError>;

/// Coarse classification of a [`StateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A record, or the parent it depends on, does not exist.
    NotFound,
    /// Stored bytes could not be decoded, or a record could not be encoded.
    EncodingFailure,
    /// The durable store or the index store failed.
    StoreFailure,
    /// A resource identifier could not be assigned.
    IdentifierGenerationFailure,
}

/// Errors returned by the state engine.
#[derive(Debug, Error)]
pub enum StateError {
    /// Requested record or its required parent does not exist.
    #[error("{kind} not found: {id:?}")]
    NotFound {
        /// Entity kind that was looked up.
        kind: &'static str,
        /// Resource id (or name) that was looked up.
        id: String,
    },

    /// A record failed to encode or decode.
    #[error("failed to {op} {kind} record {key:?}: {source}")]
    Encoding {
        /// Entity kind of the record.
        kind: &'static str,
        /// Key of the offending record.
        key: String,
        /// `"encode"` or `"decode"`.
        op: &'static str,
        /// Codec failure.
        #[source]
        source: CodecError,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the storage backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The record log is damaged.
    #[error("record log corruption: {message}")]
    Corruption {
        /// Description of the damage.
        message: String,
    },

    /// A log record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Log offset of the record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A bucket was used before being registered.
    #[error("bucket not registered: {bucket}")]
    BucketMissing {
        /// Bucket name.
        bucket: String,
    },

    /// An index rejected a row.
    #[error("index {table}.{index}: {message}")]
    IndexConstraint {
        /// Table name.
        table: &'static str,
        /// Index name.
        index: &'static str,
        /// What was violated.
        message: String,
    },

    /// A resource id could not be assigned.
    #[error("failed to generate resource id for {kind}: {message}")]
    IdGeneration {
        /// Entity kind the id was for.
        kind: &'static str,
        /// Reason.
        message: String,
    },

    /// The state directory is held by another process.
    #[error("state directory locked: another process has exclusive access")]
    DatabaseLocked,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why it was refused.
        message: String,
    },
}

impl StateError {
    /// Creates a not found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a codec failure hit while encoding `key`.
    pub fn encode_failed(kind: &'static str, key: &[u8], source: CodecError) -> Self {
        Self::Encoding {
            kind,
            key: String::from_utf8_lossy(key).into_owned(),
            op: "encode",
            source,
        }
    }

    /// Wraps a codec failure hit while decoding `key`.
    pub fn decode_failed(kind: &'static str, key: &[u8], source: CodecError) -> Self {
        Self::Encoding {
            kind,
            key: String::from_utf8_lossy(key).into_owned(),
            op: "decode",
            source,
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Encoding { .. } => ErrorKind::EncodingFailure,
            Self::IdGeneration { .. } => ErrorKind::IdentifierGenerationFailure,
            Self::Storage(_)
            | Self::Io(_)
            | Self::Corruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::BucketMissing { .. }
            | Self::IndexConstraint { .. }
            | Self::DatabaseLocked
            | Self::InvalidOperation { .. } => ErrorKind::StoreFailure,
        }
    }

    /// True for [`ErrorKind::NotFound`], the expected negative result of a lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
