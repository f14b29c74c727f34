//! Error types for dupvault_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using dupvault_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during storage operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Blob not found in the blob store.
    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    /// Logical record not found in the ledger.
    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    /// A reference was registered against a digest the ledger has never
    /// seen. Internal-consistency fault; does not occur under the
    /// orchestrator protocol.
    #[error("Unknown digest in ledger: {digest}")]
    UnknownDigest { digest: String },

    /// Blob file is corrupted or does not match its digest.
    #[error("Corrupted blob at {path}: {reason}")]
    CorruptedBlob { path: PathBuf, reason: String },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Blob file header is malformed.
    #[error("Invalid blob header: {reason}")]
    InvalidHeader { reason: String },

    /// Invalid record id format.
    #[error("Invalid record id: {reason}")]
    InvalidRecordId { reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Store config file is malformed.
    #[error("Config error: {reason}")]
    Config { reason: String },

    /// Journal entry could not be written or encoded.
    #[error("Journal error: {reason}")]
    Journal { reason: String },

    /// Compression or decompression failed.
    #[error("Compression error: {reason}")]
    Compression { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
}

impl Error {
    /// Create a BlobNotFound error.
    pub fn blob_not_found(digest: impl Into<String>) -> Self {
        Error::BlobNotFound {
            digest: digest.into(),
        }
    }

    /// Create a RecordNotFound error.
    pub fn record_not_found(id: impl ToString) -> Self {
        Error::RecordNotFound { id: id.to_string() }
    }

    /// Create an UnknownDigest error.
    pub fn unknown_digest(digest: impl Into<String>) -> Self {
        Error::UnknownDigest {
            digest: digest.into(),
        }
    }

    /// Create a CorruptedBlob error.
    pub fn corrupted_blob(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedBlob {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHeader error.
    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Error::InvalidHeader {
            reason: reason.into(),
        }
    }

    /// Create an InvalidRecordId error.
    pub fn invalid_record_id(reason: impl Into<String>) -> Self {
        Error::InvalidRecordId {
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Create a Journal error.
    pub fn journal(reason: impl Into<String>) -> Self {
        Error::Journal {
            reason: reason.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// True for the "already deleted or never existed" family of
    /// failures, which callers may treat as benign on delete.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound { .. } | Error::BlobNotFound { .. }
        )
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
