//! Logical upload records.
//!
//! Every upload event produces one [`LogicalRecord`], whether or not its
//! content was novel. The first record for a digest is the Original; any
//! later record for the same digest is a Reference aliasing the Original's
//! blob. Both kinds share one type, distinguished by [`RecordKind`].

use crate::digest::Digest;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of a logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Parse an id from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(RecordId)
            .map_err(|e| Error::invalid_record_id(format!("{}: {}", s, e)))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a record plays for its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    /// The first record created for a digest; the canonical identity for
    /// that content.
    Original,
    /// A later record aliasing an existing digest's blob. Permanently
    /// designates the Original it was created against, even after that
    /// Original record is deleted.
    Reference { original: RecordId },
}

/// One upload event as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Digest of the content this record points at.
    pub digest: Digest,
    /// Original filename declared at upload.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
    /// Content size in bytes.
    pub size: u64,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Original or Reference role.
    #[serde(flatten)]
    pub kind: RecordKind,
}

impl LogicalRecord {
    /// Create an Original record for novel content.
    pub fn new_original(digest: Digest, filename: &str, content_type: &str, size: u64) -> Self {
        Self {
            id: RecordId::new(),
            digest,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: now_unix(),
            kind: RecordKind::Original,
        }
    }

    /// Create a Reference record aliasing an existing Original's blob.
    pub fn new_reference(
        digest: Digest,
        filename: &str,
        content_type: &str,
        size: u64,
        original: RecordId,
    ) -> Self {
        Self {
            id: RecordId::new(),
            digest,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: now_unix(),
            kind: RecordKind::Reference { original },
        }
    }

    /// True if this record is the Original for its digest.
    pub fn is_original(&self) -> bool {
        matches!(self.kind, RecordKind::Original)
    }

    /// The Original this record derives from, if it is a Reference.
    pub fn original_id(&self) -> Option<RecordId> {
        match self.kind {
            RecordKind::Original => None,
            RecordKind::Reference { original } => Some(original),
        }
    }
}

/// Current unix time in seconds.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
