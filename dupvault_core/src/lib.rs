//! Core library for dupvault, a content-deduplicating file store.
//!
//! Uploaded bodies are addressed by their BLAKE3-256 digest: the first
//! upload of a body stores one blob and creates an Original record;
//! every later upload of the same bytes creates a Reference record that
//! aliases the existing blob without writing it again. Records are
//! deleted independently; the blob is reclaimed exactly once, when the
//! last record pointing at it goes away.
//!
//! # Example
//!
//! ```no_run
//! use dupvault_core::{Algorithm, FileStore};
//!
//! # fn main() -> dupvault_core::Result<()> {
//! let store = FileStore::init("/tmp/my-vault", Algorithm::Blake3)?;
//!
//! let a = store.upload(b"hello", "a.txt", "text/plain")?;
//! let b = store.upload(b"hello", "b.txt", "text/plain")?;
//! assert!(a.is_original());
//! assert_eq!(b.original_id(), Some(a.id));
//!
//! // One blob on disk, two logical records
//! assert_eq!(store.count_for(&a.digest), 2);
//! println!("saved {} bytes", store.global_savings().saved_bytes);
//!
//! store.delete(a.id)?;
//! store.delete(b.id)?; // last record out: blob reclaimed
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod digest;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod metrics;
pub mod object;
pub mod record;
pub mod store;

pub use blob::BlobStore;
pub use digest::{Algorithm, DIGEST_SIZE, Digest};
pub use error::{Error, Result};
pub use journal::{Journal, JournalEntry};
pub use ledger::RefLedger;
pub use metrics::{SavingsReport, format_bytes};
pub use object::{BlobHeader, CompressionType, HEADER_SIZE};
pub use record::{LogicalRecord, RecordId, RecordKind};
pub use store::{Deletion, FileStore};
