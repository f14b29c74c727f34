//! Reference ledger: per-digest record membership and live counts.
//!
//! The ledger owns the mapping digest -> (count, Original id, Reference
//! ids) and every live [`LogicalRecord`]. All mutations take the state
//! write lock, so each transition is atomic with respect to concurrent
//! invocations; critical sections are pure in-memory map updates, with
//! hashing and blob I/O kept outside by the orchestrator.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::record::{LogicalRecord, RecordId, RecordKind};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Outcome of attempting to register an Original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// The digest was unseen; the record is installed as Original with
    /// count 1.
    Created,
    /// The digest is already live; the caller should create a Reference
    /// designating this Original instead.
    Exists {
        /// Id of the digest's Original record (possibly already deleted;
        /// the designation survives it).
        original: RecordId,
    },
}

/// Result of releasing a record from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Digest the released record pointed at.
    pub digest: Digest,
    /// Live records remaining for that digest after the decrement.
    /// Zero means the blob is ready for reclamation.
    pub remaining: usize,
}

/// One consistent ledger snapshot for the savings report: counts and
/// byte totals all read under the same lock guard.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LedgerTotals {
    pub records: usize,
    pub digests: usize,
    pub logical_bytes: u64,
    pub stored_bytes: u64,
}

/// Ledger entry for one live digest.
#[derive(Debug, Clone)]
struct DigestEntry {
    /// The first record ever registered for this digest incarnation.
    /// Immutable; kept even after the Original record is deleted so new
    /// References still designate it.
    original_id: RecordId,
    /// Whether the Original record itself is still live.
    original_live: bool,
    /// Live Reference record ids, in registration order.
    references: Vec<RecordId>,
    /// Blob size in bytes.
    size: u64,
}

impl DigestEntry {
    fn count(&self) -> usize {
        self.references.len() + usize::from(self.original_live)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    digests: HashMap<Digest, DigestEntry>,
    records: HashMap<RecordId, LogicalRecord>,
}

/// Tracks, for each digest, the set of logical records pointing at it.
#[derive(Debug, Default)]
pub struct RefLedger {
    state: RwLock<LedgerState>,
}

impl RefLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a record as the Original for its digest, if the digest is
    /// unseen. If the digest is already live, nothing is inserted and the
    /// existing Original's id is returned so the caller can register a
    /// Reference instead. First registration to commit wins; there is
    /// never a second Original for a live digest.
    ///
    /// Crate-internal: all mutations go through the orchestrator, which
    /// holds the per-digest lock across the full transition.
    pub(crate) fn register_original(&self, record: LogicalRecord) -> Register {
        debug_assert!(record.is_original());

        let mut state = self.state.write();
        if let Some(entry) = state.digests.get(&record.digest) {
            return Register::Exists {
                original: entry.original_id,
            };
        }

        state.digests.insert(
            record.digest,
            DigestEntry {
                original_id: record.id,
                original_live: true,
                references: Vec::new(),
                size: record.size,
            },
        );
        state.records.insert(record.id, record);
        Register::Created
    }

    /// Append a Reference record to its digest's set and increment the
    /// count. Fails with UnknownDigest if the digest is not live; that
    /// does not occur under the orchestrator protocol.
    pub(crate) fn register_reference(&self, record: LogicalRecord) -> Result<()> {
        debug_assert!(!record.is_original());

        let mut state = self.state.write();
        let entry = state
            .digests
            .get_mut(&record.digest)
            .ok_or_else(|| Error::unknown_digest(record.digest.to_hex()))?;

        entry.references.push(record.id);
        state.records.insert(record.id, record);
        Ok(())
    }

    /// Remove a record (Original or Reference) from its digest's set and
    /// decrement the count, as one atomic step. Returns the post-decrement
    /// count so the caller can decide whether to reclaim the blob. A
    /// count of zero also retires the digest entry: the next upload of
    /// that content starts a fresh Original.
    pub(crate) fn release(&self, id: RecordId) -> Result<Release> {
        let mut state = self.state.write();

        let record = state
            .records
            .remove(&id)
            .ok_or_else(|| Error::record_not_found(id))?;

        let entry = state
            .digests
            .get_mut(&record.digest)
            .ok_or_else(|| Error::unknown_digest(record.digest.to_hex()))?;

        match record.kind {
            RecordKind::Original => entry.original_live = false,
            RecordKind::Reference { .. } => entry.references.retain(|r| *r != id),
        }

        let remaining = entry.count();
        if remaining == 0 {
            state.digests.remove(&record.digest);
        }

        Ok(Release {
            digest: record.digest,
            remaining,
        })
    }

    /// Undo a release: put a just-removed record back, recreating the
    /// digest entry if the release retired it. Used by the orchestrator
    /// when the journal append after a release fails, so the in-memory
    /// ledger never diverges from what a replay would rebuild.
    pub(crate) fn reinstate(&self, record: LogicalRecord) {
        let mut state = self.state.write();

        let entry = state
            .digests
            .entry(record.digest)
            .or_insert_with(|| DigestEntry {
                original_id: match record.kind {
                    RecordKind::Original => record.id,
                    RecordKind::Reference { original } => original,
                },
                original_live: false,
                references: Vec::new(),
                size: record.size,
            });

        match record.kind {
            RecordKind::Original => entry.original_live = true,
            RecordKind::Reference { .. } => entry.references.push(record.id),
        }

        state.records.insert(record.id, record);
    }

    /// Look up a live record by id.
    pub fn get(&self, id: RecordId) -> Option<LogicalRecord> {
        self.state.read().records.get(&id).cloned()
    }

    /// Digest a live record points at.
    pub fn digest_of(&self, id: RecordId) -> Option<Digest> {
        self.state.read().records.get(&id).map(|r| r.digest)
    }

    /// Count of live records pointing at a digest (0 if unseen).
    pub fn count_for(&self, digest: &Digest) -> usize {
        self.state
            .read()
            .digests
            .get(digest)
            .map(DigestEntry::count)
            .unwrap_or(0)
    }

    /// Bytes saved by deduplication for one digest:
    /// `(count - 1) * blob_size` when the digest is live, else 0.
    pub fn savings_for(&self, digest: &Digest) -> u64 {
        let state = self.state.read();
        match state.digests.get(digest) {
            Some(entry) if entry.count() >= 1 => (entry.count() as u64 - 1) * entry.size,
            _ => 0,
        }
    }

    /// Live Reference records designating the given Original, newest
    /// first. Empty if the id is unknown or has no references.
    pub fn references_of(&self, original: RecordId) -> Vec<LogicalRecord> {
        let state = self.state.read();
        let mut refs: Vec<LogicalRecord> = state
            .records
            .values()
            .filter(|r| r.original_id() == Some(original))
            .cloned()
            .collect();
        refs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.to_string().cmp(&b.id.to_string())));
        refs
    }

    /// All live records, newest first.
    pub fn list(&self) -> Vec<LogicalRecord> {
        let state = self.state.read();
        let mut records: Vec<LogicalRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.to_string().cmp(&b.id.to_string())));
        records
    }

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        self.state.read().records.len()
    }

    /// Number of live digests.
    pub fn digest_count(&self) -> usize {
        self.state.read().digests.len()
    }

    /// Record/digest counts and logical/stored byte sums, all read under
    /// a single lock guard so the four values form one snapshot.
    pub(crate) fn totals(&self) -> LedgerTotals {
        let state = self.state.read();
        LedgerTotals {
            records: state.records.len(),
            digests: state.digests.len(),
            logical_bytes: state.records.values().map(|r| r.size).sum(),
            stored_bytes: state.digests.values().map(|e| e.size).sum(),
        }
    }
}
