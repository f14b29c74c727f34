//! Store management and the upload/delete orchestrator.

use crate::blob::BlobStore;
use crate::digest::{Algorithm, Digest};
use crate::error::{Error, Result};
use crate::journal::{Journal, JournalEntry};
use crate::ledger::{RefLedger, Register};
use crate::record::{LogicalRecord, RecordId, RecordKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a committed delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deletion {
    /// Digest the deleted record pointed at.
    pub digest: Digest,
    /// Live records remaining for that digest.
    pub remaining: usize,
    /// True if the count reached zero and the blob was reclaimed.
    pub blob_reclaimed: bool,
}

/// A content-deduplicating file store.
///
/// Uploads of identical bodies share one stored blob; each upload stays
/// an independent logical record with its own id and lifecycle. The blob
/// is reclaimed exactly once, when the last record pointing at it is
/// deleted.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    algorithm: Algorithm,
    blobs: BlobStore,
    ledger: RefLedger,
    journal: Journal,
    /// Per-digest locks serializing check/register/blob-write and
    /// release/reclaim sequences. Entries live for the store's lifetime
    /// so two threads can never hold different locks for one digest.
    locks: DashMap<Digest, Arc<Mutex<()>>>,
}

impl FileStore {
    /// Initialize a new store at the given path.
    ///
    /// Creates the directory structure:
    /// - `objects/blake3-256/` for blob bodies
    /// - `config` file with version and algorithm
    /// - `journal` file recording ledger transitions
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)?;

        let blobs = BlobStore::open(root.join("objects"), algorithm)?;

        let config_path = root.join("config");
        let config_content = format!("version=1\nalgo={}\n", algorithm.as_str());
        fs::write(&config_path, config_content)?;

        let journal = Journal::open(root.join("journal"))?;

        Ok(Self {
            root,
            algorithm,
            blobs,
            ledger: RefLedger::new(),
            journal,
            locks: DashMap::new(),
        })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure, reads the configuration, and
    /// replays the journal to rebuild the ledger.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&config_content)
            .map_err(|e| Error::invalid_store(&root, e.to_string()))?;

        let objects_dir = root.join("objects").join(algorithm.as_str());
        if !objects_dir.exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        let blobs = BlobStore::open(root.join("objects"), algorithm)?;
        let journal = Journal::open(root.join("journal"))?;

        let ledger = RefLedger::new();
        for entry in journal.replay()? {
            Self::apply_journal_entry(&ledger, entry);
        }

        Ok(Self {
            root,
            algorithm,
            blobs,
            ledger,
            journal,
            locks: DashMap::new(),
        })
    }

    /// Parse the config file to extract the algorithm.
    fn parse_config(content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::config(format!(
                "unsupported config version: {:?}",
                version
            )));
        }

        let algo_str = algo.ok_or_else(|| Error::config("missing algo"))?;
        Algorithm::parse(algo_str)
    }

    /// Re-apply one journal entry to the ledger during open.
    fn apply_journal_entry(ledger: &RefLedger, entry: JournalEntry) {
        match entry {
            JournalEntry::Upload { record } => match record.kind {
                RecordKind::Original => {
                    let digest = record.digest;
                    if !matches!(ledger.register_original(record), Register::Created) {
                        warn!(digest = %digest, "journal replay: duplicate original, skipped");
                    }
                }
                RecordKind::Reference { .. } => {
                    if let Err(e) = ledger.register_reference(record) {
                        warn!(error = %e, "journal replay: dangling reference, skipped");
                    }
                }
            },
            JournalEntry::Delete { id, .. } => {
                if let Err(e) = ledger.release(id) {
                    warn!(id = %id, error = %e, "journal replay: delete without record, skipped");
                }
            }
        }
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Get the reference ledger for read-only queries. All ledger
    /// mutations are crate-internal and flow through [`FileStore::upload`]
    /// and [`FileStore::delete`], which hold the per-digest lock.
    pub fn ledger(&self) -> &RefLedger {
        &self.ledger
    }

    /// Get the blob store.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// The serialization point for one digest.
    fn digest_lock(&self, digest: &Digest) -> Arc<Mutex<()>> {
        self.locks.entry(*digest).or_default().clone()
    }

    /// Upload a body under the given name.
    ///
    /// Computes the digest, and under that digest's lock either installs
    /// a fresh Original (novel content: the blob is persisted and the
    /// upload journaled) or registers a Reference to the existing
    /// Original (duplicate content: the blob store is not touched).
    /// Duplicate content is the expected, optimized path, never an error.
    pub fn upload(
        &self,
        body: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<LogicalRecord> {
        let digest = Digest::of(body);
        let size = body.len() as u64;

        let lock = self.digest_lock(&digest);
        let _guard = lock.lock();

        let candidate = LogicalRecord::new_original(digest, filename, content_type, size);
        match self.ledger.register_original(candidate.clone()) {
            Register::Created => {
                if let Err(e) = self.persist_original(&candidate, body) {
                    // No partial registration: undo the ledger entry
                    let _ = self.ledger.release(candidate.id);
                    return Err(e);
                }
                debug!(digest = %digest, id = %candidate.id, size, "stored original");
                Ok(candidate)
            }
            Register::Exists { original } => {
                let record =
                    LogicalRecord::new_reference(digest, filename, content_type, size, original);
                self.ledger.register_reference(record.clone())?;
                if let Err(e) = self.journal.append(&JournalEntry::upload(record.clone())) {
                    let _ = self.ledger.release(record.id);
                    return Err(e);
                }
                debug!(
                    digest = %digest,
                    id = %record.id,
                    original = %original,
                    "duplicate content, registered reference"
                );
                Ok(record)
            }
        }
    }

    fn persist_original(&self, record: &LogicalRecord, body: &[u8]) -> Result<()> {
        self.blobs.put_if_absent(&record.digest, body)?;
        self.journal.append(&JournalEntry::upload(record.clone()))
    }

    /// Delete a logical record by id.
    ///
    /// Decrements the digest's count; when the count transitions to zero
    /// the blob is reclaimed within the same per-digest critical section,
    /// so a concurrent upload of identical content cannot race the
    /// physical delete. Deleting an Original while References remain
    /// succeeds and leaves the blob in place; the surviving References
    /// are not promoted. Fails with RecordNotFound if the id never
    /// existed or was already deleted.
    pub fn delete(&self, id: RecordId) -> Result<Deletion> {
        let digest = self
            .ledger
            .digest_of(id)
            .ok_or_else(|| Error::record_not_found(id))?;

        let lock = self.digest_lock(&digest);
        let _guard = lock.lock();

        // The record may have been released between the lookup and the
        // lock acquisition; this re-check runs under the per-digest lock.
        let record = self
            .ledger
            .get(id)
            .ok_or_else(|| Error::record_not_found(id))?;

        let release = self.ledger.release(id)?;
        if let Err(e) = self.journal.append(&JournalEntry::delete(id)) {
            // Keep memory and journal agreeing: an unjournaled release
            // would be resurrected by replay, so put the record back
            self.ledger.reinstate(record);
            return Err(e);
        }

        let blob_reclaimed = if release.remaining == 0 {
            self.blobs.delete(&release.digest)?;
            debug!(digest = %release.digest, "count reached zero, blob reclaimed");
            true
        } else {
            false
        };

        Ok(Deletion {
            digest: release.digest,
            remaining: release.remaining,
            blob_reclaimed,
        })
    }

    /// Look up a record by id.
    pub fn record(&self, id: RecordId) -> Result<LogicalRecord> {
        self.ledger.get(id).ok_or_else(|| Error::record_not_found(id))
    }

    /// Read the content a record points at.
    pub fn read(&self, id: RecordId) -> Result<Vec<u8>> {
        let record = self.record(id)?;
        self.blobs.read(&record.digest)
    }

    /// Read a blob body directly by digest.
    pub fn read_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        self.blobs.read(digest)
    }

    /// Live Reference records designating the given Original.
    pub fn references_of(&self, original: RecordId) -> Vec<LogicalRecord> {
        self.ledger.references_of(original)
    }

    /// All live records, newest first.
    pub fn list(&self) -> Vec<LogicalRecord> {
        self.ledger.list()
    }

    /// Count of live records pointing at a digest.
    pub fn count_for(&self, digest: &Digest) -> usize {
        self.ledger.count_for(digest)
    }

    /// Bytes saved by deduplication for one digest.
    pub fn savings_for(&self, digest: &Digest) -> u64 {
        self.ledger.savings_for(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_init() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");

        let store = FileStore::init(&store_path, Algorithm::Blake3).unwrap();
        assert_eq!(store.root(), store_path);
        assert_eq!(store.algorithm(), Algorithm::Blake3);

        assert!(store_path.join("objects/blake3-256").exists());
        assert!(store_path.join("config").exists());
        assert!(store_path.join("journal").exists());

        let config = fs::read_to_string(store_path.join("config")).unwrap();
        assert!(config.contains("version=1"));
        assert!(config.contains("algo=blake3-256"));
    }

    #[test]
    fn test_store_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FileStore::open(temp_dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_store_open_invalid_no_config() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");
        fs::create_dir_all(&store_path).unwrap();

        assert!(FileStore::open(&store_path).is_err());
    }

    #[test]
    fn test_parse_config() {
        let config = "version=1\nalgo=blake3-256\n";
        assert_eq!(FileStore::parse_config(config).unwrap(), Algorithm::Blake3);
    }

    #[test]
    fn test_parse_config_with_comments() {
        let config = "# Comment\nversion=1\nalgo=blake3-256\n# Another comment\n";
        assert_eq!(FileStore::parse_config(config).unwrap(), Algorithm::Blake3);
    }

    #[test]
    fn test_parse_config_invalid_version() {
        assert!(FileStore::parse_config("version=99\nalgo=blake3-256\n").is_err());
    }

    #[test]
    fn test_parse_config_missing_algo() {
        assert!(FileStore::parse_config("version=1\n").is_err());
    }

    #[test]
    fn test_upload_novel_content() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let record = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        assert!(record.is_original());
        assert_eq!(record.size, 5);
        assert_eq!(store.count_for(&record.digest), 1);
        assert_eq!(store.read(record.id).unwrap(), b"hello");
    }

    #[test]
    fn test_upload_duplicate_creates_reference() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        let r = store.upload(b"hello", "b.txt", "text/plain").unwrap();

        assert!(o.is_original());
        assert!(!r.is_original());
        assert_eq!(r.original_id(), Some(o.id));
        assert_eq!(r.digest, o.digest);
        assert_ne!(r.id, o.id);
        assert_eq!(r.filename, "b.txt");

        assert_eq!(store.count_for(&o.digest), 2);
        assert_eq!(store.savings_for(&o.digest), 5);

        // Both records read the same single blob
        assert_eq!(store.read(o.id).unwrap(), b"hello");
        assert_eq!(store.read(r.id).unwrap(), b"hello");
    }

    #[test]
    fn test_distinct_content_gets_distinct_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let a = store.upload(b"aaa", "a.txt", "text/plain").unwrap();
        let b = store.upload(b"bbb", "b.txt", "text/plain").unwrap();

        assert!(a.is_original());
        assert!(b.is_original());
        assert_ne!(a.digest, b.digest);
        assert_eq!(store.count_for(&a.digest), 1);
        assert_eq!(store.count_for(&b.digest), 1);
    }

    #[test]
    fn test_delete_original_keeps_blob_for_references() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        let r = store.upload(b"hello", "b.txt", "text/plain").unwrap();

        let deletion = store.delete(o.id).unwrap();
        assert_eq!(deletion.remaining, 1);
        assert!(!deletion.blob_reclaimed);

        // Blob still readable through the reference
        assert_eq!(store.read(r.id).unwrap(), b"hello");

        // The surviving reference is not promoted
        let survivor = store.record(r.id).unwrap();
        assert!(!survivor.is_original());
        assert_eq!(survivor.original_id(), Some(o.id));
    }

    #[test]
    fn test_delete_last_record_reclaims_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        let r = store.upload(b"hello", "b.txt", "text/plain").unwrap();
        let digest = o.digest;

        store.delete(o.id).unwrap();
        let deletion = store.delete(r.id).unwrap();
        assert_eq!(deletion.remaining, 0);
        assert!(deletion.blob_reclaimed);

        assert!(matches!(
            store.read_blob(&digest),
            Err(Error::BlobNotFound { .. })
        ));
        assert_eq!(store.count_for(&digest), 0);
    }

    #[test]
    fn test_double_delete_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        assert!(store.delete(o.id).is_ok());
        assert!(matches!(
            store.delete(o.id),
            Err(Error::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_unknown_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        assert!(matches!(
            store.delete(RecordId::new()),
            Err(Error::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_reupload_after_reclaim_is_fresh_original() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o1 = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        store.delete(o1.id).unwrap();

        let o2 = store.upload(b"hello", "a2.txt", "text/plain").unwrap();
        assert!(o2.is_original());
        assert_ne!(o2.id, o1.id);
        assert_eq!(store.count_for(&o2.digest), 1);
        assert_eq!(store.read(o2.id).unwrap(), b"hello");
    }

    #[test]
    fn test_references_of_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        let r1 = store.upload(b"hello", "b.txt", "text/plain").unwrap();
        let r2 = store.upload(b"hello", "c.txt", "text/plain").unwrap();
        store.upload(b"other", "d.txt", "text/plain").unwrap();

        let refs = store.references_of(o.id);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.id == r1.id));
        assert!(refs.iter().any(|r| r.id == r2.id));

        assert_eq!(store.list().len(), 4);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");

        let (o_id, r_id, digest) = {
            let store = FileStore::init(&store_path, Algorithm::Blake3).unwrap();
            let o = store.upload(b"durable", "a.txt", "text/plain").unwrap();
            let r = store.upload(b"durable", "b.txt", "text/plain").unwrap();
            (o.id, r.id, o.digest)
        };

        let store = FileStore::open(&store_path).unwrap();
        assert_eq!(store.count_for(&digest), 2);
        assert_eq!(store.read(o_id).unwrap(), b"durable");

        let r = store.record(r_id).unwrap();
        assert_eq!(r.original_id(), Some(o_id));

        // Deletes replay too
        store.delete(o_id).unwrap();
        drop(store);

        let store = FileStore::open(&store_path).unwrap();
        assert_eq!(store.count_for(&digest), 1);
        assert!(matches!(
            store.record(o_id),
            Err(Error::RecordNotFound { .. })
        ));
        assert_eq!(store.read(r_id).unwrap(), b"durable");
    }

    #[test]
    fn test_hello_scenario() {
        // upload a.txt ("hello") -> O1, count=1, saved=0
        // upload b.txt ("hello") -> R1 of O1, count=2, saved=5
        // delete O1 -> count=1, blob readable via R1
        // delete R1 -> count=0, blob gone
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let o1 = store.upload(b"hello", "a.txt", "text/plain").unwrap();
        assert!(o1.is_original());
        assert_eq!(store.count_for(&o1.digest), 1);
        assert_eq!(store.savings_for(&o1.digest), 0);

        let r1 = store.upload(b"hello", "b.txt", "text/plain").unwrap();
        assert_eq!(r1.original_id(), Some(o1.id));
        assert_eq!(store.count_for(&o1.digest), 2);
        assert_eq!(store.savings_for(&o1.digest), 5);

        store.delete(o1.id).unwrap();
        assert_eq!(store.count_for(&o1.digest), 1);
        assert_eq!(store.read(r1.id).unwrap(), b"hello");

        store.delete(r1.id).unwrap();
        assert_eq!(store.count_for(&o1.digest), 0);
        assert!(matches!(
            store.read_blob(&o1.digest),
            Err(Error::BlobNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_identical_uploads_single_original() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap());

        const K: usize = 16;
        let mut handles = Vec::new();
        for i in 0..K {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let name = format!("copy-{}.bin", i);
                store.upload(b"concurrent body", &name, "application/octet-stream")
            }));
        }

        let records: Vec<LogicalRecord> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let digest = Digest::of(b"concurrent body");
        assert_eq!(store.count_for(&digest), K);

        // Exactly one Original; every Reference designates it
        let originals: Vec<&LogicalRecord> =
            records.iter().filter(|r| r.is_original()).collect();
        assert_eq!(originals.len(), 1);
        let o_id = originals[0].id;
        for r in records.iter().filter(|r| !r.is_original()) {
            assert_eq!(r.original_id(), Some(o_id));
        }

        // All K records are distinct and live
        assert_eq!(store.list().len(), K);
        assert_eq!(store.read_blob(&digest).unwrap(), b"concurrent body");
    }

    #[test]
    fn test_concurrent_deletes_reclaim_once() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap());

        const K: usize = 12;
        let mut ids = Vec::new();
        for i in 0..K {
            let name = format!("copy-{}.bin", i);
            ids.push(store.upload(b"shared", &name, "text/plain").unwrap().id);
        }
        let digest = Digest::of(b"shared");

        let mut handles = Vec::new();
        for id in ids {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || store.delete(id)));
        }

        let deletions: Vec<Deletion> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        // Exactly one delete observed the 1 -> 0 transition
        assert_eq!(deletions.iter().filter(|d| d.blob_reclaimed).count(), 1);
        assert_eq!(store.count_for(&digest), 0);
        assert!(matches!(
            store.read_blob(&digest),
            Err(Error::BlobNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_mixed_digests_proceed_independently() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::init(temp_dir.path(), Algorithm::Blake3).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let body = format!("body-{}", i % 4);
                let name = format!("file-{}.txt", i);
                store.upload(body.as_bytes(), &name, "text/plain").unwrap()
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..4 {
            let digest = Digest::of(format!("body-{}", i).as_bytes());
            assert_eq!(store.count_for(&digest), 2);
        }
        assert_eq!(store.list().len(), 8);
    }
}
