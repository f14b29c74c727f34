//! Append-only journal of ledger transitions.
//!
//! Every committed upload and delete is appended as one JSON line. On
//! open, the store replays the journal to rebuild the in-memory ledger.
//! A torn tail line (crash mid-append) is skipped with a warning rather
//! than poisoning the store.

use crate::error::{Error, Result};
use crate::record::{LogicalRecord, RecordId, now_unix};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A journal entry recording one committed ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A record (Original or Reference) was registered.
    Upload { record: LogicalRecord },
    /// A record was released.
    Delete { at: i64, id: RecordId },
}

impl JournalEntry {
    /// Entry for a committed registration.
    pub fn upload(record: LogicalRecord) -> Self {
        JournalEntry::Upload { record }
    }

    /// Entry for a committed release.
    pub fn delete(id: RecordId) -> Self {
        JournalEntry::Delete { at: now_unix(), id }
    }
}

/// Journal over an append-only file of JSON lines.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Open or create a journal at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append an entry and flush it to the file.
    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| Error::journal(format!("failed to encode entry: {}", e)))?;

        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Read all entries in append order.
    ///
    /// Unparsable lines are skipped with a warning; an interrupted append
    /// leaves at most one such line at the tail.
    pub fn replay(&self) -> Result<Vec<JournalEntry>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping unparsable journal line"
                    );
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use tempfile::TempDir;

    fn sample_record(name: &str) -> LogicalRecord {
        LogicalRecord::new_original(Digest::of(name.as_bytes()), name, "text/plain", 9)
    }

    #[test]
    fn test_journal_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let journal_path = temp_dir.path().join("journal");

        assert!(!journal_path.exists());
        Journal::open(&journal_path).unwrap();
        assert!(journal_path.exists());
    }

    #[test]
    fn test_journal_append_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal")).unwrap();

        let record = sample_record("a.txt");
        let id = record.id;
        journal.append(&JournalEntry::upload(record.clone())).unwrap();
        journal.append(&JournalEntry::delete(id)).unwrap();

        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], JournalEntry::Upload { record });
        assert!(matches!(entries[1], JournalEntry::Delete { id: d, .. } if d == id));
    }

    #[test]
    fn test_journal_replay_empty() {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal")).unwrap();
        assert!(journal.replay().unwrap().is_empty());
    }

    #[test]
    fn test_journal_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal");

        {
            let journal = Journal::open(&path).unwrap();
            journal
                .append(&JournalEntry::upload(sample_record("a.txt")))
                .unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.replay().unwrap().len(), 1);
    }

    #[test]
    fn test_journal_skips_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal");

        let journal = Journal::open(&path).unwrap();
        journal
            .append(&JournalEntry::upload(sample_record("a.txt")))
            .unwrap();

        // Simulate a crash mid-append: a truncated JSON line at the tail
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"op\":\"upload\",\"rec").unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 1);
    }
}
