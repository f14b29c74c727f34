//! Store-wide deduplication savings.

use crate::store::FileStore;
use serde::Serialize;

/// Snapshot of store-wide deduplication effect.
///
/// Derived entirely from the ledger; the blob store is never scanned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SavingsReport {
    /// Live logical records.
    pub record_count: usize,
    /// Unique blobs backing them.
    pub blob_count: usize,
    /// Sum of live record sizes: what storage would cost without
    /// deduplication.
    pub total_logical_bytes: u64,
    /// Sum of live blob sizes: each unique body counted once.
    pub total_stored_bytes: u64,
    /// Logical minus stored.
    pub saved_bytes: u64,
    /// Saved as a percentage of logical, rounded to two decimals.
    pub saved_percent: f64,
}

impl FileStore {
    /// Compute the store-wide savings snapshot.
    ///
    /// Counts and byte totals all come from a single ledger read, so the
    /// report reflects one ledger state even against concurrent uploads
    /// and deletes.
    pub fn global_savings(&self) -> SavingsReport {
        let totals = self.ledger().totals();

        let saved_bytes = totals.logical_bytes.saturating_sub(totals.stored_bytes);
        let saved_percent = if totals.logical_bytes == 0 {
            0.0
        } else {
            let raw = saved_bytes as f64 / totals.logical_bytes as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        SavingsReport {
            record_count: totals.records,
            blob_count: totals.digests,
            total_logical_bytes: totals.logical_bytes,
            total_stored_bytes: totals.stored_bytes,
            saved_bytes,
            saved_percent,
        }
    }
}

/// Render a byte count in human-readable units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}
