//! Persisted queue snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::AssetEntry;

/// Point-in-time image of the queue ledger.
///
/// The entry order is the playback order; statuses and retry counters are
/// carried verbatim so recovery can reclassify stale `active` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Ordered ledger entries.
    pub entries: Vec<AssetEntry>,
}

impl QueueSnapshot {
    /// Builds a snapshot of the given entries, stamped now.
    pub fn of(entries: &[AssetEntry]) -> Self {
        Self {
            saved_at: Utc::now(),
            entries: entries.to_vec(),
        }
    }
}
