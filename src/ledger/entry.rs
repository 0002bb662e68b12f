//! Ledger entries and their status vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a ledger entry.
///
/// Transitions: `Queued → Active → {Done | Failed}`. A failed attempt under
/// the retry budget returns the entry to `Queued` at its current position;
/// that is the only backward transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Waiting for its turn at the queue head.
    Queued,
    /// Bound to the running encoder session.
    Active,
    /// Broadcast finished successfully (entries in this state are removed).
    Done,
    /// Broadcast failed terminally or was skipped.
    Failed,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryStatus::Queued => "queued",
            EntryStatus::Active => "active",
            EntryStatus::Done => "done",
            EntryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One asset in the queue ledger.
///
/// Immutable once created except for `status`, `retries`, `failure`, and its
/// position among `queued` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Opaque asset identifier (resolvable through the asset store).
    pub id: String,

    /// Media duration in seconds, when known at enqueue time. Used for the
    /// completion threshold; optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Current status.
    pub status: EntryStatus,

    /// Failed attempts so far (the retry budget counts against this).
    #[serde(default)]
    pub retries: u32,

    /// Last failure reason, when any attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// When the entry was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl AssetEntry {
    /// Creates a fresh `queued` entry.
    pub fn queued(id: impl Into<String>, duration_secs: Option<f64>) -> Self {
        Self {
            id: id.into(),
            duration_secs,
            status: EntryStatus::Queued,
            retries: 0,
            failure: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Whether the entry still occupies the queue (queued or active).
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self.status, EntryStatus::Queued | EntryStatus::Active)
    }
}
