//! Status and queue views exposed to the external API layer.
//!
//! These types are serde-serializable so an HTTP/CLI layer can return them
//! verbatim.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::{AssetEntry, EntryStatus};

/// Current state of the single logical broadcast session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BroadcastStatus {
    /// No session; the loop advances as soon as a queued head exists
    /// (unless `halted`).
    Idle {
        /// Whether `stop_all` halted automatic advancement.
        halted: bool,
    },
    /// A start attempt is in flight.
    Starting {
        /// Asset being started.
        asset_id: String,
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// The encoder subprocess is running.
    Active {
        /// Asset bound to the session.
        asset_id: String,
        /// Generation of the subprocess.
        generation: u64,
        /// Wall-clock session start.
        started_at: DateTime<Utc>,
        /// Seconds since the session started.
        uptime_secs: u64,
    },
    /// A stop was requested; waiting for the matching exit event.
    Stopping {
        /// Asset being stopped.
        asset_id: String,
        /// Generation the stop targeted.
        generation: u64,
    },
}

/// One ledger entry as shown to callers of `list_queue`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueEntryView {
    /// Asset id.
    pub id: String,
    /// Position in the ledger (playback order).
    pub position: usize,
    /// Entry status.
    pub status: EntryStatus,
    /// Failed attempts so far.
    pub retries: u32,
    /// Last failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl QueueEntryView {
    pub(crate) fn from_entries(entries: &[AssetEntry]) -> Vec<Self> {
        entries
            .iter()
            .enumerate()
            .map(|(position, e)| Self {
                id: e.id.clone(),
                position,
                status: e.status,
                retries: e.retries,
                failure: e.failure.clone(),
            })
            .collect()
    }
}
