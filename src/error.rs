//! Error types used by the streamvisor runtime.
//!
//! Errors are split by the component that raises them:
//!
//! - [`QueueError`] — rejected queue-ledger mutations.
//! - [`AssetError`] — asset-store resolution failures.
//! - [`SessionError`] — encoder-session start failures.
//! - [`ControlError`] — rejections surfaced to external callers of the
//!   orchestrator handle.
//! - [`PersistError`] / [`BootError`] — durable-store failures; `BootError`
//!   is fatal and halts startup with a diagnostic instead of silently
//!   resetting the queue.
//! - [`RuntimeError`] — failures of the orchestration runtime itself.
//!
//! All enums provide `as_label()` returning a short stable snake_case string
//! for logs and metrics.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::EntryStatus;

/// Rejected queue-ledger mutations.
///
/// Every ledger operation either applies durably or is rejected with one of
/// these reasons; partial application is not possible (the durable write
/// precedes the in-memory commit).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum QueueError {
    /// The asset is already queued or active.
    #[error("asset '{id}' is already queued or active")]
    DuplicateAsset {
        /// Offending asset id.
        id: String,
    },

    /// No entry with this id exists in the ledger.
    #[error("asset '{id}' is not in the queue")]
    NotFound {
        /// Requested asset id.
        id: String,
    },

    /// The entry is active; it must be stopped through the orchestrator first.
    #[error("asset '{id}' is active and cannot be removed directly")]
    NotRemovable {
        /// Offending asset id.
        id: String,
    },

    /// The operation is only valid for `queued` entries.
    #[error("asset '{id}' is {status}, operation requires a queued entry")]
    InvalidState {
        /// Offending asset id.
        id: String,
        /// Status the entry was actually in.
        status: EntryStatus,
    },

    /// The write-ahead snapshot could not be persisted; the mutation was not applied.
    #[error("ledger write not persisted: {0}")]
    Persist(#[from] PersistError),
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::DuplicateAsset { .. } => "queue_duplicate_asset",
            QueueError::NotFound { .. } => "queue_not_found",
            QueueError::NotRemovable { .. } => "queue_not_removable",
            QueueError::InvalidState { .. } => "queue_invalid_state",
            QueueError::Persist(_) => "queue_persist",
        }
    }
}

/// Asset-store resolution failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AssetError {
    /// No asset with this id exists in the store.
    #[error("asset '{id}' not found")]
    NotFound {
        /// Requested asset id.
        id: String,
    },

    /// The asset exists but cannot be opened for reading.
    #[error("asset '{id}' unreadable: {reason}")]
    Unreadable {
        /// Offending asset id.
        id: String,
        /// Underlying I/O failure, rendered.
        reason: String,
    },
}

impl AssetError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AssetError::NotFound { .. } => "asset_not_found",
            AssetError::Unreadable { .. } => "asset_unreadable",
        }
    }
}

/// Encoder-session start failures.
///
/// Mid-stream failures are not errors: they are absorbed into the exit-event
/// stream and recorded in ledger state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session is already running; at most one encoder subprocess exists.
    #[error("a broadcast session is already running")]
    AlreadyRunning,

    /// The asset's media file could not be opened.
    #[error("asset '{id}' unreadable: {reason}")]
    AssetUnreadable {
        /// Offending asset id.
        id: String,
        /// Underlying I/O failure, rendered.
        reason: String,
    },

    /// The encoder subprocess could not be created.
    #[error("failed to spawn encoder: {reason}")]
    SpawnFailed {
        /// Underlying spawn failure, rendered.
        reason: String,
    },
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::AlreadyRunning => "session_already_running",
            SessionError::AssetUnreadable { .. } => "session_asset_unreadable",
            SessionError::SpawnFailed { .. } => "session_spawn_failed",
        }
    }
}

/// Rejections surfaced to callers of the orchestrator handle.
///
/// Every handle operation returns `Result<_, ControlError>` so the API layer
/// can distinguish "applied" from "rejected with reason".
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlError {
    /// Settings cannot change while a session is active or starting.
    #[error("settings are locked while a session is active or starting")]
    SettingsLocked,

    /// The operation requires a running session and none exists.
    #[error("no active broadcast session")]
    NoActiveSession,

    /// A queue-ledger rejection.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// An asset-store rejection.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// A durable write failed; the operation was not applied.
    #[error("durable write failed: {0}")]
    Persist(#[from] PersistError),

    /// The orchestrator task has shut down; the handle is dead.
    #[error("orchestrator is not running")]
    Closed,
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::SettingsLocked => "control_settings_locked",
            ControlError::NoActiveSession => "control_no_active_session",
            ControlError::Queue(e) => e.as_label(),
            ControlError::Asset(e) => e.as_label(),
            ControlError::Persist(e) => e.as_label(),
            ControlError::Closed => "control_closed",
        }
    }
}

/// Durable-store failures.
///
/// `Corrupt` is deliberately distinct from `Io`: an operator must be able to
/// tell "the file is unreadable garbage" apart from "the disk write failed".
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistError {
    /// Reading or writing the snapshot file failed.
    #[error("persistence I/O failure on {path:?}: {source}")]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file exists but does not parse.
    #[error("persisted state at {path:?} is corrupt: {source}")]
    Corrupt {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistError::Io { .. } => "persist_io",
            PersistError::Corrupt { .. } => "persist_corrupt",
        }
    }
}

/// Fatal startup failures.
///
/// Raised before the control loop starts. An empty store is not an error
/// (it loads as an empty queue / default settings); these mean the persisted
/// state exists but could not be read or replaced.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BootError {
    /// The queue snapshot could not be loaded.
    #[error("cannot read persisted queue: {0}")]
    QueueUnreadable(#[source] PersistError),

    /// The settings record could not be loaded.
    #[error("cannot read persisted settings: {0}")]
    SettingsUnreadable(#[source] PersistError),

    /// The initial state could not be written back during recovery.
    #[error("cannot write recovered state: {0}")]
    StateUnwritable(#[source] PersistError),
}

impl BootError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BootError::QueueUnreadable(_) => "boot_queue_unreadable",
            BootError::SettingsUnreadable(_) => "boot_settings_unreadable",
            BootError::StateUnwritable(_) => "boot_state_unwritable",
        }
    }
}

/// Errors produced by the orchestration runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the encoder had to be abandoned.
    #[error("shutdown grace {grace:?} exceeded; session for {asset:?} did not stop")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Asset whose session was still running, if any.
        asset: Option<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
