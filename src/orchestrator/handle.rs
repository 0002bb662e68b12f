//! # OrchestratorHandle: the external face of the control loop.
//!
//! The handle is the mutual-exclusion boundary of the design: every external
//! request becomes a [`Command`] on a bounded mailbox that the control loop
//! drains single-threaded, so ledger invariants are never observed violated
//! no matter how many API tasks hold a clone.
//!
//! Each command carries a oneshot reply; [`ControlError::Closed`] means the
//! orchestrator task is gone.

use tokio::sync::{mpsc, oneshot};

use crate::config::StreamSettings;
use crate::error::ControlError;
use crate::orchestrator::status::{BroadcastStatus, QueueEntryView};

/// Requests processed by the control loop.
pub(crate) enum Command {
    Enqueue {
        id: String,
        reply: oneshot::Sender<Result<usize, ControlError>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    Reorder {
        id: String,
        position: usize,
        reply: oneshot::Sender<Result<usize, ControlError>>,
    },
    ListQueue {
        reply: oneshot::Sender<Vec<QueueEntryView>>,
    },
    Status {
        reply: oneshot::Sender<BroadcastStatus>,
    },
    Skip {
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    StopAll {
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    UpdateSettings {
        settings: StreamSettings,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    CurrentSettings {
        reply: oneshot::Sender<StreamSettings>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle for submitting operations to the orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ControlError::Closed)?;
        rx.await.map_err(|_| ControlError::Closed)
    }

    /// Appends an asset to the queue; returns its position.
    pub async fn enqueue(&self, id: impl Into<String>) -> Result<usize, ControlError> {
        let id = id.into();
        self.request(|reply| Command::Enqueue { id, reply }).await?
    }

    /// Removes a queued (or terminally failed) asset from the queue.
    pub async fn remove(&self, id: impl Into<String>) -> Result<(), ControlError> {
        let id = id.into();
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    /// Moves a queued asset to a new position; returns where it landed.
    pub async fn reorder(
        &self,
        id: impl Into<String>,
        position: usize,
    ) -> Result<usize, ControlError> {
        let id = id.into();
        self.request(|reply| Command::Reorder {
            id,
            position,
            reply,
        })
        .await?
    }

    /// Returns the queue in playback order.
    pub async fn list_queue(&self) -> Result<Vec<QueueEntryView>, ControlError> {
        self.request(|reply| Command::ListQueue { reply }).await
    }

    /// Returns the current session status.
    pub async fn status(&self) -> Result<BroadcastStatus, ControlError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Skips the current asset; the queue advances to the next head.
    pub async fn skip_current(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Skip { reply }).await?
    }

    /// Stops the current session (if any) and halts automatic advancement.
    pub async fn stop_all(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::StopAll { reply }).await?
    }

    /// Re-enables automatic advancement after `stop_all`.
    pub async fn resume(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// Replaces the stream settings; applies from the next session start.
    ///
    /// Rejected with [`ControlError::SettingsLocked`] while a session is
    /// active or starting.
    pub async fn update_settings(
        &self,
        settings: StreamSettings,
    ) -> Result<(), ControlError> {
        self.request(|reply| Command::UpdateSettings { settings, reply })
            .await?
    }

    /// Returns the settings the next session will start with.
    pub async fn current_settings(&self) -> Result<StreamSettings, ControlError> {
        self.request(|reply| Command::CurrentSettings { reply }).await
    }

    /// Gracefully shuts the orchestrator down (same path as an OS signal).
    ///
    /// Resolves once the control loop has begun its shutdown sequence.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
