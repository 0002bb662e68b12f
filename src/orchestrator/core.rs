//! # Orchestrator control loop.
//!
//! One long-lived task owns the ledger and the session supervisor and drives
//! the state machine over the single logical session:
//!
//! ```text
//!            queued head, not halted
//!   Idle ────────────────────────────► Starting
//!    ▲                                    │ supervisor.start + mark_active
//!    │ Completed / Failed / Stopped       ▼
//!    └──────────────────────────────── Active
//!    ▲                                    │ skip / stop_all
//!    │ Exit{Stopped} for generation       ▼
//!    └──────────────────────────────── Stopping
//! ```
//!
//! The loop suspends at exactly three points: the command mailbox, the
//! supervisor's exit-event channel, and a pending retry timer. It never
//! suspends while holding partially applied ledger state — every ledger
//! mutation is one awaited write-ahead operation.
//!
//! ## Rules
//! - Exit events for superseded generations are discarded (`reap` check).
//! - Auto-advance: a completed head immediately yields to the next queued
//!   entry within the same loop cycle; there is no idle gap.
//! - Failures flow through the bounded-retry policy; deliberate skips do not.
//! - A durable-write failure on the failure path leaves the entry `active`
//!   in the ledger and freezes advancement rather than violating
//!   write-ahead; a restart recovers via the startup reclassification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::assets::AssetStore;
use crate::config::{Config, FailurePolicy, StreamSettings};
use crate::error::{BootError, ControlError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::ledger::{FailureDisposition, Ledger};
use crate::orchestrator::handle::Command;
use crate::orchestrator::status::{BroadcastStatus, QueueEntryView};
use crate::orchestrator::OrchestratorHandle;
use crate::persist::Persistence;
use crate::session::{ExitEvent, ExitOutcome, FailureReason, SessionHandle, SessionSupervisor};
use crate::shutdown;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Why a deliberate stop was requested, decided at request time so the
/// matching exit event knows what to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopDisposition {
    /// Operator skip: record `manual-skip`, keep advancing.
    Skip,
    /// `stop_all`: record `manual-skip`; advancement is already halted.
    Halt,
    /// A start was rolled back (durable write failed after spawn); the
    /// failure is already recorded.
    AbortedStart,
}

/// Control-loop state over the single logical session.
enum SessionState {
    Idle,
    Starting {
        asset_id: String,
        attempt: u32,
    },
    Active {
        handle: SessionHandle,
        started_at_utc: DateTime<Utc>,
    },
    Stopping {
        asset_id: Arc<str>,
        generation: u64,
        disposition: StopDisposition,
    },
}

/// The broadcast queue orchestrator.
///
/// Construct with [`Orchestrator::new`] (which performs startup recovery),
/// then drive with [`Orchestrator::run`]; interact through the returned
/// [`OrchestratorHandle`].
pub struct Orchestrator {
    cfg: Config,
    settings: StreamSettings,
    ledger: Ledger,
    supervisor: SessionSupervisor,
    exit_rx: mpsc::Receiver<ExitEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    assets: Arc<dyn AssetStore>,
    persistence: Arc<dyn Persistence>,
    bus: Bus,
    state: SessionState,
    halted: bool,
    retry_at: Option<tokio::time::Instant>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("halted", &self.halted)
            .field("retry_at", &self.retry_at)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates the orchestrator and its handle.
    ///
    /// Loads persisted settings (writing defaults on first boot) and the
    /// persisted queue, reclassifying stale `active` entries before the
    /// control loop can make any decision. Unreadable persisted state is a
    /// fatal [`BootError`] — the operator must be able to distinguish
    /// "empty queue" from "could not read queue".
    pub async fn new(
        cfg: Config,
        assets: Arc<dyn AssetStore>,
        persistence: Arc<dyn Persistence>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Result<(Self, OrchestratorHandle), BootError> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Arc::new(SubscriberSet::new(subscribers, bus.clone())).listen(&bus);

        let settings = match persistence.load_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let defaults = StreamSettings::default();
                persistence
                    .save_settings(&defaults)
                    .await
                    .map_err(BootError::StateUnwritable)?;
                defaults
            }
            Err(e) => return Err(BootError::SettingsUnreadable(e)),
        };

        let (ledger, report) =
            Ledger::recover(Arc::clone(&persistence), &cfg.retry).await?;
        if !report.is_empty() {
            bus.publish(Event::now(EventKind::RecoveryApplied).with_reason(format!(
                "requeued={:?} failed={:?}",
                report.requeued, report.failed
            )));
        }

        let (supervisor, exit_rx) = SessionSupervisor::new(&cfg, bus.clone());
        let (cmd_tx, cmd_rx) = mpsc::channel(cfg.command_capacity.max(1));
        let handle = OrchestratorHandle::new(cmd_tx);

        Ok((
            Self {
                cfg,
                settings,
                ledger,
                supervisor,
                exit_rx,
                cmd_rx,
                assets,
                persistence,
                bus,
                state: SessionState::Idle,
                halted: false,
                retry_at: None,
            },
            handle,
        ))
    }

    /// Runs the control loop until shutdown (OS signal, handle request, or
    /// every handle dropped).
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        let shutdown_signal = shutdown::wait_for_shutdown_signal();
        tokio::pin!(shutdown_signal);

        loop {
            self.advance().await;

            let retry_at = self.retry_at;
            tokio::select! {
                _ = &mut shutdown_signal => {
                    return self.shutdown_gracefully("os-signal").await;
                }

                Some(exit) = self.exit_rx.recv() => {
                    self.handle_exit(exit).await;
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        return self.shutdown_gracefully("handle").await;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => return self.shutdown_gracefully("handles-dropped").await,
                },

                _ = tokio::time::sleep_until(
                    retry_at.unwrap_or_else(tokio::time::Instant::now)
                ), if retry_at.is_some() => {
                    self.retry_at = None;
                }
            }
        }
    }

    // ---- queue advancement ------------------------------------------------

    /// Starts sessions while idle, un-halted, and a queued head exists.
    ///
    /// Start failures are absorbed through the bounded-retry policy; the
    /// loop either parks on a backoff timer or falls through to the next
    /// queued head (poison items cannot spin forever).
    async fn advance(&mut self) {
        loop {
            if !matches!(self.state, SessionState::Idle) || self.halted {
                return;
            }
            if self
                .retry_at
                .is_some_and(|at| at > tokio::time::Instant::now())
            {
                return;
            }
            self.retry_at = None;

            // A stranded active entry (durable write failed mid-transition)
            // freezes advancement instead of double-activating.
            if self.ledger.active().is_some() {
                return;
            }

            let Some(head) = self.ledger.peek_next() else {
                return;
            };
            let id = head.id.clone();
            let attempt = head.retries + 1;
            let duration_secs = head.duration_secs;

            self.state = SessionState::Starting {
                asset_id: id.clone(),
                attempt,
            };
            self.bus.publish(
                Event::now(EventKind::SessionStarting)
                    .with_asset(id.as_str())
                    .with_attempt(attempt),
            );

            match self.try_start(&id, duration_secs).await {
                Ok(handle) => {
                    self.state = SessionState::Active {
                        handle,
                        started_at_utc: Utc::now(),
                    };
                    return;
                }
                Err(StartFailure::RolledBack {
                    generation,
                    asset_id,
                    reason,
                }) => {
                    // Process spawned but the activation write failed; wait
                    // out its Stopped event before touching the queue again.
                    self.state = SessionState::Stopping {
                        asset_id,
                        generation,
                        disposition: StopDisposition::AbortedStart,
                    };
                    self.apply_failure(&id, &reason).await;
                    return;
                }
                Err(StartFailure::NotStarted { reason }) => {
                    self.state = SessionState::Idle;
                    self.apply_failure(&id, &reason).await;
                    // Loop: either a backoff timer is pending (returns at
                    // the top) or the next head is tried immediately.
                }
            }
        }
    }

    /// Resolves the asset, spawns the encoder, and durably activates the
    /// entry — in that order, so the ledger never claims a session that was
    /// never spawned.
    async fn try_start(
        &mut self,
        id: &str,
        duration_secs: Option<f64>,
    ) -> Result<SessionHandle, StartFailure> {
        let mut asset = self
            .assets
            .resolve(id)
            .await
            .map_err(|e| StartFailure::NotStarted {
                reason: e.as_label().to_string(),
            })?;
        if asset.duration.is_none() {
            asset.duration = duration_secs.map(Duration::from_secs_f64);
        }

        let handle = self
            .supervisor
            .start(&asset, &self.settings)
            .map_err(|e| StartFailure::NotStarted {
                reason: e.as_label().to_string(),
            })?;

        if let Err(e) = self.ledger.mark_active(id).await {
            self.supervisor.stop(handle.generation);
            return Err(StartFailure::RolledBack {
                generation: handle.generation,
                asset_id: handle.asset_id,
                reason: e.as_label().to_string(),
            });
        }
        Ok(handle)
    }

    /// Records a failed attempt and schedules the retry or declares the
    /// entry exhausted.
    async fn apply_failure(&mut self, id: &str, reason: &str) {
        match self
            .ledger
            .record_failure(id, reason, &self.cfg.retry, self.cfg.failure_policy)
            .await
        {
            Ok(FailureDisposition::Requeued { attempt }) => {
                let delay = self.cfg.retry.delay_for(attempt);
                self.retry_at = Some(tokio::time::Instant::now() + delay);
                self.bus.publish(
                    Event::now(EventKind::RetryScheduled)
                        .with_asset(id)
                        .with_attempt(attempt)
                        .with_delay(delay)
                        .with_reason(reason.to_string()),
                );
            }
            Ok(FailureDisposition::Exhausted) => {
                self.bus.publish(
                    Event::now(EventKind::AssetExhausted)
                        .with_asset(id)
                        .with_reason(reason.to_string()),
                );
                if self.cfg.failure_policy == FailurePolicy::Remove {
                    self.bus.publish(
                        Event::now(EventKind::AssetRemoved)
                            .with_asset(id)
                            .with_reason("retry budget exhausted"),
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    asset = id,
                    error = %e,
                    "failed to record failure durably; queue frozen until restart"
                );
            }
        }
    }

    // ---- exit events ------------------------------------------------------

    /// Processes one exit event from the supervisor.
    async fn handle_exit(&mut self, exit: ExitEvent) {
        if !self.supervisor.reap(&exit) {
            // Superseded generation: the process was already replaced or
            // acknowledged; its late exit must not touch current state.
            return;
        }

        let asset_id = exit.asset_id.to_string();
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        match state {
            SessionState::Active { handle, .. } if handle.generation == exit.generation => {
                self.finish_natural(&asset_id, &exit).await;
            }
            SessionState::Stopping {
                generation,
                disposition,
                ..
            } if generation == exit.generation => {
                self.finish_stopped(&asset_id, &exit, disposition).await;
            }
            other => {
                // Generation matched the supervisor but not the state
                // machine; nothing to record.
                self.state = other;
            }
        }
    }

    /// Terminal handling for a session that ended on its own.
    async fn finish_natural(&mut self, asset_id: &str, exit: &ExitEvent) {
        match exit.outcome {
            ExitOutcome::Completed => {
                let mut event = Event::now(EventKind::SessionCompleted)
                    .with_asset(asset_id)
                    .with_generation(exit.generation);
                if let Some(code) = exit.exit_code {
                    event = event.with_exit_code(code);
                }
                self.bus.publish(event);

                if let Err(e) = self.ledger.complete(asset_id).await {
                    tracing::error!(
                        asset = asset_id,
                        error = %e,
                        "failed to record completion durably"
                    );
                    return;
                }
                if self.ledger.peek_next().is_none() {
                    self.bus.publish(Event::now(EventKind::QueueDrained));
                }
            }
            ExitOutcome::Failed(reason) => {
                let mut event = Event::now(EventKind::SessionFailed)
                    .with_asset(asset_id)
                    .with_generation(exit.generation)
                    .with_reason(reason.to_string());
                if let Some(code) = exit.exit_code {
                    event = event.with_exit_code(code);
                }
                self.bus.publish(event);
                self.apply_failure(asset_id, reason.as_label()).await;
            }
            ExitOutcome::Stopped => {
                // A Stopped outcome without a Stopping state should be
                // impossible; treat it as a skip so the entry is not lost.
                self.bus.publish(
                    Event::now(EventKind::SessionStopped)
                        .with_asset(asset_id)
                        .with_generation(exit.generation),
                );
                if let Err(e) = self
                    .ledger
                    .record_skip(asset_id, self.cfg.failure_policy)
                    .await
                {
                    tracing::error!(asset = asset_id, error = %e, "failed to record stop");
                }
            }
        }
    }

    /// Terminal handling for a deliberately stopped session.
    async fn finish_stopped(
        &mut self,
        asset_id: &str,
        exit: &ExitEvent,
        disposition: StopDisposition,
    ) {
        self.bus.publish(
            Event::now(EventKind::SessionStopped)
                .with_asset(asset_id)
                .with_generation(exit.generation),
        );

        match disposition {
            StopDisposition::Skip | StopDisposition::Halt => {
                if let Err(e) = self
                    .ledger
                    .record_skip(asset_id, self.cfg.failure_policy)
                    .await
                {
                    tracing::error!(asset = asset_id, error = %e, "failed to record skip");
                    return;
                }
                if self.cfg.failure_policy == FailurePolicy::Remove {
                    self.bus.publish(
                        Event::now(EventKind::AssetRemoved)
                            .with_asset(asset_id)
                            .with_reason(FailureReason::ManualSkip.as_label()),
                    );
                }
            }
            StopDisposition::AbortedStart => {
                // The rolled-back start already recorded its failure.
            }
        }
    }

    // ---- commands ---------------------------------------------------------

    /// Processes one external command and replies.
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { id, reply } => {
                let result = self.do_enqueue(&id).await;
                let _ = reply.send(result);
            }
            Command::Remove { id, reply } => {
                let result = self.do_remove(&id).await;
                let _ = reply.send(result);
            }
            Command::Reorder {
                id,
                position,
                reply,
            } => {
                let result = self.do_reorder(&id, position).await;
                let _ = reply.send(result);
            }
            Command::ListQueue { reply } => {
                let _ = reply.send(QueueEntryView::from_entries(self.ledger.entries()));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.current_status());
            }
            Command::Skip { reply } => {
                let _ = reply.send(self.do_skip());
            }
            Command::StopAll { reply } => {
                let _ = reply.send(self.do_stop_all());
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.do_resume());
            }
            Command::UpdateSettings { settings, reply } => {
                let result = self.do_update_settings(settings).await;
                let _ = reply.send(result);
            }
            Command::CurrentSettings { reply } => {
                let _ = reply.send(self.settings.clone());
            }
            Command::Shutdown { .. } => {
                // Handled in the run loop; unreachable here.
            }
        }
    }

    async fn do_enqueue(&mut self, id: &str) -> Result<usize, ControlError> {
        // Resolution up front: a dangling id is rejected at enqueue time,
        // not discovered when it reaches the head.
        let asset = self.assets.resolve(id).await?;
        let duration_secs = asset.duration.map(|d| d.as_secs_f64());
        let position = self.ledger.enqueue(id, duration_secs).await?;
        self.bus
            .publish(Event::now(EventKind::AssetEnqueued).with_asset(id));
        Ok(position)
    }

    async fn do_remove(&mut self, id: &str) -> Result<(), ControlError> {
        self.ledger.dequeue(id).await?;
        self.bus.publish(
            Event::now(EventKind::AssetRemoved)
                .with_asset(id)
                .with_reason("operator"),
        );
        Ok(())
    }

    async fn do_reorder(&mut self, id: &str, position: usize) -> Result<usize, ControlError> {
        let landed = self.ledger.reorder(id, position).await?;
        self.bus
            .publish(Event::now(EventKind::QueueReordered).with_asset(id));
        Ok(landed)
    }

    fn do_skip(&mut self) -> Result<(), ControlError> {
        match &self.state {
            SessionState::Active { handle, .. } => {
                let generation = handle.generation;
                let asset_id = Arc::clone(&handle.asset_id);
                self.supervisor.stop(generation);
                self.state = SessionState::Stopping {
                    asset_id,
                    generation,
                    disposition: StopDisposition::Skip,
                };
                Ok(())
            }
            // Already stopping: idempotent.
            SessionState::Stopping { .. } => Ok(()),
            _ => Err(ControlError::NoActiveSession),
        }
    }

    fn do_stop_all(&mut self) -> Result<(), ControlError> {
        if !self.halted {
            self.halted = true;
            self.bus.publish(Event::now(EventKind::BroadcastHalted));
        }
        if let SessionState::Active { handle, .. } = &self.state {
            let generation = handle.generation;
            let asset_id = Arc::clone(&handle.asset_id);
            self.supervisor.stop(generation);
            self.state = SessionState::Stopping {
                asset_id,
                generation,
                disposition: StopDisposition::Halt,
            };
        }
        Ok(())
    }

    fn do_resume(&mut self) -> Result<(), ControlError> {
        if self.halted {
            self.halted = false;
            self.bus.publish(Event::now(EventKind::BroadcastResumed));
        }
        Ok(())
    }

    async fn do_update_settings(
        &mut self,
        settings: StreamSettings,
    ) -> Result<(), ControlError> {
        if matches!(
            self.state,
            SessionState::Active { .. } | SessionState::Starting { .. }
        ) {
            return Err(ControlError::SettingsLocked);
        }
        self.persistence.save_settings(&settings).await?;
        self.settings = settings;
        self.bus.publish(Event::now(EventKind::SettingsUpdated));
        Ok(())
    }

    fn current_status(&self) -> BroadcastStatus {
        match &self.state {
            SessionState::Idle => BroadcastStatus::Idle {
                halted: self.halted,
            },
            SessionState::Starting { asset_id, attempt } => BroadcastStatus::Starting {
                asset_id: asset_id.clone(),
                attempt: *attempt,
            },
            SessionState::Active {
                handle,
                started_at_utc,
            } => BroadcastStatus::Active {
                asset_id: handle.asset_id.to_string(),
                generation: handle.generation,
                started_at: *started_at_utc,
                uptime_secs: handle.started_at.elapsed().as_secs(),
            },
            SessionState::Stopping {
                asset_id,
                generation,
                ..
            } => BroadcastStatus::Stopping {
                asset_id: asset_id.to_string(),
                generation: *generation,
            },
        }
    }

    // ---- shutdown ---------------------------------------------------------

    /// Stops the running session (if any) within the grace period, requeues
    /// the interrupted entry so the next boot resumes at the same head, and
    /// exits.
    async fn shutdown_gracefully(mut self, why: &str) -> Result<(), RuntimeError> {
        self.bus
            .publish(Event::now(EventKind::ShutdownRequested).with_reason(why.to_string()));

        let Some(generation) = self.supervisor.current_generation() else {
            self.bus.publish(Event::now(EventKind::AllStoppedWithin));
            return Ok(());
        };
        let asset = self.supervisor.current_asset();
        self.supervisor.stop(generation);

        let grace = self.cfg.grace;
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, self.exit_rx.recv()).await {
                Ok(Some(exit)) => {
                    if !self.supervisor.reap(&exit) {
                        continue; // stale event from an earlier generation
                    }
                    if let Some(active) = self.ledger.active().map(|e| e.id.clone()) {
                        if let Err(e) = self.ledger.record_interrupted(&active).await {
                            tracing::error!(
                                asset = %active,
                                error = %e,
                                "failed to requeue interrupted entry"
                            );
                        }
                    }
                    self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                    return Ok(());
                }
                Ok(None) => {
                    self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                    return Ok(());
                }
                Err(_elapsed) => {
                    self.bus.publish(Event::now(EventKind::GraceExceeded));
                    return Err(RuntimeError::GraceExceeded {
                        grace,
                        asset: asset.map(|a| a.to_string()),
                    });
                }
            }
        }
    }
}

/// Internal start-failure classification: whether a subprocess was spawned
/// and must be waited out.
enum StartFailure {
    NotStarted {
        reason: String,
    },
    RolledBack {
        generation: u64,
        asset_id: Arc<str>,
        reason: String,
    },
}
