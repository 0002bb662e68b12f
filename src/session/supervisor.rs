//! # SessionSupervisor: owner of the encoder subprocess.
//!
//! Owns exactly zero or one running encoder subprocess bound to one asset.
//! Spawning, stopping, and reaping are only ever invoked from the
//! orchestrator's control task; no external caller touches the subprocess.
//!
//! ## Rules
//! - `start` increments the generation counter; the returned handle and the
//!   eventual exit event both carry that generation.
//! - `stop` for a stale generation is a no-op; calling it repeatedly is safe.
//! - Exactly one [`ExitEvent`] is delivered per spawn, on the channel
//!   returned from [`SessionSupervisor::new`]. The orchestrator is the sole
//!   consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assets::ResolvedAsset;
use crate::config::{Config, StreamSettings};
use crate::error::SessionError;
use crate::events::Bus;
use crate::session::command::encoder_command;
use crate::session::monitor::{self, MonitorParams};
use crate::session::{ExitEvent, SessionHandle};

/// Capacity of the exit-event channel. One subprocess exists at a time, so
/// a small buffer only needs to absorb reap latency.
const EXIT_CHANNEL_CAPACITY: usize = 8;

/// Timeouts and knobs the supervisor copies out of [`Config`].
#[derive(Clone, Debug)]
struct Tunables {
    encoder_bin: String,
    start_deadline: Option<Duration>,
    stall_deadline: Option<Duration>,
    stop_grace: Duration,
    completion_threshold: f64,
}

/// Book-keeping for the live subprocess.
struct RunningSession {
    generation: u64,
    asset_id: Arc<str>,
    stop_flag: Arc<AtomicBool>,
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
}

/// Supervises the lifecycle of the external encoder subprocess.
pub struct SessionSupervisor {
    tunables: Tunables,
    bus: Bus,
    exit_tx: mpsc::Sender<ExitEvent>,
    generation: u64,
    current: Option<RunningSession>,
}

impl SessionSupervisor {
    /// Creates a supervisor and the exit-event channel it reports on.
    pub fn new(cfg: &Config, bus: Bus) -> (Self, mpsc::Receiver<ExitEvent>) {
        let (exit_tx, exit_rx) = mpsc::channel(EXIT_CHANNEL_CAPACITY);
        let supervisor = Self {
            tunables: Tunables {
                encoder_bin: cfg.encoder_bin.clone(),
                start_deadline: cfg.start_deadline(),
                stall_deadline: cfg.stall_deadline(),
                stop_grace: cfg.stop_grace,
                completion_threshold: cfg.completion_threshold_clamped(),
            },
            bus,
            exit_tx,
            generation: 0,
            current: None,
        };
        (supervisor, exit_rx)
    }

    /// Starts a session for `asset`.
    ///
    /// Fails with [`SessionError::AlreadyRunning`] if a session exists,
    /// [`SessionError::AssetUnreadable`] if the media file cannot be opened,
    /// or [`SessionError::SpawnFailed`] if the subprocess cannot be created.
    /// On success the generation counter has been incremented and the
    /// monitor task owns the child.
    pub fn start(
        &mut self,
        asset: &ResolvedAsset,
        settings: &StreamSettings,
    ) -> Result<SessionHandle, SessionError> {
        if self.current.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        // Readability gate before burning a generation on a doomed spawn.
        std::fs::File::open(&asset.path).map_err(|e| SessionError::AssetUnreadable {
            id: asset.id.clone(),
            reason: e.to_string(),
        })?;

        let mut cmd = encoder_command(&self.tunables.encoder_bin, asset, settings);
        let child = cmd.spawn().map_err(|e| SessionError::SpawnFailed {
            reason: e.to_string(),
        })?;

        self.generation += 1;
        let generation = self.generation;
        let asset_id: Arc<str> = Arc::from(asset.id.as_str());
        let stop_flag = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let monitor = tokio::spawn(monitor::supervise(
            child,
            MonitorParams {
                generation,
                asset_id: Arc::clone(&asset_id),
                media_duration: asset.duration,
                start_deadline: self.tunables.start_deadline,
                stall_deadline: self.tunables.stall_deadline,
                stop_grace: self.tunables.stop_grace,
                completion_threshold: self.tunables.completion_threshold,
                stop_flag: Arc::clone(&stop_flag),
                cancel: cancel.clone(),
                bus: self.bus.clone(),
                exit_tx: self.exit_tx.clone(),
            },
        ));

        let started_at = std::time::Instant::now();
        self.current = Some(RunningSession {
            generation,
            asset_id: Arc::clone(&asset_id),
            stop_flag,
            cancel,
            monitor,
        });

        Ok(SessionHandle {
            generation,
            asset_id,
            started_at,
        })
    }

    /// Requests graceful termination of the subprocess of `generation`.
    ///
    /// Idempotent: repeated calls, calls after the process exited, and calls
    /// for a stale generation are all no-ops. The `Stopped` classification
    /// arrives through the exit-event channel.
    pub fn stop(&mut self, generation: u64) {
        let Some(current) = &self.current else { return };
        if current.generation != generation {
            return;
        }
        current.stop_flag.store(true, Ordering::SeqCst);
        current.cancel.cancel();
    }

    /// Generation of the live session, if one exists.
    pub fn current_generation(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.generation)
    }

    /// Asset bound to the live session, if one exists.
    pub fn current_asset(&self) -> Option<Arc<str>> {
        self.current.as_ref().map(|c| Arc::clone(&c.asset_id))
    }

    /// Acknowledges an exit event.
    ///
    /// Returns `true` and clears the session slot when the event belongs to
    /// the current generation; `false` for stale events, which callers must
    /// discard.
    pub fn reap(&mut self, exit: &ExitEvent) -> bool {
        match &self.current {
            Some(current) if current.generation == exit.generation => {
                if let Some(session) = self.current.take() {
                    // The monitor sent the event as its last act.
                    session.monitor.abort();
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ExitOutcome;

    fn test_config(encoder_bin: &str) -> Config {
        Config {
            encoder_bin: encoder_bin.to_string(),
            stop_grace: Duration::from_millis(500),
            ..Config::default()
        }
    }

    fn dummy_asset(dir: &std::path::Path) -> ResolvedAsset {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"fake media").expect("write");
        ResolvedAsset {
            id: "clip.mp4".into(),
            path,
            duration: None,
            size: 10,
        }
    }

    #[cfg(unix)]
    fn stub_script(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("encoder.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_unreadable_asset_rejected() {
        let (mut supervisor, _rx) = SessionSupervisor::new(&test_config("true"), Bus::new(16));
        let asset = ResolvedAsset {
            id: "ghost.mp4".into(),
            path: "/nonexistent/ghost.mp4".into(),
            duration: None,
            size: 0,
        };
        let err = supervisor
            .start(&asset, &StreamSettings::default())
            .expect_err("must fail");
        assert_eq!(err.as_label(), "session_asset_unreadable");
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut supervisor, _rx) =
            SessionSupervisor::new(&test_config("/nonexistent/encoder-binary"), Bus::new(16));
        let err = supervisor
            .start(&dummy_asset(dir.path()), &StreamSettings::default())
            .expect_err("must fail");
        assert_eq!(err.as_label(), "session_spawn_failed");
        // A failed spawn must not burn a generation or occupy the slot.
        assert_eq!(supervisor.current_generation(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_start_already_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = stub_script(dir.path(), "exec sleep 30");
        let (mut supervisor, _rx) = SessionSupervisor::new(&test_config(&bin), Bus::new(16));
        let asset = dummy_asset(dir.path());

        let handle = supervisor
            .start(&asset, &StreamSettings::default())
            .expect("first start");
        let err = supervisor
            .start(&asset, &StreamSettings::default())
            .expect_err("second start");
        assert_eq!(err.as_label(), "session_already_running");

        supervisor.stop(handle.generation);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_classified_completed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = stub_script(dir.path(), "exit 0");
        let (mut supervisor, mut rx) = SessionSupervisor::new(&test_config(&bin), Bus::new(16));

        let handle = supervisor
            .start(&dummy_asset(dir.path()), &StreamSettings::default())
            .expect("start");
        let exit = rx.recv().await.expect("exit event");
        assert_eq!(exit.generation, handle.generation);
        assert_eq!(exit.exit_code, Some(0));
        assert_eq!(exit.outcome, ExitOutcome::Completed);
        assert!(supervisor.reap(&exit));
        assert_eq!(supervisor.current_generation(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_is_idempotent_and_generation_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = stub_script(dir.path(), "exec sleep 30");
        let (mut supervisor, mut rx) = SessionSupervisor::new(&test_config(&bin), Bus::new(16));

        let handle = supervisor
            .start(&dummy_asset(dir.path()), &StreamSettings::default())
            .expect("start");

        // Stale-generation stop must not touch the live session.
        supervisor.stop(handle.generation + 1);
        assert_eq!(supervisor.current_generation(), Some(handle.generation));

        supervisor.stop(handle.generation);
        supervisor.stop(handle.generation); // second call: no-op

        let exit = rx.recv().await.expect("exit event");
        assert_eq!(exit.outcome, ExitOutcome::Stopped);
        assert!(supervisor.reap(&exit));

        // Stopping after the session is gone is still a no-op.
        supervisor.stop(handle.generation);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generation_increments_per_spawn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = stub_script(dir.path(), "exit 0");
        let (mut supervisor, mut rx) = SessionSupervisor::new(&test_config(&bin), Bus::new(16));
        let asset = dummy_asset(dir.path());

        let first = supervisor
            .start(&asset, &StreamSettings::default())
            .expect("start 1");
        let exit = rx.recv().await.expect("exit 1");
        assert!(supervisor.reap(&exit));

        let second = supervisor
            .start(&asset, &StreamSettings::default())
            .expect("start 2");
        assert_eq!(second.generation, first.generation + 1);

        // A replayed stale event must not reap the new session.
        assert!(!supervisor.reap(&exit));
        assert_eq!(supervisor.current_generation(), Some(second.generation));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stall_detected_and_killed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = stub_script(dir.path(), "exec sleep 30");
        let cfg = Config {
            encoder_bin: bin,
            start_timeout: Duration::from_millis(200),
            stall_timeout: Duration::from_millis(200),
            stop_grace: Duration::from_millis(500),
            ..Config::default()
        };
        let (mut supervisor, mut rx) = SessionSupervisor::new(&cfg, Bus::new(16));

        supervisor
            .start(&dummy_asset(dir.path()), &StreamSettings::default())
            .expect("start");
        let exit = rx.recv().await.expect("exit event");
        assert_eq!(
            exit.outcome,
            ExitOutcome::Failed(crate::session::FailureReason::Stalled)
        );
        assert!(supervisor.reap(&exit));
    }
}
