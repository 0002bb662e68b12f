//! # Session monitor: progress parsing, watchdogs, exit classification.
//!
//! One monitor task is spawned per encoder subprocess. It owns the child
//! handle and is the only place the child is waited on or terminated, which
//! guarantees exactly one [`ExitEvent`] per spawn.
//!
//! ```text
//! supervise(child):
//!   loop {
//!     ├─ stderr line  → parse progress, publish SessionStreaming (first)
//!     ├─ watchdog     → no progress past deadline → StallDetected, terminate
//!     ├─ cancel token → stop requested → terminate (SIGTERM → grace → kill)
//!     └─ child exit   → natural termination
//!   }
//!   classify(stop, stalled, exit_code, observed, media, threshold)
//!   exit_tx.send(ExitEvent)            // exactly once
//! ```
//!
//! ## Rules
//! - Terminal ledger/bus bookkeeping happens in the orchestrator, not here;
//!   the monitor only publishes `SessionStreaming` and `StallDetected`.
//! - The stall deadline also covers the pre-streaming window: an encoder
//!   that never reports progress is killed at `start_timeout`.
//! - `terminate` treats an already-dead process as success.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::session::{ExitEvent, ExitOutcome, FailureReason};

/// Watchdog polling resolution.
const WATCHDOG_TICK: Duration = Duration::from_millis(100);

/// Everything the monitor task needs, captured at spawn time.
pub(crate) struct MonitorParams {
    pub generation: u64,
    pub asset_id: Arc<str>,
    pub media_duration: Option<Duration>,
    pub start_deadline: Option<Duration>,
    pub stall_deadline: Option<Duration>,
    pub stop_grace: Duration,
    pub completion_threshold: f64,
    pub stop_flag: Arc<AtomicBool>,
    pub cancel: CancellationToken,
    pub bus: Bus,
    pub exit_tx: mpsc::Sender<ExitEvent>,
}

/// Rolling view of encoder progress.
struct Progress {
    media_time: Option<Duration>,
    streamed: bool,
    last_update: Instant,
}

impl Progress {
    fn new(started: Instant) -> Self {
        Self {
            media_time: None,
            streamed: false,
            last_update: started,
        }
    }

    fn record(&mut self, update: ProgressUpdate, now: Instant) {
        self.streamed = true;
        self.last_update = now;
        if let Some(t) = update.media_time {
            self.media_time = Some(t);
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }
}

/// One parsed progress record.
pub(crate) struct ProgressUpdate {
    pub media_time: Option<Duration>,
}

/// Parses one `-progress pipe:2` line into a progress update.
///
/// Unrecognized lines (encoder log noise shares the pipe) return `None`.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is in microseconds despite the name (ffmpeg quirk);
        // out_time_us is the unambiguous spelling on newer builds.
        "out_time_us" | "out_time_ms" => {
            let us: i64 = value.trim().parse().ok()?;
            Some(ProgressUpdate {
                media_time: (us >= 0).then(|| Duration::from_micros(us as u64)),
            })
        }
        "out_time" => Some(ProgressUpdate {
            media_time: parse_clock(value.trim()),
        }),
        "frame" | "total_size" | "bitrate" | "speed" | "progress" => {
            Some(ProgressUpdate { media_time: None })
        }
        _ => None,
    }
}

/// Parses `HH:MM:SS.frac` into a duration.
fn parse_clock(value: &str) -> Option<Duration> {
    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64((hours * 3600 + minutes * 60) as f64 + seconds))
}

/// Classifies a terminated session.
///
/// Precedence: deliberate stop > reached completion threshold > stall >
/// exit code. An exit code of 0 with a known media duration that was
/// provably not reached is `short-output`, not success.
pub(crate) fn classify(
    stop_requested: bool,
    stalled: bool,
    exit_code: Option<i32>,
    observed_media: Option<Duration>,
    media_duration: Option<Duration>,
    threshold: f64,
) -> ExitOutcome {
    if stop_requested {
        return ExitOutcome::Stopped;
    }
    if reached_threshold(observed_media, media_duration, threshold) {
        return ExitOutcome::Completed;
    }
    if stalled {
        return ExitOutcome::Failed(FailureReason::Stalled);
    }
    match exit_code {
        Some(0) => {
            if media_duration.is_some() {
                ExitOutcome::Failed(FailureReason::ShortOutput)
            } else {
                ExitOutcome::Completed
            }
        }
        Some(code) => ExitOutcome::Failed(FailureReason::NonZeroExit(Some(code))),
        None => ExitOutcome::Failed(FailureReason::NonZeroExit(None)),
    }
}

fn reached_threshold(
    observed: Option<Duration>,
    media: Option<Duration>,
    threshold: f64,
) -> bool {
    match (observed, media) {
        (Some(observed), Some(media)) => {
            observed.as_secs_f64() >= media.as_secs_f64() * threshold
        }
        _ => false,
    }
}

/// Runs the monitor to completion and delivers the exit event.
pub(crate) async fn supervise(mut child: Child, p: MonitorParams) {
    let started = Instant::now();
    let mut lines: Option<Lines<BufReader<ChildStderr>>> =
        child.stderr.take().map(|s| BufReader::new(s).lines());
    let mut progress = Progress::new(started);
    let mut stalled = false;

    let mut watchdog = tokio::time::interval(WATCHDOG_TICK);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

    enum LoopExit {
        StopRequested,
        Stalled,
        Exited(std::io::Result<ExitStatus>),
    }

    let loop_exit = loop {
        tokio::select! {
            _ = p.cancel.cancelled() => break LoopExit::StopRequested,

            line = next_line(&mut lines), if lines.is_some() => {
                match line {
                    Some(line) => {
                        if let Some(update) = parse_progress_line(&line) {
                            let first = !progress.streamed;
                            progress.record(update, Instant::now());
                            if first {
                                p.bus.publish(
                                    Event::now(EventKind::SessionStreaming)
                                        .with_asset(Arc::clone(&p.asset_id))
                                        .with_generation(p.generation),
                                );
                            }
                        }
                    }
                    // EOF: the encoder closed stderr; exit follows shortly.
                    None => lines = None,
                }
            }

            _ = watchdog.tick() => {
                let deadline = if progress.streamed {
                    p.stall_deadline
                } else {
                    p.start_deadline.or(p.stall_deadline)
                };
                if let Some(deadline) = deadline {
                    if progress.idle_for(Instant::now()) >= deadline {
                        stalled = true;
                        p.bus.publish(
                            Event::now(EventKind::StallDetected)
                                .with_asset(Arc::clone(&p.asset_id))
                                .with_generation(p.generation)
                                .with_reason(if progress.streamed {
                                    "no progress past stall timeout"
                                } else {
                                    "no progress since start"
                                }),
                        );
                        break LoopExit::Stalled;
                    }
                }
            }

            res = child.wait() => break LoopExit::Exited(res),
        }
    };

    let status = match loop_exit {
        LoopExit::StopRequested | LoopExit::Stalled => {
            // Closing our end of the pipe first: a child blocked on a full
            // stderr pipe must not outlive the grace window.
            drop(lines.take());
            terminate(&mut child, p.stop_grace).await
        }
        LoopExit::Exited(res) => {
            // The exit may have won the select over buffered progress lines;
            // drain them so classification sees the final media time.
            drain_progress(&mut lines, &mut progress).await;
            res
        }
    };

    let exit_code = status.ok().and_then(|s| s.code());
    let stop_requested = p.stop_flag.load(Ordering::SeqCst);
    let outcome = classify(
        stop_requested,
        stalled,
        exit_code,
        progress.media_time,
        p.media_duration,
        p.completion_threshold,
    );

    let duration_observed = progress
        .media_time
        .unwrap_or_else(|| started.elapsed());

    let _ = p
        .exit_tx
        .send(ExitEvent {
            generation: p.generation,
            asset_id: p.asset_id,
            exit_code,
            duration_observed,
            outcome,
        })
        .await;
}

async fn next_line(lines: &mut Option<Lines<BufReader<ChildStderr>>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Reads whatever the dead encoder left buffered on stderr, bounded so a
/// wedged pipe cannot hold the exit event hostage.
async fn drain_progress(
    lines: &mut Option<Lines<BufReader<ChildStderr>>>,
    progress: &mut Progress,
) {
    const DRAIN_BUDGET: Duration = Duration::from_millis(200);
    let deadline = Instant::now() + DRAIN_BUDGET;
    while lines.is_some() {
        match tokio::time::timeout_at(deadline, next_line(lines)).await {
            Ok(Some(line)) => {
                if let Some(update) = parse_progress_line(&line) {
                    progress.record(update, Instant::now());
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}

/// Graceful termination: SIGTERM, bounded wait, forced kill.
///
/// Safe against a process that already exited (the signal is a no-op and
/// `wait` returns the stored status).
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    signal_term(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(res) => res,
        Err(_elapsed) => {
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn signal_term(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: signalling a child we spawned; ESRCH (already gone) is harmless.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn signal_term(_child: &Child) {
    // No portable graceful signal; the forced kill after the grace window
    // is the only escalation.
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f64 = 0.95;

    fn secs(s: u64) -> Option<Duration> {
        Some(Duration::from_secs(s))
    }

    #[test]
    fn test_parse_out_time_us() {
        let update = parse_progress_line("out_time_us=5000000").expect("parsed");
        assert_eq!(update.media_time, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_out_time_ms_is_microseconds() {
        let update = parse_progress_line("out_time_ms=5000000").expect("parsed");
        assert_eq!(update.media_time, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_out_time_clock() {
        let update = parse_progress_line("out_time=00:01:30.500000").expect("parsed");
        assert_eq!(update.media_time, Some(Duration::from_millis(90_500)));
    }

    #[test]
    fn test_parse_counts_other_keys_as_progress() {
        assert!(parse_progress_line("frame=42").is_some());
        assert!(parse_progress_line("total_size=1024").is_some());
        assert!(parse_progress_line("progress=continue").is_some());
    }

    #[test]
    fn test_parse_ignores_log_noise() {
        assert!(parse_progress_line("[flv @ 0x55] muxing overhead").is_none());
        assert!(parse_progress_line("").is_none());
        assert!(parse_progress_line("out_time_us=garbage").is_none());
    }

    #[test]
    fn test_classify_stop_wins() {
        let outcome = classify(true, false, Some(1), secs(1), secs(100), T);
        assert_eq!(outcome, ExitOutcome::Stopped);
    }

    #[test]
    fn test_classify_clean_exit_completes() {
        let outcome = classify(false, false, Some(0), None, None, T);
        assert_eq!(outcome, ExitOutcome::Completed);
    }

    #[test]
    fn test_classify_threshold_completes_despite_bad_exit() {
        // Encoder died at 96% of a 100s asset: completed.
        let outcome = classify(false, false, Some(1), secs(96), secs(100), T);
        assert_eq!(outcome, ExitOutcome::Completed);
    }

    #[test]
    fn test_classify_short_output_on_clean_exit() {
        // Exit 0 but only 10% of a known duration was broadcast.
        let outcome = classify(false, false, Some(0), secs(10), secs(100), T);
        assert_eq!(outcome, ExitOutcome::Failed(FailureReason::ShortOutput));
    }

    #[test]
    fn test_classify_stall() {
        let outcome = classify(false, true, None, secs(10), secs(100), T);
        assert_eq!(outcome, ExitOutcome::Failed(FailureReason::Stalled));
    }

    #[test]
    fn test_classify_nonzero_exit() {
        let outcome = classify(false, false, Some(1), secs(10), secs(100), T);
        assert_eq!(
            outcome,
            ExitOutcome::Failed(FailureReason::NonZeroExit(Some(1)))
        );
    }

    #[test]
    fn test_classify_signal_kill() {
        let outcome = classify(false, false, None, None, None, T);
        assert_eq!(outcome, ExitOutcome::Failed(FailureReason::NonZeroExit(None)));
    }
}
