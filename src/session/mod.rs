//! Encoder session supervision.
//!
//! A *session* is one run of the external encoder subprocess bound to
//! exactly one asset. [`SessionSupervisor`] owns zero or one such
//! subprocess; every spawn increments a generation counter that tags the
//! session's [`ExitEvent`], so a late notification from a superseded process
//! can never be misapplied to its successor.

mod command;
mod monitor;
mod supervisor;

use std::sync::Arc;
use std::time::Duration;

pub use supervisor::SessionSupervisor;

/// Why a session was classified `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The encoder produced no progress past the stall timeout.
    Stalled,
    /// The encoder exited with a non-zero code (`None` = killed by signal).
    NonZeroExit(Option<i32>),
    /// The encoder exited cleanly but provably broadcast less than the
    /// completion threshold of the known media duration.
    ShortOutput,
    /// Recorded by the orchestrator when an operator skipped the entry.
    ManualSkip,
}

impl FailureReason {
    /// Returns a short stable label for logs and ledger entries.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureReason::Stalled => "stalled",
            FailureReason::NonZeroExit(_) => "nonzero-exit",
            FailureReason::ShortOutput => "short-output",
            FailureReason::ManualSkip => "manual-skip",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NonZeroExit(Some(code)) => write!(f, "nonzero-exit({code})"),
            FailureReason::NonZeroExit(None) => write!(f, "nonzero-exit(signal)"),
            other => f.write_str(other.as_label()),
        }
    }
}

/// Terminal classification of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The asset was broadcast to completion.
    Completed,
    /// Termination was explicitly requested via `stop` (not an error).
    Stopped,
    /// The session failed; the reason feeds the ledger entry.
    Failed(FailureReason),
}

/// Exactly-once notification that a spawned subprocess terminated.
#[derive(Clone, Debug)]
pub struct ExitEvent {
    /// Generation of the subprocess this event belongs to.
    pub generation: u64,
    /// Asset the session was bound to.
    pub asset_id: Arc<str>,
    /// Raw exit code, when the process exited rather than being signalled.
    pub exit_code: Option<i32>,
    /// Broadcast progress observed: encoder-reported media time when
    /// available, wall-clock elapsed otherwise.
    pub duration_observed: Duration,
    /// Classification of the exit.
    pub outcome: ExitOutcome,
}

/// Descriptor of a successfully started session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    /// Generation of the spawned subprocess.
    pub generation: u64,
    /// Asset bound to the session.
    pub asset_id: Arc<str>,
    /// When the subprocess was spawned.
    pub started_at: std::time::Instant,
}
