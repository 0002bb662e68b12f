//! # Runtime events for the broadcast session and its queue.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Queue events**: ledger mutations (enqueue, remove, reorder, drain)
//! - **Session events**: encoder subprocess lifecycle (starting, streaming,
//!   completed, failed, stopped, stall)
//! - **Runtime events**: recovery, halt/resume, shutdown, subscriber faults
//!
//! The [`Event`] struct carries optional metadata (asset id, generation,
//! attempt, exit code, delay, reason) set per kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Queue events ===
    /// An asset was appended to the queue.
    ///
    /// Sets: `asset`.
    AssetEnqueued,

    /// An asset was removed from the queue (operator removal or
    /// `FailurePolicy::Remove` disposition).
    ///
    /// Sets: `asset`, `reason` (removal cause).
    AssetRemoved,

    /// A queued asset was moved to a new position.
    ///
    /// Sets: `asset`.
    QueueReordered,

    /// The queue ran out of `queued` entries and the session went idle.
    QueueDrained,

    // === Session events ===
    /// A start attempt for the queue head is beginning.
    ///
    /// Sets: `asset`, `attempt`.
    SessionStarting,

    /// The encoder reported its first progress; the stream is live.
    ///
    /// Sets: `asset`, `generation`.
    SessionStreaming,

    /// The session finished and was classified complete.
    ///
    /// Sets: `asset`, `generation`, `exit_code` (when the encoder exited
    /// rather than being superseded).
    SessionCompleted,

    /// The session finished and was classified failed.
    ///
    /// Sets: `asset`, `generation`, `reason`, `exit_code`.
    SessionFailed,

    /// The session terminated because an operator requested it.
    ///
    /// Sets: `asset`, `generation`.
    SessionStopped,

    /// The stall watchdog fired; the encoder is about to be killed.
    ///
    /// Sets: `asset`, `generation`, `reason`.
    StallDetected,

    /// A failed entry was re-queued; the next attempt is delayed.
    ///
    /// Sets: `asset`, `attempt`, `delay_ms`, `reason`.
    RetryScheduled,

    /// An entry exhausted its retry budget and is terminally failed.
    ///
    /// Sets: `asset`, `attempt`, `reason`.
    AssetExhausted,

    // === Runtime events ===
    /// Startup recovery reclassified stale `active` entries.
    ///
    /// Sets: `reason` (summary of what was re-queued / failed).
    RecoveryApplied,

    /// The settings record was replaced.
    SettingsUpdated,

    /// `stop_all` halted automatic queue advancement.
    BroadcastHalted,

    /// `resume` re-enabled automatic queue advancement.
    BroadcastResumed,

    /// Shutdown requested (OS signal or handle).
    ///
    /// Sets: `reason`.
    ShutdownRequested,

    /// The running session stopped within the shutdown grace period.
    AllStoppedWithin,

    /// The shutdown grace period elapsed with the session still running.
    GraceExceeded,

    // === Subscriber faults ===
    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `asset` (subscriber name), `reason`.
    SubscriberOverflow,

    /// A subscriber panicked during event processing.
    ///
    /// Sets: `asset` (subscriber name), `reason` (panic info).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Asset the event concerns (subscriber name for subscriber faults).
    pub asset: Option<Arc<str>>,
    /// Session generation, when a subprocess is involved.
    pub generation: Option<u64>,
    /// Attempt count (1-based).
    pub attempt: Option<u32>,
    /// Encoder exit code, when one was observed.
    pub exit_code: Option<i32>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (failure classification, removal cause, ...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            asset: None,
            generation: None,
            attempt: None,
            exit_code: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches an asset id.
    #[inline]
    pub fn with_asset(mut self, asset: impl Into<Arc<str>>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Attaches a session generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches an encoder exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let ms = delay.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_asset(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_asset(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::now(EventKind::AssetEnqueued);
        let b = Event::now(EventKind::AssetEnqueued);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::now(EventKind::SessionFailed)
            .with_asset("intro.mp4")
            .with_generation(3)
            .with_attempt(2)
            .with_exit_code(1)
            .with_delay(Duration::from_millis(1500))
            .with_reason("nonzero-exit");

        assert_eq!(ev.asset.as_deref(), Some("intro.mp4"));
        assert_eq!(ev.generation, Some(3));
        assert_eq!(ev.attempt, Some(2));
        assert_eq!(ev.exit_code, Some(1));
        assert_eq!(ev.delay_ms, Some(1500));
        assert_eq!(ev.reason.as_deref(), Some("nonzero-exit"));
    }
}
