//! # LogWriter — tracing-backed event subscriber.
//!
//! Renders every runtime event as a structured `tracing` record. Install a
//! `tracing_subscriber` in the binary to see the output.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Built-in subscriber that logs events through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn asset(event: &Event) -> &str {
    event.asset.as_deref().unwrap_or("-")
}

fn reason(event: &Event) -> &str {
    event.reason.as_deref().unwrap_or("-")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::AssetEnqueued => {
                info!(asset = asset(e), "asset enqueued");
            }
            EventKind::AssetRemoved => {
                info!(asset = asset(e), reason = reason(e), "asset removed");
            }
            EventKind::QueueReordered => {
                info!(asset = asset(e), "queue reordered");
            }
            EventKind::QueueDrained => {
                info!("queue drained, session idle");
            }
            EventKind::SessionStarting => {
                info!(asset = asset(e), attempt = e.attempt, "session starting");
            }
            EventKind::SessionStreaming => {
                info!(
                    asset = asset(e),
                    generation = e.generation,
                    "encoder is streaming"
                );
            }
            EventKind::SessionCompleted => {
                info!(
                    asset = asset(e),
                    generation = e.generation,
                    exit_code = e.exit_code,
                    "session completed"
                );
            }
            EventKind::SessionFailed => {
                warn!(
                    asset = asset(e),
                    generation = e.generation,
                    exit_code = e.exit_code,
                    reason = reason(e),
                    "session failed"
                );
            }
            EventKind::SessionStopped => {
                info!(
                    asset = asset(e),
                    generation = e.generation,
                    "session stopped by operator"
                );
            }
            EventKind::StallDetected => {
                warn!(
                    asset = asset(e),
                    generation = e.generation,
                    reason = reason(e),
                    "encoder stalled"
                );
            }
            EventKind::RetryScheduled => {
                warn!(
                    asset = asset(e),
                    attempt = e.attempt,
                    delay_ms = e.delay_ms,
                    reason = reason(e),
                    "retry scheduled"
                );
            }
            EventKind::AssetExhausted => {
                error!(
                    asset = asset(e),
                    attempt = e.attempt,
                    reason = reason(e),
                    "retry budget exhausted"
                );
            }
            EventKind::RecoveryApplied => {
                info!(detail = reason(e), "startup recovery applied");
            }
            EventKind::SettingsUpdated => {
                info!("stream settings updated");
            }
            EventKind::BroadcastHalted => {
                info!("broadcast halted");
            }
            EventKind::BroadcastResumed => {
                info!("broadcast resumed");
            }
            EventKind::ShutdownRequested => {
                info!(reason = reason(e), "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!("session stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!("shutdown grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = asset(e), reason = reason(e), "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = asset(e), info = reason(e), "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
