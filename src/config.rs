//! # Global runtime configuration.
//!
//! [`Config`] centralizes the orchestrator's tunables; [`StreamSettings`] is
//! the independently persisted record of where and how to broadcast.
//!
//! Config is used in two ways:
//! 1. **Orchestrator creation**: `Orchestrator::new(config, ...)`
//! 2. **Session supervision**: the supervisor copies its timeouts from here
//!
//! ## Sentinel values
//! - `stall_timeout = 0s` → stall detection disabled
//! - `start_timeout = 0s` → no streaming-confirmation deadline

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::RetryPolicy;

/// Disposition of entries that exhausted their retry budget or were skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the entry in the ledger as `failed` for operator inspection.
    #[default]
    Keep,
    /// Remove the entry from the ledger immediately.
    Remove,
}

/// Target endpoint and encoding parameters for the outbound stream.
///
/// Owned by configuration, read by the session supervisor at session start,
/// and never written into the queue snapshot. Changes apply from the next
/// session start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// RTMP ingest URL, without the stream key.
    pub rtmp_url: String,
    /// Stream key appended to the ingest URL.
    pub stream_key: String,
    /// Output resolution, e.g. `1920x1080`.
    pub resolution: String,
    /// Video bitrate in kbit/s.
    pub bitrate_kbps: u32,
    /// Output frame rate.
    pub fps: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            rtmp_url: "rtmp://example.com/live".to_string(),
            stream_key: "your_stream_key".to_string(),
            resolution: "1920x1080".to_string(),
            bitrate_kbps: 2500,
            fps: 30,
        }
    }
}

impl StreamSettings {
    /// Returns the full publish target (`rtmp_url/stream_key`).
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.rtmp_url.trim_end_matches('/'), self.stream_key)
    }
}

/// Global configuration for the broadcast orchestrator.
///
/// ## Field semantics
/// - `encoder_bin`: encoder executable; tests substitute a stub
/// - `grace`: maximum wait for the session to stop on shutdown
/// - `start_timeout`: deadline for the encoder's first progress report
/// - `stop_grace`: wait between graceful terminate and forced kill
/// - `stall_timeout`: rolling no-progress deadline while streaming
/// - `completion_threshold`: fraction of the media duration that counts as a
///   complete broadcast (clamped to `0.0..=1.0` by the accessor)
#[derive(Clone, Debug)]
pub struct Config {
    /// Encoder executable name or path.
    pub encoder_bin: String,

    /// Maximum time to wait for the running session to stop during shutdown.
    pub grace: Duration,

    /// Deadline for the encoder subprocess to report it is actually
    /// streaming. `0s` disables the deadline.
    pub start_timeout: Duration,

    /// Grace period between graceful termination and forced kill.
    pub stop_grace: Duration,

    /// A running encoder producing no progress for this long is treated as
    /// stalled and killed. `0s` disables stall detection.
    pub stall_timeout: Duration,

    /// Fraction of the known media duration at which a broadcast counts as
    /// complete even if the encoder exited abnormally.
    pub completion_threshold: f64,

    /// Automatic-retry budget and backoff for failing entries.
    pub retry: RetryPolicy,

    /// What happens to exhausted or skipped entries.
    pub failure_policy: FailurePolicy,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Capacity of the orchestrator's command mailbox.
    pub command_capacity: usize,
}

impl Config {
    /// Returns the streaming-confirmation deadline as an `Option`.
    #[inline]
    pub fn start_deadline(&self) -> Option<Duration> {
        (self.start_timeout > Duration::ZERO).then_some(self.start_timeout)
    }

    /// Returns the stall deadline as an `Option`.
    #[inline]
    pub fn stall_deadline(&self) -> Option<Duration> {
        (self.stall_timeout > Duration::ZERO).then_some(self.stall_timeout)
    }

    /// Returns the completion threshold clamped to `0.0..=1.0`.
    #[inline]
    pub fn completion_threshold_clamped(&self) -> f64 {
        self.completion_threshold.clamp(0.0, 1.0)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `encoder_bin = "ffmpeg"`
    /// - `grace = 30s`, `start_timeout = 15s`, `stop_grace = 5s`,
    ///   `stall_timeout = 20s`
    /// - `completion_threshold = 0.95`
    /// - `retry = RetryPolicy::default()` (one automatic retry)
    /// - `failure_policy = Keep`
    /// - `bus_capacity = 1024`, `command_capacity = 64`
    fn default() -> Self {
        Self {
            encoder_bin: "ffmpeg".to_string(),
            grace: Duration::from_secs(30),
            start_timeout: Duration::from_secs(15),
            stop_grace: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(20),
            completion_threshold: 0.95,
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::Keep,
            bus_capacity: 1024,
            command_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_url_and_key() {
        let settings = StreamSettings {
            rtmp_url: "rtmp://ingest.example.com/live/".to_string(),
            stream_key: "abc123".to_string(),
            ..StreamSettings::default()
        };
        assert_eq!(settings.endpoint(), "rtmp://ingest.example.com/live/abc123");
    }

    #[test]
    fn test_zero_timeouts_disable_deadlines() {
        let cfg = Config {
            start_timeout: Duration::ZERO,
            stall_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(cfg.start_deadline().is_none());
        assert!(cfg.stall_deadline().is_none());
    }
}
