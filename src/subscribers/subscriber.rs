//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for plugging custom event handlers
//! (metrics, alerting, audit trails) into the runtime.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue; panics
//! are caught and reported as [`EventKind::SubscriberPanicked`]
//! (crate::events::EventKind::SubscriberPanicked).
//!
//! ## Rules
//! - Events are processed sequentially (FIFO) per subscriber.
//! - Queue overflow drops the event for this subscriber only and publishes
//!   `SubscriberOverflow`; other subscribers are unaffected.
//! - Subscribers never block publishers or each other.

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    ///
    /// Prefer short, descriptive names ("metrics", "audit"). The default
    /// uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber
    /// (clamped to a minimum of 1; default 1024).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
