//! Event subscribers for the streamvisor runtime.
//!
//! Subscribers observe the [`Bus`](crate::events::Bus) through a fan-out
//! layer that isolates them from the control loop and from each other:
//!
//! ```text
//! Orchestrator / monitor ── publish ──► Bus ──► fan-out listener
//!                                                 │
//!                                    ┌────────────┼────────────┐
//!                                    ▼            ▼            ▼
//!                               [queue 1]    [queue 2]    [queue N]
//!                                worker 1     worker 2     worker N
//!                                    ▼            ▼            ▼
//!                              LogWriter      metrics       custom
//! ```
//!
//! A slow or panicking subscriber affects only its own queue; overflows and
//! panics are themselves reported as events.

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
