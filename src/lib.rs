//! # streamvisor
//!
//! **Streamvisor** is a broadcast-queue orchestration library for Rust.
//!
//! It owns an ordered, durable queue of video assets and feeds them one at a
//! time into an external encoder subprocess (FFmpeg), surviving crashes and
//! redeploys without losing the queue. The crate is designed as the core of
//! a self-hosted live-broadcast service; HTTP routing, uploads, and
//! credential UI are left to the embedding application.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!           ┌───────────────────────────────┐
//!           │ OrchestratorHandle (cloned by │
//!           │ the API layer: enqueue, skip, │
//!           │ status, settings, ...)        │
//!           └──────────────┬────────────────┘
//!                          ▼  bounded command mailbox
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Orchestrator (single control task)                           │
//! │  - Ledger (durable ordered queue, write-ahead persisted)      │
//! │  - SessionSupervisor (0..1 encoder subprocess, generations)   │
//! │  - retry timer (bounded per-asset budget with backoff)        │
//! └───────┬──────────────────────┬────────────────────────┬───────┘
//!         │ start/stop           │ exit events            │ events
//!         ▼                      │ (mpsc, exactly once    ▼
//!   ┌───────────────┐            │  per spawn)      ┌───────────┐
//!   │ monitor task  │────────────┘                  │    Bus    │
//!   │ (progress,    │                               └─────┬─────┘
//!   │  watchdogs,   │                                     ▼
//!   │  SIGTERM/kill)│                              SubscriberSet
//!   └──────┬────────┘                            (LogWriter, ...)
//!          ▼
//!     ffmpeg ──► RTMP endpoint
//! ```
//!
//! ### Session lifecycle
//! ```text
//! Idle ──(queued head)──► Starting ──(spawn + durable mark_active)──► Active
//!   ▲                        │ resolve/spawn failed:                    │
//!   │                        │ bounded retry with backoff               │
//!   │                        ▼                                          │
//!   │◄─────────────── requeued or failed                                │
//!   │                                                                   │
//!   │◄── Completed: entry removed, next head starts (no idle gap) ──────┤
//!   │◄── Failed(stalled | nonzero-exit | short-output): retry policy ───┤
//!   │◄── Stopped (skip_current / stop_all): manual-skip recorded ───────┘
//! ```
//!
//! ## Durability
//! Every queue mutation is persisted *before* it is acknowledged
//! (write-ahead, atomic temp-file-and-rename). On startup, entries found
//! `active` are reclassified — no subprocess survives a restart — and
//! unreadable state is a fatal [`BootError`], never a silent reset.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use streamvisor::{Config, DirStore, JsonStore, LogWriter, Orchestrator, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assets = Arc::new(DirStore::new("videos").with_probe("ffprobe"));
//!     let persistence = Arc::new(JsonStore::new("state"));
//!     let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let (orchestrator, handle) =
//!         Orchestrator::new(Config::default(), assets, persistence, subscribers).await?;
//!
//!     let control = tokio::spawn(orchestrator.run());
//!
//!     handle.enqueue("intro.mp4").await?;
//!     handle.enqueue("feature.mp4").await?;
//!     // ... the queue broadcasts one asset at a time until drained.
//!
//!     control.await??;
//!     Ok(())
//! }
//! ```

mod assets;
mod config;
mod error;
mod events;
mod ledger;
mod orchestrator;
mod persist;
mod policies;
mod session;
mod shutdown;
mod subscribers;

// ---- Public re-exports ----

pub use assets::{AssetMeta, AssetStore, DirStore, MemoryStore, ResolvedAsset};
pub use config::{Config, FailurePolicy, StreamSettings};
pub use error::{
    AssetError, BootError, ControlError, PersistError, QueueError, RuntimeError, SessionError,
};
pub use events::{Bus, Event, EventKind};
pub use ledger::{AssetEntry, EntryStatus, FailureDisposition, Ledger, RecoveryReport};
pub use orchestrator::{BroadcastStatus, Orchestrator, OrchestratorHandle, QueueEntryView};
pub use persist::{JsonStore, MemoryPersistence, Persistence, QueueSnapshot};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use session::{
    ExitEvent, ExitOutcome, FailureReason, SessionHandle, SessionSupervisor,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
