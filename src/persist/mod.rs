//! Durable persistence for the queue ledger and stream settings.
//!
//! The core logic is agnostic to the backing store: [`Persistence`] is the
//! collaborator boundary, [`JsonStore`] the default flat-JSON-on-disk
//! implementation, [`MemoryPersistence`] an in-process stand-in for tests
//! and demos.
//!
//! ## Rules
//! - Queue snapshot and settings record are independently loadable/saveable.
//! - Writes are atomic (temp-file-and-rename); a crash mid-write never
//!   yields a partial snapshot.
//! - A missing file loads as `Ok(None)` (empty state); an unparseable file
//!   is an error — callers must be able to distinguish "empty queue" from
//!   "could not read queue".

mod json;
mod memory;
mod snapshot;

use async_trait::async_trait;

pub use json::JsonStore;
pub use memory::MemoryPersistence;
pub use snapshot::QueueSnapshot;

use crate::config::StreamSettings;
use crate::error::PersistError;

/// Durable store for the queue snapshot and the settings record.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Durably saves the queue snapshot, replacing any previous one.
    async fn save_queue(&self, snapshot: &QueueSnapshot) -> Result<(), PersistError>;

    /// Loads the last saved queue snapshot; `None` if none was ever saved.
    async fn load_queue(&self) -> Result<Option<QueueSnapshot>, PersistError>;

    /// Durably saves the settings record, replacing any previous one.
    async fn save_settings(&self, settings: &StreamSettings) -> Result<(), PersistError>;

    /// Loads the last saved settings record; `None` if none was ever saved.
    async fn load_settings(&self) -> Result<Option<StreamSettings>, PersistError>;
}
