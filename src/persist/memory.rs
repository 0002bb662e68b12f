//! In-memory persistence for tests and demos.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::StreamSettings;
use crate::error::PersistError;
use crate::persist::{Persistence, QueueSnapshot};

/// Volatile [`Persistence`] backed by process memory.
///
/// Useful in tests and in deployments that explicitly opt out of queue
/// durability. Provides the same atomic replace semantics as a real store.
#[derive(Default)]
pub struct MemoryPersistence {
    queue: Mutex<Option<QueueSnapshot>>,
    settings: Mutex<Option<StreamSettings>>,
}

impl MemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a queue snapshot, as if a previous
    /// process had saved it.
    #[must_use]
    pub fn with_queue(snapshot: QueueSnapshot) -> Self {
        Self {
            queue: Mutex::new(Some(snapshot)),
            settings: Mutex::new(None),
        }
    }

    fn lock_poisoned() -> PersistError {
        PersistError::Io {
            path: "<memory>".into(),
            source: std::io::Error::other("memory store lock poisoned"),
        }
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save_queue(&self, snapshot: &QueueSnapshot) -> Result<(), PersistError> {
        let mut slot = self.queue.lock().map_err(|_| Self::lock_poisoned())?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    async fn load_queue(&self) -> Result<Option<QueueSnapshot>, PersistError> {
        let slot = self.queue.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(slot.clone())
    }

    async fn save_settings(&self, settings: &StreamSettings) -> Result<(), PersistError> {
        let mut slot = self.settings.lock().map_err(|_| Self::lock_poisoned())?;
        *slot = Some(settings.clone());
        Ok(())
    }

    async fn load_settings(&self) -> Result<Option<StreamSettings>, PersistError> {
        let slot = self.settings.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(slot.clone())
    }
}
