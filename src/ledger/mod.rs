//! The queue ledger: the durable, ordered record of assets awaiting or in
//! broadcast.
//!
//! The ledger is the single source of truth for "what should play next".
//! Every mutation is write-ahead persisted through
//! [`Persistence`](crate::persist::Persistence) before it is acknowledged.

mod entry;
#[allow(clippy::module_inception)]
mod ledger;

pub use entry::{AssetEntry, EntryStatus};
pub use ledger::{FailureDisposition, Ledger, RecoveryReport};
