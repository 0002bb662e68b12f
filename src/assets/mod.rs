//! Asset store: maps an identifier to a playable media file and its
//! metadata. Read-mostly; the orchestrator only ever resolves ids it is
//! about to enqueue or broadcast.

mod store;

pub use store::{AssetMeta, AssetStore, DirStore, MemoryStore, ResolvedAsset};
