//! Persistence: serialized world records behind a pluggable store.
//!
//! # Invariants
//! - Stored snapshots are content-addressed and verified on load.
//! - A schema or hash mismatch fails closed; nothing partially loads.
//! - World ids are validated before they touch the filesystem.

mod memory;
mod record;
mod store;

pub use memory::InMemoryStore;
pub use record::{
    CreateWorldOptions, MAX_LOAD_DISTANCE, MAX_TICK_RATE_HZ, WorldConfig, WorldMetadata, WorldRecord,
};
pub use store::{FileWorldStore, PersistenceStore, StoreError};
