//! Streaming: resident chunk storage and pluggable chunk loaders.
//!
//! # Invariants
//! - At most one in-memory chunk exists per position.
//! - Concurrent misses on the same position share a single loader call.
//! - Loaders must be safe to call concurrently for distinct positions.

mod loader;
mod store;

pub use loader::{ChunkLoader, FlatTerrainLoader, LoadFuture, SavedChunkLoader};
pub use store::{ChunkError, ChunkStore};
