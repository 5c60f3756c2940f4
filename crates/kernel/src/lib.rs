//! World Kernel: authoritative entities, chunks and per-tick state diffs.
//!
//! # Invariants
//! - Entity uids are unique and non-empty; a failed add leaves the registry unchanged.
//! - Entity state changes only through typed setters, which mark the entity dirty.
//! - Diffs hold identities and resolve them lazily at serialization time.

pub mod chunk;
pub mod diff;
pub mod entity;
pub mod registry;

pub use chunk::{Chunk, ChunkDataError, ChunkLookup, SerializedChunk, SerializedChunkPos};
pub use diff::{ChunksDiff, EntitiesDiff, GameDiff, StateDiff};
pub use entity::{
    Belt, BeltItem, Entity, EntityKind, EntityPatch, EntityRecord, EntityType, FIREBALL_SPEED,
    FIREBALL_TICKS, Health, JUMP_SPEED, MAX_JUMPS, MoveDirection, PlayerRecord, PlayerState,
    ProjectileRecord, ProjectileState,
};
pub use registry::{EntityRegistry, RegistryError};
