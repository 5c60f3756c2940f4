use craftsync_common::{CHUNK_HEIGHT, CHUNK_WIDTH, WorldId};
use craftsync_kernel::{EntityRecord, SerializedChunk};
use serde::{Deserialize, Serialize};

/// Highest tick rate a world may run at.
pub const MAX_TICK_RATE_HZ: u32 = 1000;
/// Largest preload radius, in chunks.
pub const MAX_LOAD_DISTANCE: i32 = 8;

/// Per-world settings, stored alongside the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldConfig {
    pub seed: u64,
    /// Chunk edge length. Fixed by the chunk format.
    pub chunk_size: i32,
    /// Radius, in chunks, preloaded around the origin when the world starts.
    pub load_distance: i32,
    /// Terrain height produced by the flat generator.
    pub flat_world_height: i32,
    pub tick_rate_hz: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            chunk_size: CHUNK_WIDTH,
            load_distance: 3,
            flat_world_height: 4,
            tick_rate_hz: 40,
        }
    }
}

impl WorldConfig {
    /// Clamp every field into the range the server can run.
    ///
    /// Settings arrive from clients and from disk, so nothing is trusted as-is.
    pub fn sanitized(self) -> Self {
        Self {
            seed: self.seed,
            chunk_size: CHUNK_WIDTH,
            load_distance: self.load_distance.clamp(0, MAX_LOAD_DISTANCE),
            flat_world_height: self.flat_world_height.clamp(0, CHUNK_HEIGHT),
            tick_rate_hz: self.tick_rate_hz.clamp(1, MAX_TICK_RATE_HZ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldMetadata {
    pub world_id: WorldId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateWorldOptions {
    pub name: String,
    pub config: WorldConfig,
}

/// A world as stored: settings, entities and every chunk that was resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    pub world_id: WorldId,
    pub name: String,
    pub config: WorldConfig,
    pub entities: Vec<EntityRecord>,
    pub chunks: Vec<SerializedChunk>,
}

impl WorldRecord {
    /// A fresh world with no entities and no stored chunks.
    pub fn new(options: CreateWorldOptions) -> Self {
        Self {
            world_id: WorldId::generate(),
            name: options.name,
            config: options.config,
            entities: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn metadata(&self) -> WorldMetadata {
        WorldMetadata {
            world_id: self.world_id.clone(),
            name: self.name.clone(),
        }
    }
}
