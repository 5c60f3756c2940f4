use std::sync::Arc;

use craftsync_common::{ChunkPos, WorldId};
use craftsync_kernel::{EntityRegistry, RegistryError, StateDiff};
use craftsync_persist::{WorldConfig, WorldRecord};
use craftsync_stream::{ChunkLoader, ChunkStore, FlatTerrainLoader, SavedChunkLoader};

/// Authoritative state of one world.
///
/// `diff` is the world-level accumulator: mutations made outside action
/// processing land here and are flushed at the start of the next tick.
pub struct WorldState {
    pub id: WorldId,
    pub name: String,
    pub config: WorldConfig,
    pub entities: EntityRegistry,
    pub chunks: Arc<ChunkStore>,
    pub diff: StateDiff,
    stored_chunks: Vec<ChunkPos>,
}

impl WorldState {
    pub fn new(
        id: WorldId,
        name: impl Into<String>,
        config: WorldConfig,
        loader: Arc<dyn ChunkLoader>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            entities: EntityRegistry::new(),
            chunks: Arc::new(ChunkStore::new(loader)),
            diff: StateDiff::new(),
            stored_chunks: Vec::new(),
        }
    }

    /// Rebuild a world from storage.
    ///
    /// Stored players are dropped since no connection is live yet. Stored
    /// chunks are served first; anything else comes from flat terrain.
    pub fn from_record(record: WorldRecord) -> Result<Self, RegistryError> {
        let mut entities = EntityRegistry::from_records(record.entities)?;
        let dropped = entities.remove_all_players();
        if !dropped.is_empty() {
            tracing::debug!(world = %record.world_id, players = dropped.len(), "dropped stored players");
        }
        let stored_chunks = record.chunks.iter().map(|c| c.chunk_pos()).collect();
        let terrain = Arc::new(FlatTerrainLoader::new(record.config.flat_world_height));
        let loader = Arc::new(SavedChunkLoader::new(record.chunks, terrain));
        tracing::debug!(world = %record.world_id, chunks = loader.saved_count(), "stored chunks attached");
        Ok(Self {
            id: record.world_id,
            name: record.name,
            config: record.config,
            entities,
            chunks: Arc::new(ChunkStore::new(loader)),
            diff: StateDiff::new(),
            stored_chunks,
        })
    }

    pub fn to_record(&self) -> WorldRecord {
        WorldRecord {
            world_id: self.id.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
            entities: self.entities.to_records(),
            chunks: self.chunks.serialize_all(),
        }
    }

    /// Record every entity changed through its setters since the last call
    /// as updated in the world accumulator. Returns how many were recorded.
    pub fn record_dirty_entities(&mut self) -> usize {
        let dirty = self.entities.take_dirty();
        let count = dirty.len();
        for uid in dirty {
            self.diff.update_entity(uid);
        }
        count
    }

    /// Load every chunk within `load_distance` of the origin plus every
    /// stored chunk, concurrently. Failures are logged and left unloaded.
    pub async fn preload(&self) {
        let mut positions = ChunkPos::new(0, 0).square_around(self.config.load_distance);
        for pos in &self.stored_chunks {
            if !positions.contains(pos) {
                positions.push(*pos);
            }
        }
        let requested = positions.len();
        let failed = self.chunks.preload(positions).await;
        for (pos, error) in &failed {
            tracing::warn!(world = %self.id, %pos, %error, "preload failed");
        }
        tracing::info!(
            world = %self.id,
            chunks = requested - failed.len(),
            "chunks preloaded"
        );
    }
}
