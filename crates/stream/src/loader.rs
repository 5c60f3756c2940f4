use std::collections::HashMap;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use craftsync_common::{BlockData, BlockType, CHUNK_HEIGHT, CHUNK_WIDTH, ChunkPos, InnerChunkPos};
use craftsync_kernel::{Chunk, SerializedChunk};

use crate::store::ChunkError;

pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Chunk, ChunkError>> + Send + 'a>>;

/// Produces chunks that are not resident yet.
pub trait ChunkLoader: Send + Sync {
    fn load(&self, pos: ChunkPos) -> LoadFuture<'_>;
}

/// Generates flat terrain: stone up to `height - 1`, one layer of grass on top.
#[derive(Debug, Clone)]
pub struct FlatTerrainLoader {
    height: i32,
}

impl FlatTerrainLoader {
    pub fn new(height: i32) -> Self {
        Self {
            height: height.clamp(0, CHUNK_HEIGHT),
        }
    }

    pub fn generate(&self, pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        for x in 0..CHUNK_WIDTH as u8 {
            for z in 0..CHUNK_WIDTH as u8 {
                for y in 0..self.height {
                    let block = if y == self.height - 1 {
                        BlockType::Grass
                    } else {
                        BlockType::Stone
                    };
                    chunk.set_block(InnerChunkPos::new(x, y as u8, z), block, BlockData::None);
                }
            }
        }
        chunk
    }
}

impl ChunkLoader for FlatTerrainLoader {
    fn load(&self, pos: ChunkPos) -> LoadFuture<'_> {
        Box::pin(future::ready(Ok(self.generate(pos))))
    }
}

/// Serves chunks stored with a world, falling back to another loader.
pub struct SavedChunkLoader {
    saved: HashMap<ChunkPos, SerializedChunk>,
    fallback: Arc<dyn ChunkLoader>,
}

impl SavedChunkLoader {
    pub fn new(saved: Vec<SerializedChunk>, fallback: Arc<dyn ChunkLoader>) -> Self {
        let saved = saved.into_iter().map(|c| (c.chunk_pos(), c)).collect();
        Self { saved, fallback }
    }

    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }
}

impl ChunkLoader for SavedChunkLoader {
    fn load(&self, pos: ChunkPos) -> LoadFuture<'_> {
        match self.saved.get(&pos) {
            Some(record) => {
                let chunk = Chunk::from_serialized(record.clone()).map_err(|e| ChunkError::Loader {
                    pos,
                    message: e.to_string(),
                });
                Box::pin(future::ready(chunk))
            }
            None => self.fallback.load(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flat_terrain_has_grass_on_top() {
        let loader = FlatTerrainLoader::new(4);
        let chunk = loader.load(ChunkPos::new(3, -2)).await.unwrap();
        assert_eq!(chunk.position(), ChunkPos::new(3, -2));
        assert_eq!(chunk.block(InnerChunkPos::new(0, 0, 0)), BlockType::Stone);
        assert_eq!(chunk.block(InnerChunkPos::new(5, 3, 9)), BlockType::Grass);
        assert_eq!(chunk.block(InnerChunkPos::new(5, 4, 9)), BlockType::Void);
    }

    #[tokio::test]
    async fn saved_chunks_take_precedence() {
        let pos = ChunkPos::new(0, 0);
        let mut stored = Chunk::new(pos);
        stored.set_block(InnerChunkPos::new(1, 10, 1), BlockType::Gold, BlockData::None);
        let loader = SavedChunkLoader::new(
            vec![stored.serialize()],
            Arc::new(FlatTerrainLoader::new(4)),
        );
        assert_eq!(loader.saved_count(), 1);

        assert_eq!(loader.load(pos).await.unwrap(), stored);
        let generated = loader.load(ChunkPos::new(1, 0)).await.unwrap();
        assert_eq!(generated.block(InnerChunkPos::new(0, 3, 0)), BlockType::Grass);
    }

    #[tokio::test]
    async fn corrupt_saved_chunk_is_a_loader_error() {
        let pos = ChunkPos::new(0, 0);
        let mut record = Chunk::new(pos).serialize();
        record.block_data.truncate(3);
        let loader = SavedChunkLoader::new(vec![record], Arc::new(FlatTerrainLoader::new(1)));
        assert!(matches!(
            loader.load(pos).await,
            Err(ChunkError::Loader { .. })
        ));
    }
}
