use craftsync_common::{BlockData, BlockType, CHUNK_VOLUME, ChunkPos, InnerChunkPos};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkDataError {
    #[error("chunk {pos} has {found} blocks, expected {expected}")]
    BlockCount {
        pos: ChunkPos,
        found: usize,
        expected: usize,
    },
}

/// A column of blocks keyed by its chunk position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    position: ChunkPos,
    blocks: Vec<BlockType>,
    block_data: Vec<BlockData>,
}

impl Chunk {
    /// An all-void chunk.
    pub fn new(position: ChunkPos) -> Self {
        Self {
            position,
            blocks: vec![BlockType::Void; CHUNK_VOLUME],
            block_data: vec![BlockData::None; CHUNK_VOLUME],
        }
    }

    pub fn position(&self) -> ChunkPos {
        self.position
    }

    pub fn id(&self) -> String {
        self.position.id()
    }

    pub fn block(&self, at: InnerChunkPos) -> BlockType {
        self.blocks[at.index()]
    }

    pub fn block_data(&self, at: InnerChunkPos) -> BlockData {
        self.block_data[at.index()]
    }

    pub fn set_block(&mut self, at: InnerChunkPos, block: BlockType, data: BlockData) {
        let i = at.index();
        self.blocks[i] = block;
        self.block_data[i] = data;
    }

    pub fn remove_block(&mut self, at: InnerChunkPos) {
        self.set_block(at, BlockType::Void, BlockData::None);
    }

    pub fn serialize(&self) -> SerializedChunk {
        SerializedChunk {
            position: SerializedChunkPos {
                x: self.position.x,
                y: self.position.y,
            },
            blocks: self.blocks.clone(),
            block_data: self.block_data.clone(),
        }
    }

    pub fn from_serialized(record: SerializedChunk) -> Result<Self, ChunkDataError> {
        let position = ChunkPos::new(record.position.x, record.position.y);
        for found in [record.blocks.len(), record.block_data.len()] {
            if found != CHUNK_VOLUME {
                return Err(ChunkDataError::BlockCount {
                    pos: position,
                    found,
                    expected: CHUNK_VOLUME,
                });
            }
        }
        Ok(Self {
            position,
            blocks: record.blocks,
            block_data: record.block_data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedChunkPos {
    pub x: i32,
    pub y: i32,
}

/// Wire and storage shape of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedChunk {
    pub position: SerializedChunkPos,
    pub blocks: Vec<BlockType>,
    pub block_data: Vec<BlockData>,
}

impl SerializedChunk {
    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos::new(self.position.x, self.position.y)
    }
}

/// Read access to resident chunks, used when a diff is serialized.
pub trait ChunkLookup {
    fn serialized(&self, pos: ChunkPos) -> Option<SerializedChunk>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftsync_common::Direction;

    #[test]
    fn new_chunk_is_void() {
        let c = Chunk::new(ChunkPos::new(1, 2));
        assert_eq!(c.block(InnerChunkPos::new(3, 4, 5)), BlockType::Void);
        assert_eq!(c.id(), "1,2");
    }

    #[test]
    fn set_and_remove_block() {
        let mut c = Chunk::new(ChunkPos::new(0, 0));
        let at = InnerChunkPos::new(1, 2, 3);
        c.set_block(at, BlockType::Image, BlockData::Image(Direction::North));
        assert_eq!(c.block(at), BlockType::Image);
        assert_eq!(c.block_data(at), BlockData::Image(Direction::North));
        c.remove_block(at);
        assert_eq!(c.block(at), BlockType::Void);
        assert_eq!(c.block_data(at), BlockData::None);
    }

    #[test]
    fn serialized_shape() {
        let mut c = Chunk::new(ChunkPos::new(-1, 4));
        c.set_block(InnerChunkPos::new(0, 0, 1), BlockType::Stone, BlockData::None);
        let json = serde_json::to_value(c.serialize()).unwrap();
        assert_eq!(json["position"]["x"], -1);
        assert_eq!(json["position"]["y"], 4);
        assert_eq!(json["blocks"][1], 1);
        assert_eq!(json["block_data"][0], "None");
        assert_eq!(json["blocks"].as_array().unwrap().len(), CHUNK_VOLUME);
    }

    #[test]
    fn from_serialized_checks_length() {
        let mut record = Chunk::new(ChunkPos::new(0, 0)).serialize();
        record.blocks.pop();
        assert!(matches!(
            Chunk::from_serialized(record),
            Err(ChunkDataError::BlockCount { .. })
        ));

        let good = Chunk::new(ChunkPos::new(2, 3));
        assert_eq!(Chunk::from_serialized(good.serialize()).unwrap(), good);
    }
}
