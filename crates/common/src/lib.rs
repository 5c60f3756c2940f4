//! Shared vocabulary for the craftsync workspace: identifiers, integer grid
//! positions and block types.

mod block;
mod position;
mod types;

pub use block::{BlockData, BlockType, Direction, UnknownBlockType};
pub use position::{
    CHUNK_HEIGHT, CHUNK_VOLUME, CHUNK_WIDTH, ChunkPos, InnerChunkPos, PositionError, WorldPos,
    chunk_id,
};
pub use types::{EntityUid, WorldId};
