//! Integer grid positions: chunk coordinates, world block coordinates and
//! block coordinates inside a chunk.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width and depth of a chunk, in blocks.
pub const CHUNK_WIDTH: i32 = 16;
/// Height of a chunk, in blocks.
pub const CHUNK_HEIGHT: i32 = 64;
/// Number of blocks stored by one chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_WIDTH * CHUNK_WIDTH * CHUNK_HEIGHT) as usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("malformed chunk id {0:?}")]
    MalformedChunkId(String),
}

/// A chunk coordinate. `y` is the world's Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
}

impl ChunkPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Deterministic `"x,y"` encoding, used as the map key on the wire.
    pub fn id(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// World position of the chunk's minimum corner at `y = 0`.
    pub fn origin(&self) -> WorldPos {
        WorldPos::new(self.x * CHUNK_WIDTH, 0, self.y * CHUNK_WIDTH)
    }

    /// All chunk positions in the square `[-radius, radius)` around `self`.
    pub fn square_around(&self, radius: i32) -> Vec<ChunkPos> {
        let mut out = Vec::new();
        for dx in -radius..radius {
            for dy in -radius..radius {
                out.push(ChunkPos::new(self.x + dx, self.y + dy));
            }
        }
        out
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for ChunkPos {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PositionError::MalformedChunkId(s.to_owned());
        let (x, y) = s.split_once(',').ok_or_else(malformed)?;
        let x = x.trim().parse().map_err(|_| malformed())?;
        let y = y.trim().parse().map_err(|_| malformed())?;
        Ok(Self { x, y })
    }
}

/// Serde adapter that writes a [`ChunkPos`] as its `"x,y"` id string.
pub mod chunk_id {
    use super::ChunkPos;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pos: &ChunkPos, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&pos.id())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ChunkPos, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Integer block coordinate in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a fine-grained position.
    pub fn containing(pos: Vec3) -> Self {
        let p = pos.floor();
        Self::new(p.x as i32, p.y as i32, p.z as i32)
    }

    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// Whether the position lies inside the vertical extent of a chunk.
    pub fn is_valid(&self) -> bool {
        (0..CHUNK_HEIGHT).contains(&self.y)
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos::new(
            self.x.div_euclid(CHUNK_WIDTH),
            self.z.div_euclid(CHUNK_WIDTH),
        )
    }

    /// Position inside the owning chunk. Only meaningful when [`is_valid`](Self::is_valid).
    pub fn inner(&self) -> InnerChunkPos {
        InnerChunkPos {
            x: self.x.rem_euclid(CHUNK_WIDTH) as u8,
            y: self.y.clamp(0, CHUNK_HEIGHT - 1) as u8,
            z: self.z.rem_euclid(CHUNK_WIDTH) as u8,
        }
    }
}

/// Block coordinate relative to a chunk's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InnerChunkPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl InnerChunkPos {
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Dense storage index: `x` in the high bits, then `y`, then `z`.
    pub fn index(&self) -> usize {
        ((self.x as usize) << 10) | ((self.y as usize) << 4) | self.z as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self {
            x: (index >> 10) as u8,
            y: ((index >> 4) & 0b11_1111) as u8,
            z: (index & 0b1111) as u8,
        }
    }

    pub fn to_world(&self, chunk: ChunkPos) -> WorldPos {
        let origin = chunk.origin();
        WorldPos::new(
            origin.x + self.x as i32,
            self.y as i32,
            origin.z + self.z as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_roundtrips() {
        let pos = ChunkPos::new(-3, 12);
        assert_eq!(pos.id(), "-3,12");
        assert_eq!("-3,12".parse::<ChunkPos>().unwrap(), pos);
    }

    #[test]
    fn malformed_chunk_id_is_rejected() {
        assert!("3".parse::<ChunkPos>().is_err());
        assert!("a,b".parse::<ChunkPos>().is_err());
    }

    #[test]
    fn negative_world_positions_floor_into_chunks() {
        assert_eq!(WorldPos::new(-1, 0, -16).chunk_pos(), ChunkPos::new(-1, -1));
        assert_eq!(WorldPos::new(-17, 0, 15).chunk_pos(), ChunkPos::new(-2, 0));
        assert_eq!(WorldPos::new(16, 0, 0).chunk_pos(), ChunkPos::new(1, 0));
    }

    #[test]
    fn inner_position_wraps_negative_coordinates() {
        let inner = WorldPos::new(-1, 5, -16).inner();
        assert_eq!(inner, InnerChunkPos::new(15, 5, 0));
        assert_eq!(
            inner.to_world(ChunkPos::new(-1, -1)),
            WorldPos::new(-1, 5, -16)
        );
    }

    #[test]
    fn index_covers_the_whole_volume() {
        let last = InnerChunkPos::new(15, 63, 15);
        assert_eq!(last.index(), CHUNK_VOLUME - 1);
        assert_eq!(InnerChunkPos::from_index(last.index()), last);
        assert_eq!(InnerChunkPos::from_index(0), InnerChunkPos::new(0, 0, 0));
    }

    #[test]
    fn world_height_bounds() {
        assert!(WorldPos::new(0, 0, 0).is_valid());
        assert!(!WorldPos::new(0, CHUNK_HEIGHT, 0).is_valid());
        assert!(!WorldPos::new(0, -1, 0).is_valid());
    }

    #[test]
    fn square_around_matches_load_distance() {
        let around = ChunkPos::new(0, 0).square_around(2);
        assert_eq!(around.len(), 16);
        assert!(around.contains(&ChunkPos::new(-2, -2)));
        assert!(!around.contains(&ChunkPos::new(2, 2)));
    }
}
