use serde::{Deserialize, Serialize};

/// Block type code stored densely in every chunk. Serialized as its `u8` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum BlockType {
    #[default]
    Void = 0,
    Stone = 1,
    Wood = 2,
    Leaf = 3,
    Cloud = 4,
    Gold = 5,
    RedFlower = 6,
    Water = 7,
    Grass = 8,
    Image = 9,
    Planks = 10,
    Red = 11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown block type code {0}")]
pub struct UnknownBlockType(pub u8);

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for BlockType {
    type Error = UnknownBlockType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Void,
            1 => Self::Stone,
            2 => Self::Wood,
            3 => Self::Leaf,
            4 => Self::Cloud,
            5 => Self::Gold,
            6 => Self::RedFlower,
            7 => Self::Water,
            8 => Self::Grass,
            9 => Self::Image,
            10 => Self::Planks,
            11 => Self::Red,
            other => return Err(UnknownBlockType(other)),
        })
    }
}

/// Facing of a block or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    Up,
    Down,
    East,
    West,
}

/// Extra per-block data for blocks that carry more than a type tag.
///
/// Serializes as `"None"` or `{"Image": "<direction>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockData {
    #[default]
    None,
    Image(Direction),
}
