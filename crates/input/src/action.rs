use craftsync_common::{EntityUid, WorldPos};
use craftsync_kernel::MoveDirection;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of intents that carry nothing but the acting player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub player_uid: EntityUid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateData {
    pub player_uid: EntityUid,
    pub player_rot: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveData {
    pub player_uid: EntityUid,
    pub player_rot: Vec3,
    pub directions: Vec<MoveDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPosData {
    pub player_uid: EntityUid,
    pub pos: Vec3,
    /// Ground contact reported by client physics. Landing restores jumps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeltIndexData {
    pub player_uid: EntityUid,
    pub index: usize,
}

/// A block-targeting intent. The target cell was picked client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTargetData {
    pub player_uid: EntityUid,
    pub target: WorldPos,
}

/// A request to mutate world or entity state, applied at the next tick.
///
/// Wire shape: `{ "kind": <tag>, "data": { "playerUid": .., .. } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum PlayerAction {
    Rotate(RotateData),
    Jump(PlayerRef),
    PlaceBlock(BlockTargetData),
    RemoveBlock(BlockTargetData),
    ToggleCreative(PlayerRef),
    Move(MoveData),
    #[serde(rename = "setPlayerPos")]
    SetPos(SetPosData),
    #[serde(rename = "playerBeltLeft")]
    BeltLeft(PlayerRef),
    #[serde(rename = "playerBeltRight")]
    BeltRight(PlayerRef),
    #[serde(rename = "playerSetBeltIndex")]
    SetBeltIndex(BeltIndexData),
    PlaceDebugBlock(PlayerRef),
}

/// Discriminant of [`PlayerAction`], for logging and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerActionKind {
    Rotate,
    Jump,
    PlaceBlock,
    RemoveBlock,
    ToggleCreative,
    Move,
    SetPos,
    BeltLeft,
    BeltRight,
    SetBeltIndex,
    PlaceDebugBlock,
}

impl PlayerActionKind {
    /// Wire tag of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Jump => "jump",
            Self::PlaceBlock => "placeBlock",
            Self::RemoveBlock => "removeBlock",
            Self::ToggleCreative => "toggleCreative",
            Self::Move => "move",
            Self::SetPos => "setPlayerPos",
            Self::BeltLeft => "playerBeltLeft",
            Self::BeltRight => "playerBeltRight",
            Self::SetBeltIndex => "playerSetBeltIndex",
            Self::PlaceDebugBlock => "placeDebugBlock",
        }
    }
}

impl fmt::Display for PlayerActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlayerAction {
    /// The player this intent is attributed to.
    pub fn player_uid(&self) -> &EntityUid {
        match self {
            Self::Rotate(d) => &d.player_uid,
            Self::Move(d) => &d.player_uid,
            Self::SetPos(d) => &d.player_uid,
            Self::SetBeltIndex(d) => &d.player_uid,
            Self::PlaceBlock(d) | Self::RemoveBlock(d) => &d.player_uid,
            Self::Jump(d)
            | Self::ToggleCreative(d)
            | Self::BeltLeft(d)
            | Self::BeltRight(d)
            | Self::PlaceDebugBlock(d) => &d.player_uid,
        }
    }

    pub fn kind(&self) -> PlayerActionKind {
        match self {
            Self::Rotate(_) => PlayerActionKind::Rotate,
            Self::Jump(_) => PlayerActionKind::Jump,
            Self::PlaceBlock(_) => PlayerActionKind::PlaceBlock,
            Self::RemoveBlock(_) => PlayerActionKind::RemoveBlock,
            Self::ToggleCreative(_) => PlayerActionKind::ToggleCreative,
            Self::Move(_) => PlayerActionKind::Move,
            Self::SetPos(_) => PlayerActionKind::SetPos,
            Self::BeltLeft(_) => PlayerActionKind::BeltLeft,
            Self::BeltRight(_) => PlayerActionKind::BeltRight,
            Self::SetBeltIndex(_) => PlayerActionKind::SetBeltIndex,
            Self::PlaceDebugBlock(_) => PlayerActionKind::PlaceDebugBlock,
        }
    }

    pub fn jump(player_uid: EntityUid) -> Self {
        Self::Jump(PlayerRef { player_uid })
    }

    pub fn place_block(player_uid: EntityUid, target: WorldPos) -> Self {
        Self::PlaceBlock(BlockTargetData { player_uid, target })
    }

    pub fn remove_block(player_uid: EntityUid, target: WorldPos) -> Self {
        Self::RemoveBlock(BlockTargetData { player_uid, target })
    }

    pub fn set_pos(player_uid: EntityUid, pos: Vec3) -> Self {
        Self::SetPos(SetPosData {
            player_uid,
            pos,
            on_ground: None,
        })
    }

    pub fn set_belt_index(player_uid: EntityUid, index: usize) -> Self {
        Self::SetBeltIndex(BeltIndexData { player_uid, index })
    }
}
