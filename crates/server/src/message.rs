//! Wire protocol: every frame is `{ "type": <tag>, "data": <payload> }`.

use craftsync_common::{ChunkPos, EntityUid, WorldId, chunk_id};
use craftsync_input::PlayerAction;
use craftsync_kernel::{EntityRecord, GameDiff, SerializedChunk};
use craftsync_persist::WorldConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWorld {
    pub my_uid: EntityUid,
    pub world_id: WorldId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorld {
    pub my_uid: EntityUid,
    pub name: String,
    /// Server defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<WorldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRef {
    pub world_id: WorldId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChunk {
    #[serde(with = "chunk_id")]
    pub pos: ChunkPos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChunk {
    #[serde(with = "chunk_id")]
    pub pos: ChunkPos,
    pub data: SerializedChunk,
}

/// World state handed to a connection when it joins. Chunks are streamed
/// separately through `getChunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeGame {
    pub world_id: WorldId,
    pub name: String,
    pub config: WorldConfig,
    pub entities: Vec<EntityRecord>,
    pub active_players: Vec<EntityUid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub uid: EntityUid,
    pub game: WelcomeGame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerNotice {
    pub uid: EntityUid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Message {
    // client -> server
    JoinWorld(JoinWorld),
    NewWorld(NewWorld),
    SaveWorld(WorldRef),
    GetChunk(GetChunk),
    // server -> client
    Welcome(Welcome),
    WorldNotFound(WorldRef),
    GameDiff(GameDiff),
    SetChunk(SetChunk),
    NewPlayer(PlayerNotice),
    PlayerLeave(PlayerNotice),
    // both
    Actions(PlayerAction),
    PlayerActions(PlayerAction),
}

impl Message {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::JoinWorld(_) => "joinWorld",
            Message::NewWorld(_) => "newWorld",
            Message::SaveWorld(_) => "saveWorld",
            Message::GetChunk(_) => "getChunk",
            Message::Welcome(_) => "welcome",
            Message::WorldNotFound(_) => "worldNotFound",
            Message::GameDiff(_) => "gameDiff",
            Message::SetChunk(_) => "setChunk",
            Message::NewPlayer(_) => "newPlayer",
            Message::PlayerLeave(_) => "playerLeave",
            Message::Actions(_) => "actions",
            Message::PlayerActions(_) => "playerActions",
        }
    }
}
