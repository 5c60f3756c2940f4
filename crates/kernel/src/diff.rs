//! Per-tick mutation log and its wire record.
//!
//! A [`StateDiff`] stores identities only. Entity and chunk contents are
//! resolved when the diff is serialized, so an entity removed later in the
//! same window simply drops out of `add`/`update`.

use crate::chunk::{ChunkLookup, SerializedChunk};
use crate::entity::EntityRecord;
use crate::registry::EntityRegistry;
use craftsync_common::{ChunkPos, EntityUid};
use serde::{Deserialize, Serialize};

/// Append-only id lists for one tick window. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    add_entities: Vec<EntityUid>,
    update_entities: Vec<EntityUid>,
    remove_entities: Vec<EntityUid>,
    update_chunks: Vec<ChunkPos>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, uid: EntityUid) {
        self.add_entities.push(uid);
    }

    pub fn update_entity(&mut self, uid: EntityUid) {
        self.update_entities.push(uid);
    }

    pub fn remove_entity(&mut self, uid: EntityUid) {
        self.remove_entities.push(uid);
    }

    pub fn update_chunk(&mut self, pos: ChunkPos) {
        self.update_chunks.push(pos);
    }

    pub fn added(&self) -> &[EntityUid] {
        &self.add_entities
    }

    pub fn updated(&self) -> &[EntityUid] {
        &self.update_entities
    }

    pub fn removed(&self) -> &[EntityUid] {
        &self.remove_entities
    }

    pub fn updated_chunks(&self) -> &[ChunkPos] {
        &self.update_chunks
    }

    pub fn has_data(&self) -> bool {
        !(self.add_entities.is_empty()
            && self.update_entities.is_empty()
            && self.remove_entities.is_empty()
            && self.update_chunks.is_empty())
    }

    pub fn clear(&mut self) {
        self.add_entities.clear();
        self.update_entities.clear();
        self.remove_entities.clear();
        self.update_chunks.clear();
    }

    /// Independent copy of the four lists.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Concatenate `other` onto `self`, preserving order.
    pub fn append(&mut self, other: &StateDiff) {
        self.add_entities.extend_from_slice(&other.add_entities);
        self.update_entities.extend_from_slice(&other.update_entities);
        self.remove_entities.extend_from_slice(&other.remove_entities);
        self.update_chunks.extend_from_slice(&other.update_chunks);
    }

    /// Fold a received wire record back into id lists.
    pub fn append_record(&mut self, record: &GameDiff) {
        let e = &record.entities;
        self.add_entities
            .extend(e.add.iter().flatten().map(|r| r.uid().clone()));
        self.update_entities
            .extend(e.update.iter().flatten().map(|r| r.uid().clone()));
        self.remove_entities
            .extend(e.remove.iter().flatten().cloned());
        self.update_chunks
            .extend(record.chunks.update.iter().flatten().map(|c| c.chunk_pos()));
    }

    /// Resolve ids into full records. Ids that no longer resolve are skipped.
    pub fn serialize(&self, registry: &EntityRegistry, chunks: &dyn ChunkLookup) -> GameDiff {
        let resolve = |uids: &[EntityUid]| -> Vec<EntityRecord> {
            uids.iter()
                .filter_map(|uid| registry.try_get(uid))
                .map(|e| e.to_record())
                .collect()
        };
        let chunk_records: Vec<SerializedChunk> = self
            .update_chunks
            .iter()
            .filter_map(|pos| chunks.serialized(*pos))
            .collect();

        GameDiff {
            entities: EntitiesDiff {
                add: non_empty(resolve(&self.add_entities)),
                update: non_empty(resolve(&self.update_entities)),
                remove: non_empty(self.remove_entities.clone()),
            },
            chunks: ChunksDiff {
                update: non_empty(chunk_records),
            },
        }
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitiesDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<Vec<EntityRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Vec<EntityRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<Vec<EntityUid>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunksDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Vec<SerializedChunk>>,
}

/// Serialized diff as sent in a `gameDiff` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameDiff {
    pub entities: EntitiesDiff,
    pub chunks: ChunksDiff,
}

impl GameDiff {
    pub fn is_empty(&self) -> bool {
        self.entities.add.is_none()
            && self.entities.update.is_none()
            && self.entities.remove.is_none()
            && self.chunks.update.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::entity::Entity;
    use std::collections::HashMap;

    struct Chunks(HashMap<ChunkPos, Chunk>);

    impl ChunkLookup for Chunks {
        fn serialized(&self, pos: ChunkPos) -> Option<SerializedChunk> {
            self.0.get(&pos).map(Chunk::serialize)
        }
    }

    fn uid(s: &str) -> EntityUid {
        EntityUid::from(s)
    }

    #[test]
    fn has_data_and_clear() {
        let mut d = StateDiff::new();
        assert!(!d.has_data());
        d.update_chunk(ChunkPos::new(0, 0));
        assert!(d.has_data());
        d.clear();
        assert!(!d.has_data());
    }

    #[test]
    fn duplicates_are_preserved() {
        let mut d = StateDiff::new();
        d.update_entity(uid("a"));
        d.update_entity(uid("a"));
        assert_eq!(d.updated().len(), 2);
    }

    #[test]
    fn copy_is_independent() {
        let mut d = StateDiff::new();
        d.add_entity(uid("a"));
        let mut c = d.copy();
        c.remove_entity(uid("b"));
        d.clear();
        assert_eq!(c.added(), &[uid("a")]);
        assert_eq!(c.removed(), &[uid("b")]);
    }

    #[test]
    fn append_preserves_order() {
        let mut a = StateDiff::new();
        a.update_entity(uid("1"));
        let mut b = StateDiff::new();
        b.update_entity(uid("2"));
        b.update_chunk(ChunkPos::new(1, 1));
        a.append(&b);
        assert_eq!(a.updated(), &[uid("1"), uid("2")]);
        assert_eq!(a.updated_chunks(), &[ChunkPos::new(1, 1)]);
    }

    #[test]
    fn serialize_skips_unresolved_ids() {
        let mut reg = EntityRegistry::new();
        let mut d = StateDiff::new();
        reg.add(&mut d, Entity::player(uid("p"))).unwrap();
        d.add_entity(uid("gone"));
        d.update_chunk(ChunkPos::new(9, 9));
        let chunks = Chunks(HashMap::new());

        let out = d.serialize(&reg, &chunks);
        let added = out.entities.add.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].uid(), &uid("p"));
        assert!(out.entities.update.is_none());
        assert!(out.chunks.update.is_none());
    }

    #[test]
    fn empty_sections_are_omitted_on_the_wire() {
        let reg = EntityRegistry::new();
        let mut d = StateDiff::new();
        d.remove_entity(uid("x"));
        let json = serde_json::to_value(d.serialize(&reg, &Chunks(HashMap::new()))).unwrap();
        assert_eq!(json, serde_json::json!({"entities": {"remove": ["x"]}, "chunks": {}}));
    }

    #[test]
    fn record_round_trip_restores_ids() {
        let mut reg = EntityRegistry::new();
        let mut d = StateDiff::new();
        reg.add(&mut d, Entity::player(uid("p"))).unwrap();
        reg.add(&mut d, Entity::player(uid("q"))).unwrap();
        d.update_entity(uid("q"));
        d.remove_entity(uid("r"));
        let pos = ChunkPos::new(0, -1);
        d.update_chunk(pos);
        let chunks = Chunks(HashMap::from([(pos, Chunk::new(pos))]));

        let record = d.serialize(&reg, &chunks);
        let mut back = StateDiff::new();
        back.append_record(&record);
        assert_eq!(back, d);
    }
}
