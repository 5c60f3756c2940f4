use crate::diff::StateDiff;
use crate::entity::{Entity, EntityPatch, EntityRecord};
use craftsync_common::EntityUid;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("entity {0} already exists")]
    DuplicateUid(EntityUid),
    #[error("entity uid must not be empty")]
    EmptyUid,
    #[error("entity {0} not found")]
    NotFound(EntityUid),
    #[error("entity {0} is not a player")]
    NotAPlayer(EntityUid),
}

struct Slot {
    seq: u64,
    entity: Entity,
}

/// Owns every live entity of a world.
///
/// Iteration follows insertion order. Players are additionally tracked in an
/// index keyed by the same uid.
#[derive(Default)]
pub struct EntityRegistry {
    slots: HashMap<EntityUid, Slot>,
    order: BTreeMap<u64, EntityUid>,
    players: BTreeSet<EntityUid>,
    next_seq: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an entity of the record's kind. Does not insert it.
    pub fn create(&self, record: EntityRecord) -> Entity {
        Entity::from_record(record)
    }

    /// Insert `entity` and record it as added. Leaves the registry untouched on error.
    pub fn add(&mut self, diff: &mut StateDiff, entity: Entity) -> Result<(), RegistryError> {
        let uid = entity.uid().clone();
        if uid.is_empty() {
            return Err(RegistryError::EmptyUid);
        }
        if self.slots.contains_key(&uid) {
            return Err(RegistryError::DuplicateUid(uid));
        }
        self.insert(entity);
        diff.add_entity(uid);
        Ok(())
    }

    fn insert(&mut self, entity: Entity) {
        let uid = entity.uid().clone();
        let seq = self.next_seq;
        self.next_seq += 1;
        if entity.is_player() {
            self.players.insert(uid.clone());
        }
        self.order.insert(seq, uid.clone());
        self.slots.insert(uid, Slot { seq, entity });
    }

    /// Entity for `uid`, or [`RegistryError::NotFound`].
    pub fn get(&self, uid: &EntityUid) -> Result<&Entity, RegistryError> {
        self.try_get(uid)
            .ok_or_else(|| RegistryError::NotFound(uid.clone()))
    }

    /// Entity for `uid`, if live.
    pub fn try_get(&self, uid: &EntityUid) -> Option<&Entity> {
        self.slots.get(uid).map(|s| &s.entity)
    }

    /// Mutable access for typed setters. Callers record the change themselves
    /// or leave it to [`EntityRegistry::take_dirty`].
    pub fn get_mut(&mut self, uid: &EntityUid) -> Option<&mut Entity> {
        self.slots.get_mut(uid).map(|s| &mut s.entity)
    }

    /// Whether `uid` names a live entity.
    pub fn contains(&self, uid: &EntityUid) -> bool {
        self.slots.contains_key(uid)
    }

    /// Apply a partial record. Returns `false` if the entity is gone.
    pub fn update(&mut self, patch: &EntityPatch) -> bool {
        match self.get_mut(&patch.uid) {
            Some(entity) => {
                entity.set(patch);
                true
            }
            None => false,
        }
    }

    /// Remove an entity from the table and the player index.
    pub fn remove(&mut self, uid: &EntityUid) -> Option<Entity> {
        let slot = self.slots.remove(uid)?;
        self.order.remove(&slot.seq);
        self.players.remove(uid);
        Some(slot.entity)
    }

    /// Drop every player entity. Returns the removed uids.
    pub fn remove_all_players(&mut self) -> Vec<EntityUid> {
        let players: Vec<EntityUid> = std::mem::take(&mut self.players).into_iter().collect();
        for uid in &players {
            if let Some(slot) = self.slots.remove(uid) {
                self.order.remove(&slot.seq);
            }
        }
        players
    }

    /// Live entities in insertion order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.order
            .values()
            .filter_map(|uid| self.slots.get(uid).map(|s| &s.entity))
    }

    /// Uids in insertion order, for passes that mutate while walking.
    pub fn uids(&self) -> Vec<EntityUid> {
        self.order.values().cloned().collect()
    }

    /// Uids of player entities, sorted.
    pub fn active_players(&self) -> impl Iterator<Item = &EntityUid> + '_ {
        self.players.iter()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Number of live entities of every kind.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Clear every entity's dirty flag. Returns the uids that were dirty, in
    /// insertion order.
    pub fn take_dirty(&mut self) -> Vec<EntityUid> {
        let mut dirty = Vec::new();
        for uid in self.order.values() {
            if let Some(slot) = self.slots.get_mut(uid) {
                if slot.entity.take_dirty() {
                    dirty.push(uid.clone());
                }
            }
        }
        dirty
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Return the existing player for `uid`, or add a fresh one.
    ///
    /// The boolean is `true` when the player was created by this call.
    pub fn create_or_get_player(
        &mut self,
        diff: &mut StateDiff,
        uid: &EntityUid,
    ) -> Result<(&Entity, bool), RegistryError> {
        let created = match self.try_get(uid).map(Entity::is_player) {
            Some(false) => return Err(RegistryError::NotAPlayer(uid.clone())),
            Some(true) => false,
            None => {
                self.add(diff, Entity::player(uid.clone()))?;
                true
            }
        };
        Ok((self.get(uid)?, created))
    }

    /// Wire records of every live entity, in insertion order.
    pub fn to_records(&self) -> Vec<EntityRecord> {
        self.iter().map(Entity::to_record).collect()
    }

    /// Rebuild a registry from stored records. Later duplicates are rejected.
    pub fn from_records(records: Vec<EntityRecord>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let mut scratch = StateDiff::new();
        for record in records {
            let entity = registry.create(record);
            registry.add(&mut scratch, entity)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn ball(uid: &str) -> Entity {
        Entity::projectile(EntityUid::from(uid), Vec3::ZERO, Vec3::X, 10)
    }

    #[test]
    fn add_records_entity_in_diff() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        reg.add(&mut diff, ball("a")).unwrap();
        assert_eq!(diff.added(), &[EntityUid::from("a")]);
        assert!(reg.get(&EntityUid::from("a")).is_ok());
    }

    #[test]
    fn duplicate_add_fails_without_mutation() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        let original = Entity::player(EntityUid::from("p"));
        reg.add(&mut diff, original.clone()).unwrap();
        diff.clear();

        let err = reg.add(&mut diff, ball("p")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateUid(EntityUid::from("p")));
        assert!(!diff.has_data());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&EntityUid::from("p")).unwrap(), &original);
    }

    #[test]
    fn empty_uid_is_rejected() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        assert_eq!(
            reg.add(&mut diff, ball("")),
            Err(RegistryError::EmptyUid)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn get_and_try_get_on_missing() {
        let reg = EntityRegistry::new();
        let uid = EntityUid::from("ghost");
        assert!(reg.try_get(&uid).is_none());
        assert_eq!(reg.get(&uid), Err(RegistryError::NotFound(uid)));
    }

    #[test]
    fn update_missing_is_a_noop() {
        let mut reg = EntityRegistry::new();
        let mut patch = EntityPatch::new(EntityUid::from("ghost"));
        patch.pos = Some(Vec3::ONE);
        assert!(!reg.update(&patch));
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_clears_player_index() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        reg.add(&mut diff, Entity::player(EntityUid::from("p")))
            .unwrap();
        assert_eq!(reg.player_count(), 1);
        assert!(reg.remove(&EntityUid::from("p")).is_some());
        assert_eq!(reg.player_count(), 0);
        assert!(reg.remove(&EntityUid::from("p")).is_none());
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        for uid in ["z", "a", "m", "b"] {
            reg.add(&mut diff, ball(uid)).unwrap();
        }
        reg.remove(&EntityUid::from("m"));
        reg.add(&mut diff, ball("m")).unwrap();
        let seen: Vec<&str> = reg.iter().map(|e| e.uid().as_str()).collect();
        assert_eq!(seen, ["z", "a", "b", "m"]);
        // Restartable.
        assert_eq!(reg.iter().count(), 4);
    }

    #[test]
    fn remove_all_players_keeps_other_kinds() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        reg.add(&mut diff, Entity::player(EntityUid::from("p1")))
            .unwrap();
        reg.add(&mut diff, ball("b")).unwrap();
        reg.add(&mut diff, Entity::player(EntityUid::from("p2")))
            .unwrap();
        let removed = reg.remove_all_players();
        assert_eq!(removed.len(), 2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.active_players().count(), 0);
        assert!(reg.contains(&EntityUid::from("b")));
    }

    #[test]
    fn create_or_get_player_reuses_existing() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        let uid = EntityUid::from("p");
        let (_, created) = reg.create_or_get_player(&mut diff, &uid).unwrap();
        assert!(created);
        let (_, created) = reg.create_or_get_player(&mut diff, &uid).unwrap();
        assert!(!created);
        assert_eq!(diff.added().len(), 1);

        reg.add(&mut diff, ball("b")).unwrap();
        assert_eq!(
            reg.create_or_get_player(&mut diff, &EntityUid::from("b"))
                .map(|(_, c)| c),
            Err(RegistryError::NotAPlayer(EntityUid::from("b")))
        );
    }

    #[test]
    fn records_rebuild_the_registry() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        reg.add(&mut diff, Entity::player(EntityUid::from("p")))
            .unwrap();
        reg.add(&mut diff, ball("b")).unwrap();
        let rebuilt = EntityRegistry::from_records(reg.to_records()).unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.player_count(), 1);
    }

    #[test]
    fn take_dirty_reports_touched_entities_once() {
        let mut reg = EntityRegistry::new();
        let mut diff = StateDiff::new();
        for uid in ["a", "b", "c"] {
            reg.add(&mut diff, ball(uid)).unwrap();
        }
        assert!(reg.take_dirty().is_empty());

        reg.get_mut(&EntityUid::from("c")).unwrap().set_position(Vec3::ONE);
        let mut patch = EntityPatch::new(EntityUid::from("a"));
        patch.ttl = Some(1);
        assert!(reg.update(&patch));
        assert_eq!(reg.take_dirty(), [EntityUid::from("a"), EntityUid::from("c")]);
        assert!(reg.take_dirty().is_empty());
    }
}
