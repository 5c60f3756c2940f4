//! Entity model: a closed set of variants, their wire records, and the
//! per-kind construction table.

use craftsync_common::{BlockType, EntityUid, WorldPos};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Upward velocity applied by a successful jump.
pub const JUMP_SPEED: f32 = 0.25;
/// Jumps allowed before the player has to land again.
pub const MAX_JUMPS: u32 = 5;
/// Speed of a projectile fired from the belt.
pub const FIREBALL_SPEED: f32 = 0.4;
/// Ticks a fireball lives before it is removed.
pub const FIREBALL_TICKS: u32 = 100;

/// Discriminant of the entity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Player,
    Projectile,
}

/// Direction of intended movement relative to the player's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveDirection {
    Forwards,
    Backwards,
    Left,
    Right,
    Up,
    Down,
}

/// An item a player can hold in a belt slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BeltItem {
    Block(BlockType),
    Fireball,
}

const BELT_ITEMS: [BeltItem; 8] = [
    BeltItem::Block(BlockType::Stone),
    BeltItem::Block(BlockType::Gold),
    BeltItem::Block(BlockType::Grass),
    BeltItem::Block(BlockType::Wood),
    BeltItem::Block(BlockType::RedFlower),
    BeltItem::Block(BlockType::Cloud),
    BeltItem::Block(BlockType::Leaf),
    BeltItem::Fireball,
];

/// The player's inventory selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Belt {
    selected: usize,
}

impl Belt {
    pub fn len(&self) -> usize {
        BELT_ITEMS.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> BeltItem {
        BELT_ITEMS[self.selected]
    }

    pub fn move_left(&mut self) {
        self.selected = (self.selected + BELT_ITEMS.len() - 1) % BELT_ITEMS.len();
    }

    pub fn move_right(&mut self) {
        self.selected = (self.selected + 1) % BELT_ITEMS.len();
    }

    /// Select a slot. Returns `false` and leaves the belt untouched when out of range.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index >= BELT_ITEMS.len() {
            return false;
        }
        self.selected = index;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 100,
            max: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    /// Spherical rotation `(radius, theta, phi)`.
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub move_directions: Vec<MoveDirection>,
    pub belt: Belt,
    pub health: Health,
    pub creative: bool,
    pub on_ground: bool,
    pub jump_count: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            rotation: Vec3::new(0.0, 0.0, FRAC_PI_2),
            velocity: Vec3::ZERO,
            move_directions: Vec::new(),
            belt: Belt::default(),
            health: Health::default(),
            creative: false,
            on_ground: false,
            jump_count: 0,
        }
    }
}

impl PlayerState {
    pub fn can_jump(&self) -> bool {
        self.jump_count < MAX_JUMPS
    }

    /// Returns `false`, changing nothing, once the jump limit is reached.
    pub fn jump(&mut self) -> bool {
        if !self.can_jump() {
            return false;
        }
        self.velocity.y = JUMP_SPEED;
        self.jump_count += 1;
        self.on_ground = false;
        true
    }

    /// Ground contact: vertical motion stops and jumps are restored.
    pub fn land(&mut self) {
        self.on_ground = true;
        self.jump_count = 0;
        self.velocity.y = 0.0;
    }

    /// Unit vector the player is looking along.
    pub fn facing(&self) -> Vec3 {
        let (t, p) = (self.rotation.y, self.rotation.z);
        Vec3::new(p.sin() * t.cos(), p.cos(), p.sin() * t.sin())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileState {
    pub velocity: Vec3,
    /// Remaining ticks before the projectile expires.
    pub ttl: u32,
}

/// Variant-specific state.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Player(PlayerState),
    Projectile(ProjectileState),
}

/// A uniquely identified simulated object.
///
/// Fields are only changed through the typed setters, each of which marks the
/// entity dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    uid: EntityUid,
    position: Vec3,
    dimensions: Vec3,
    kind: EntityKind,
    dirty: bool,
}

impl Entity {
    /// A fresh player at the default spawn point.
    pub fn player(uid: EntityUid) -> Self {
        Self {
            uid,
            position: Vec3::new(0.0, 50.0, 0.0),
            dimensions: Vec3::new(0.8, 2.0, 0.8),
            kind: EntityKind::Player(PlayerState::default()),
            dirty: false,
        }
    }

    pub fn projectile(uid: EntityUid, position: Vec3, velocity: Vec3, ttl: u32) -> Self {
        Self {
            uid,
            position,
            dimensions: Vec3::splat(0.5),
            kind: EntityKind::Projectile(ProjectileState { velocity, ttl }),
            dirty: false,
        }
    }

    /// Build an entity from its record, dispatching on the record's kind.
    pub fn from_record(record: EntityRecord) -> Self {
        let factory = record.entity_type().factory();
        factory(record)
    }

    fn player_from_record(record: EntityRecord) -> Self {
        let EntityRecord::Player(r) = record else {
            unreachable!("player factory dispatched for a non-player record")
        };
        let mut belt = Belt::default();
        belt.set_index(r.belt.selected_index);
        Self {
            uid: r.uid,
            position: r.pos,
            dimensions: r.dim,
            kind: EntityKind::Player(PlayerState {
                rotation: r.rot,
                velocity: r.vel,
                move_directions: r.move_directions,
                belt,
                health: r.health,
                creative: r.creative,
                on_ground: false,
                jump_count: 0,
            }),
            dirty: false,
        }
    }

    fn projectile_from_record(record: EntityRecord) -> Self {
        let EntityRecord::Projectile(r) = record else {
            unreachable!("projectile factory dispatched for a non-projectile record")
        };
        Self {
            uid: r.uid,
            position: r.pos,
            dimensions: r.dim,
            kind: EntityKind::Projectile(ProjectileState {
                velocity: r.vel,
                ttl: r.ttl,
            }),
            dirty: false,
        }
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn dimensions(&self) -> Vec3 {
        self.dimensions
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::Player(_) => EntityType::Player,
            EntityKind::Projectile(_) => EntityType::Projectile,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.kind {
            EntityKind::Player(p) => Some(p),
            _ => None,
        }
    }

    /// Clear and return the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn set_dimensions(&mut self, dimensions: Vec3) {
        self.dimensions = dimensions;
        self.dirty = true;
    }

    /// Mutate player-only state. Returns `None` for other variants.
    pub fn update_player<R>(&mut self, f: impl FnOnce(&mut PlayerState) -> R) -> Option<R> {
        match &mut self.kind {
            EntityKind::Player(p) => {
                self.dirty = true;
                Some(f(p))
            }
            _ => None,
        }
    }

    /// Mutate projectile-only state. Returns `None` for other variants.
    pub fn update_projectile<R>(
        &mut self,
        f: impl FnOnce(&mut ProjectileState) -> R,
    ) -> Option<R> {
        match &mut self.kind {
            EntityKind::Projectile(p) => {
                self.dirty = true;
                Some(f(p))
            }
            _ => None,
        }
    }

    /// Apply a partial record. Fields that do not belong to this variant are ignored.
    pub fn set(&mut self, patch: &EntityPatch) {
        self.dirty = true;
        if let Some(pos) = patch.pos {
            self.position = pos;
        }
        if let Some(dim) = patch.dim {
            self.dimensions = dim;
        }
        match &mut self.kind {
            EntityKind::Player(p) => {
                if let Some(vel) = patch.vel {
                    p.velocity = vel;
                }
                if let Some(rot) = patch.rot {
                    p.rotation = rot;
                }
                if let Some(dirs) = &patch.move_directions {
                    p.move_directions = dirs.clone();
                }
                if let Some(health) = patch.health {
                    p.health = health;
                }
                if let Some(creative) = patch.creative {
                    p.creative = creative;
                }
                match patch.on_ground {
                    Some(true) => p.land(),
                    Some(false) => p.on_ground = false,
                    None => {}
                }
            }
            EntityKind::Projectile(p) => {
                if let Some(vel) = patch.vel {
                    p.velocity = vel;
                }
                if let Some(ttl) = patch.ttl {
                    p.ttl = ttl;
                }
            }
        }
    }

    /// Whether the unit block at `block` intersects this entity's bounding box.
    pub fn overlaps_block(&self, block: WorldPos) -> bool {
        let min = block.as_vec3();
        let max = min + Vec3::ONE;
        let e_min = self.position;
        let e_max = self.position + self.dimensions;
        e_min.cmplt(max).all() && min.cmplt(e_max).all()
    }

    pub fn to_record(&self) -> EntityRecord {
        match &self.kind {
            EntityKind::Player(p) => EntityRecord::Player(PlayerRecord {
                uid: self.uid.clone(),
                pos: self.position,
                dim: self.dimensions,
                vel: p.velocity,
                rot: p.rotation,
                move_directions: p.move_directions.clone(),
                belt: BeltRecord {
                    selected_index: p.belt.selected_index(),
                    selected_item: p.belt.selected_item(),
                },
                health: p.health,
                creative: p.creative,
            }),
            EntityKind::Projectile(p) => EntityRecord::Projectile(ProjectileRecord {
                uid: self.uid.clone(),
                pos: self.position,
                dim: self.dimensions,
                vel: p.velocity,
                ttl: p.ttl,
            }),
        }
    }
}

type EntityFactory = fn(EntityRecord) -> Entity;

impl EntityType {
    /// Constructor for this kind. The match is exhaustive, so every kind has one.
    fn factory(self) -> EntityFactory {
        match self {
            EntityType::Player => Entity::player_from_record,
            EntityType::Projectile => Entity::projectile_from_record,
        }
    }
}

/// Wire/storage record of an entity, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityRecord {
    Player(PlayerRecord),
    Projectile(ProjectileRecord),
}

impl EntityRecord {
    pub fn uid(&self) -> &EntityUid {
        match self {
            EntityRecord::Player(r) => &r.uid,
            EntityRecord::Projectile(r) => &r.uid,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRecord::Player(_) => EntityType::Player,
            EntityRecord::Projectile(_) => EntityType::Projectile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeltRecord {
    pub selected_index: usize,
    pub selected_item: BeltItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub uid: EntityUid,
    pub pos: Vec3,
    pub dim: Vec3,
    pub vel: Vec3,
    pub rot: Vec3,
    pub move_directions: Vec<MoveDirection>,
    pub belt: BeltRecord,
    pub health: Health,
    pub creative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileRecord {
    pub uid: EntityUid,
    pub pos: Vec3,
    pub dim: Vec3,
    pub vel: Vec3,
    pub ttl: u32,
}

/// A partial record naming an entity and the fields to overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    pub uid: EntityUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vel: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rot: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_directions: Option<Vec<MoveDirection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative: Option<bool>,
    /// Reported by physics; landing restores the player's jumps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl EntityPatch {
    pub fn new(uid: EntityUid) -> Self {
        Self {
            uid,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belt_wraps_in_both_directions() {
        let mut belt = Belt::default();
        belt.move_left();
        assert_eq!(belt.selected_index(), belt.len() - 1);
        assert_eq!(belt.selected_item(), BeltItem::Fireball);
        belt.move_right();
        assert_eq!(belt.selected_index(), 0);
    }

    #[test]
    fn belt_rejects_out_of_range_index() {
        let mut belt = Belt::default();
        assert!(belt.set_index(2));
        assert!(!belt.set_index(99));
        assert_eq!(belt.selected_index(), 2);
    }

    #[test]
    fn record_dispatch_builds_matching_variant() {
        let player = Entity::player(EntityUid::from("p1"));
        let rebuilt = Entity::from_record(player.to_record());
        assert_eq!(rebuilt.entity_type(), EntityType::Player);
        assert_eq!(rebuilt.uid().as_str(), "p1");
        assert_eq!(rebuilt.position(), player.position());

        let ball = Entity::projectile(EntityUid::from("b1"), Vec3::ONE, Vec3::X, 7);
        let rebuilt = Entity::from_record(ball.to_record());
        assert_eq!(rebuilt.entity_type(), EntityType::Projectile);
        assert_eq!(rebuilt, ball);
    }

    #[test]
    fn record_is_tagged_by_type() {
        let ball = Entity::projectile(EntityUid::from("b1"), Vec3::ZERO, Vec3::ZERO, 3);
        let json = serde_json::to_value(ball.to_record()).unwrap();
        assert_eq!(json["type"], "projectile");
        assert_eq!(json["uid"], "b1");
        assert_eq!(json["ttl"], 3);
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let raw = r#"{"type":"dragon","uid":"x","pos":[0,0,0],"dim":[1,1,1]}"#;
        assert!(serde_json::from_str::<EntityRecord>(raw).is_err());
    }

    #[test]
    fn setters_mark_dirty() {
        let mut e = Entity::player(EntityUid::from("p"));
        assert!(!e.take_dirty());
        e.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(e.take_dirty());
        assert!(!e.take_dirty());
        e.update_player(|p| p.creative = true);
        assert!(e.take_dirty());
    }

    #[test]
    fn jumps_run_out_until_landing() {
        let mut p = PlayerState::default();
        for _ in 0..MAX_JUMPS {
            assert!(p.jump());
        }
        assert!(!p.jump());
        assert_eq!(p.jump_count, MAX_JUMPS);

        let mut e = Entity::player(EntityUid::from("p"));
        e.update_player(|s| *s = p);
        let mut patch = EntityPatch::new(EntityUid::from("p"));
        patch.on_ground = Some(true);
        e.set(&patch);
        let state = e.as_player().unwrap();
        assert!(state.on_ground && state.can_jump());
        assert_eq!(state.velocity.y, 0.0);
    }

    #[test]
    fn patch_ignores_fields_of_other_variants() {
        let mut e = Entity::player(EntityUid::from("p"));
        let mut patch = EntityPatch::new(EntityUid::from("p"));
        patch.ttl = Some(4);
        patch.creative = Some(true);
        e.set(&patch);
        assert!(e.as_player().unwrap().creative);
        assert!(e.update_projectile(|_| ()).is_none());
    }

    #[test]
    fn block_overlap_uses_bounding_box() {
        let mut e = Entity::player(EntityUid::from("p"));
        e.set_position(Vec3::new(0.5, 10.0, 0.5));
        // Box spans x in [0.5, 1.3), y in [10, 12), z in [0.5, 1.3).
        assert!(e.overlaps_block(WorldPos::new(0, 10, 0)));
        assert!(e.overlaps_block(WorldPos::new(1, 11, 1)));
        assert!(!e.overlaps_block(WorldPos::new(0, 12, 0)));
        assert!(!e.overlaps_block(WorldPos::new(2, 10, 0)));
    }

    #[test]
    fn default_facing_is_horizontal() {
        let p = PlayerState::default();
        let f = p.facing();
        assert!((f.length() - 1.0).abs() < 1e-5);
        assert!(f.y.abs() < 1e-5);
    }
}
