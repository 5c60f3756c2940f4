//! Applies intents to a world and records externally visible mutations.

use std::collections::HashMap;

use craftsync_common::{BlockData, BlockType, EntityUid, WorldPos};
use craftsync_input::PlayerAction;
use craftsync_kernel::{
    BeltItem, Entity, EntityPatch, FIREBALL_SPEED, FIREBALL_TICKS, PlayerState, RegistryError,
};
use craftsync_stream::ChunkError;
use glam::Vec3;

use crate::world::WorldState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("player {0} not found")]
    UnknownPlayer(EntityUid),
    #[error("entity {0} is not a player")]
    NotAPlayer(EntityUid),
    #[error("block {0:?} is outside the world")]
    OutOfBounds(WorldPos),
    #[error("chunk containing {0:?} is not loaded")]
    ChunkNotLoaded(WorldPos),
    #[error("block {0:?} is occupied by an entity")]
    Occupied(WorldPos),
    #[error("belt index {0} out of range")]
    BeltIndex(usize),
    #[error("no jumps left until the player lands")]
    JumpLimit,
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ActionError {
    /// Soft failures are expected during play and are dropped quietly.
    pub fn is_soft(&self) -> bool {
        !matches!(self, ActionError::Chunk(_) | ActionError::Registry(_))
    }
}

/// Outcome of one dispatched intent, passed to observers.
#[derive(Debug)]
pub struct ActionEvent<'a> {
    pub action: &'a PlayerAction,
    pub outcome: &'a Result<(), ActionError>,
}

pub type ActionObserver = Box<dyn FnMut(&ActionEvent<'_>) + Send>;

/// Validates intents against the world, applies them and records the
/// resulting mutations into `world.diff`.
#[derive(Default)]
pub struct ActionProcessor {
    observers: HashMap<EntityUid, Vec<ActionObserver>>,
}

impl ActionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the outcome of every intent attributed to `player`.
    pub fn add_observer(&mut self, player: EntityUid, observer: ActionObserver) {
        self.observers.entry(player).or_default().push(observer);
    }

    pub fn remove_observers(&mut self, player: &EntityUid) {
        self.observers.remove(player);
    }

    /// Apply `action`. Never panics; every failure is reported as an error
    /// and leaves the world unchanged.
    pub async fn perform(
        &mut self,
        world: &mut WorldState,
        action: &PlayerAction,
    ) -> Result<(), ActionError> {
        let uid = action.player_uid();
        match world.entities.try_get(uid) {
            None => {
                tracing::debug!(player = %uid, kind = %action.kind(), "intent for unknown player");
                return Err(ActionError::UnknownPlayer(uid.clone()));
            }
            Some(e) if !e.is_player() => return Err(ActionError::NotAPlayer(uid.clone())),
            Some(_) => {}
        }

        let outcome = dispatch(world, action).await;
        tracing::debug!(player = %uid, kind = %action.kind(), ok = outcome.is_ok(), "intent applied");

        if let Some(observers) = self.observers.get_mut(uid) {
            let event = ActionEvent {
                action,
                outcome: &outcome,
            };
            for observer in observers.iter_mut() {
                observer(&event);
            }
        }
        outcome
    }
}

/// Mutable access to the acting player. Callers have already checked it exists.
fn player_mut<'w>(world: &'w mut WorldState, uid: &EntityUid) -> Result<&'w mut Entity, ActionError> {
    world
        .entities
        .get_mut(uid)
        .ok_or_else(|| ActionError::UnknownPlayer(uid.clone()))
}

/// Mutate player-only state and record the player as updated.
fn update_player<R>(
    world: &mut WorldState,
    uid: &EntityUid,
    f: impl FnOnce(&mut PlayerState) -> R,
) -> Result<R, ActionError> {
    let out = player_mut(world, uid)?
        .update_player(f)
        .ok_or_else(|| ActionError::NotAPlayer(uid.clone()))?;
    world.diff.update_entity(uid.clone());
    Ok(out)
}

async fn dispatch(world: &mut WorldState, action: &PlayerAction) -> Result<(), ActionError> {
    let uid = action.player_uid();
    match action {
        PlayerAction::Rotate(d) => update_player(world, uid, |p| p.rotation = d.player_rot),
        PlayerAction::Jump(_) => jump(world, uid),
        PlayerAction::PlaceBlock(d) => place_block(world, uid, d.target),
        PlayerAction::RemoveBlock(d) => remove_block(world, d.target),
        PlayerAction::ToggleCreative(_) => {
            update_player(world, uid, |p| p.creative = !p.creative)
        }
        PlayerAction::Move(d) => update_player(world, uid, |p| {
            p.rotation = d.player_rot;
            p.move_directions = d.directions.clone();
        }),
        PlayerAction::SetPos(d) => {
            let mut patch = EntityPatch::new(uid.clone());
            patch.pos = Some(d.pos);
            patch.on_ground = d.on_ground;
            if !world.entities.update(&patch) {
                return Err(ActionError::UnknownPlayer(uid.clone()));
            }
            world.diff.update_entity(uid.clone());
            Ok(())
        }
        PlayerAction::BeltLeft(_) => update_player(world, uid, |p| p.belt.move_left()),
        PlayerAction::BeltRight(_) => update_player(world, uid, |p| p.belt.move_right()),
        PlayerAction::SetBeltIndex(d) => set_belt_index(world, uid, d.index),
        PlayerAction::PlaceDebugBlock(_) => place_debug_block(world, uid).await,
    }
}

fn jump(world: &mut WorldState, uid: &EntityUid) -> Result<(), ActionError> {
    let can_jump = player_mut(world, uid)?
        .as_player()
        .is_some_and(PlayerState::can_jump);
    if !can_jump {
        return Err(ActionError::JumpLimit);
    }
    update_player(world, uid, |p| {
        p.jump();
    })
}

fn set_belt_index(world: &mut WorldState, uid: &EntityUid, index: usize) -> Result<(), ActionError> {
    let in_range = player_mut(world, uid)?
        .as_player()
        .is_some_and(|p| index < p.belt.len());
    if !in_range {
        return Err(ActionError::BeltIndex(index));
    }
    update_player(world, uid, |p| {
        p.belt.set_index(index);
    })
}

/// Resolve a block target that must lie inside a resident chunk.
fn resident_target(world: &WorldState, target: WorldPos) -> Result<(), ActionError> {
    if !target.is_valid() {
        return Err(ActionError::OutOfBounds(target));
    }
    if !world.chunks.has(target.chunk_pos()) {
        return Err(ActionError::ChunkNotLoaded(target));
    }
    Ok(())
}

fn place_block(world: &mut WorldState, uid: &EntityUid, target: WorldPos) -> Result<(), ActionError> {
    let player = world.entities.get(uid)?;
    let Some(state) = player.as_player() else {
        return Err(ActionError::NotAPlayer(uid.clone()));
    };
    let block = match state.belt.selected_item() {
        BeltItem::Block(block) => block,
        BeltItem::Fireball => {
            let velocity = state.facing() * -FIREBALL_SPEED;
            let position = player.position() + velocity * 4.0 + Vec3::new(0.5, 2.0, 0.5);
            let ball = Entity::projectile(EntityUid::generate(), position, velocity, FIREBALL_TICKS);
            world.entities.add(&mut world.diff, ball)?;
            return Ok(());
        }
    };

    resident_target(world, target)?;
    if world.entities.iter().any(|e| e.overlaps_block(target)) {
        tracing::debug!(?target, "placement blocked by entity");
        return Err(ActionError::Occupied(target));
    }
    set_block(world, target, block);
    Ok(())
}

fn remove_block(world: &mut WorldState, target: WorldPos) -> Result<(), ActionError> {
    resident_target(world, target)?;
    set_block(world, target, BlockType::Void);
    Ok(())
}

/// Drop a gold block at the player's feet, loading the chunk if needed.
async fn place_debug_block(world: &mut WorldState, uid: &EntityUid) -> Result<(), ActionError> {
    let target = WorldPos::containing(world.entities.get(uid)?.position());
    if !target.is_valid() {
        return Err(ActionError::OutOfBounds(target));
    }
    world.chunks.get(target.chunk_pos()).await?;
    set_block(world, target, BlockType::Gold);
    Ok(())
}

fn set_block(world: &mut WorldState, target: WorldPos, block: BlockType) {
    let pos = target.chunk_pos();
    let inner = target.inner();
    let applied = world
        .chunks
        .update(pos, |chunk| chunk.set_block(inner, block, BlockData::None));
    if applied.is_some() {
        world.diff.update_chunk(pos);
    }
}
