use crate::world::WorldState;

/// Passive simulation run once per tick, after diffs are emitted.
///
/// Entities changed through their setters are recorded as updated once all
/// hooks have run. Adds and removals must be recorded into `world.diff`
/// directly. Either way they reach every connection through the next tick's
/// passive flush.
pub trait TickHook: Send {
    fn name(&self) -> &'static str;
    fn run(&mut self, world: &mut WorldState);
}

/// Moves projectiles along their velocity and removes them when they expire.
#[derive(Debug, Default)]
pub struct ProjectileHook;

impl TickHook for ProjectileHook {
    fn name(&self) -> &'static str {
        "projectiles"
    }

    fn run(&mut self, world: &mut WorldState) {
        for uid in world.entities.uids() {
            let Some(entity) = world.entities.get_mut(&uid) else {
                continue;
            };
            let step = entity.update_projectile(|p| {
                if p.ttl == 0 {
                    return None;
                }
                p.ttl -= 1;
                Some(p.velocity)
            });
            match step {
                Some(Some(velocity)) => {
                    let next = entity.position() + velocity;
                    entity.set_position(next);
                }
                Some(None) => {
                    world.entities.remove(&uid);
                    world.diff.remove_entity(uid);
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftsync_common::{EntityUid, WorldId};
    use craftsync_kernel::{Entity, StateDiff};
    use craftsync_persist::WorldConfig;
    use craftsync_stream::FlatTerrainLoader;
    use glam::Vec3;
    use std::sync::Arc;

    #[test]
    fn projectiles_advance_then_expire() {
        let mut world = WorldState::new(
            WorldId::from("w"),
            "hooks",
            WorldConfig::default(),
            Arc::new(FlatTerrainLoader::new(1)),
        );
        let mut scratch = StateDiff::new();
        let ball = EntityUid::from("ball");
        world
            .entities
            .add(&mut scratch, Entity::projectile(ball.clone(), Vec3::ZERO, Vec3::X, 1))
            .unwrap();
        world
            .entities
            .create_or_get_player(&mut scratch, &EntityUid::from("p"))
            .unwrap();

        let mut hook = ProjectileHook;
        hook.run(&mut world);
        assert_eq!(world.entities.get(&ball).unwrap().position(), Vec3::X);
        assert!(world.diff.updated().is_empty());
        assert_eq!(world.record_dirty_entities(), 1);
        assert_eq!(world.diff.updated(), &[ball.clone()]);

        world.diff.clear();
        hook.run(&mut world);
        assert_eq!(world.record_dirty_entities(), 0);
        assert!(world.entities.try_get(&ball).is_none());
        assert_eq!(world.diff.removed(), &[ball]);
        assert_eq!(world.entities.len(), 1);
    }
}
