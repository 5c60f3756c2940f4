use crate::record::{CreateWorldOptions, WorldMetadata, WorldRecord};
use crate::store::{PersistenceStore, StoreError};
use craftsync_common::WorldId;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keeps worlds in memory only. Used by tests and ephemeral servers.
#[derive(Default)]
pub struct InMemoryStore {
    worlds: Mutex<BTreeMap<WorldId, WorldRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn worlds(&self) -> MutexGuard<'_, BTreeMap<WorldId, WorldRecord>> {
        self.worlds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistenceStore for InMemoryStore {
    fn create_world(&self, options: CreateWorldOptions) -> Result<WorldRecord, StoreError> {
        let world = WorldRecord::new(options);
        self.save_world(&world)?;
        Ok(world)
    }

    fn get_world(&self, id: &WorldId) -> Result<Option<WorldRecord>, StoreError> {
        Ok(self.worlds().get(id).cloned())
    }

    fn save_world(&self, world: &WorldRecord) -> Result<(), StoreError> {
        self.worlds()
            .insert(world.world_id.clone(), world.clone());
        Ok(())
    }

    fn list_worlds(&self) -> Result<Vec<WorldMetadata>, StoreError> {
        Ok(self.worlds().values().map(WorldRecord::metadata).collect())
    }

    fn delete_world(&self, id: &WorldId) -> Result<bool, StoreError> {
        Ok(self.worlds().remove(id).is_some())
    }
}
