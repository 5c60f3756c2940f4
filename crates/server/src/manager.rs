//! World lifecycle: create, load, save and evict worlds, each running as its
//! own task, and route connection messages to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use craftsync_common::{EntityUid, WorldId};
use craftsync_kernel::RegistryError;
use craftsync_persist::{
    CreateWorldOptions, PersistenceStore, StoreError, WorldConfig, WorldMetadata, WorldRecord,
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::tick_period;
use crate::connection::ConnectionId;
use crate::hooks::ProjectileHook;
use crate::message::{Message, WorldRef};
use crate::world::WorldState;
use crate::world_server::WorldServer;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("world {0} not found")]
    NotFound(WorldId),
    #[error("world {0} is no longer running")]
    WorldClosed(WorldId),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Requests handled by a world task between ticks.
pub enum WorldCommand {
    Join {
        conn: ConnectionId,
        player_uid: EntityUid,
        outbox: mpsc::UnboundedSender<Message>,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    Leave {
        conn: ConnectionId,
    },
    Inbound {
        conn: ConnectionId,
        message: Message,
    },
    Snapshot {
        reply: oneshot::Sender<WorldRecord>,
    },
    /// Stop the task after replying with the final state.
    Shutdown {
        reply: oneshot::Sender<WorldRecord>,
    },
}

/// Cheap handle to a running world task.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    id: WorldId,
    commands: mpsc::UnboundedSender<WorldCommand>,
}

impl WorldHandle {
    pub fn id(&self) -> &WorldId {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn command(&self, command: WorldCommand) -> Result<(), ManagerError> {
        self.commands
            .send(command)
            .map_err(|_| ManagerError::WorldClosed(self.id.clone()))
    }

    pub async fn join(
        &self,
        conn: ConnectionId,
        player_uid: EntityUid,
        outbox: mpsc::UnboundedSender<Message>,
    ) -> Result<(), ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.command(WorldCommand::Join {
            conn,
            player_uid,
            outbox,
            reply,
        })?;
        rx.await
            .map_err(|_| ManagerError::WorldClosed(self.id.clone()))??;
        Ok(())
    }

    pub fn leave(&self, conn: ConnectionId) -> Result<(), ManagerError> {
        self.command(WorldCommand::Leave { conn })
    }

    /// Queue an inbound message for the world's next tick.
    pub fn send(&self, conn: ConnectionId, message: Message) -> Result<(), ManagerError> {
        self.command(WorldCommand::Inbound { conn, message })
    }

    /// Current state of the world, taken between ticks.
    pub async fn snapshot(&self) -> Result<WorldRecord, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.command(WorldCommand::Snapshot { reply })?;
        rx.await
            .map_err(|_| ManagerError::WorldClosed(self.id.clone()))
    }

    async fn shutdown(&self) -> Result<WorldRecord, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.command(WorldCommand::Shutdown { reply })?;
        rx.await
            .map_err(|_| ManagerError::WorldClosed(self.id.clone()))
    }
}

/// Per-connection routing state kept by the transport.
#[derive(Debug)]
pub struct ClientLink {
    pub id: ConnectionId,
    pub outbox: mpsc::UnboundedSender<Message>,
    world: Option<WorldHandle>,
}

impl ClientLink {
    pub fn new(id: ConnectionId, outbox: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            outbox,
            world: None,
        }
    }

    pub fn world(&self) -> Option<&WorldId> {
        self.world.as_ref().map(WorldHandle::id)
    }

    fn reply(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            tracing::debug!(conn = %self.id, "reply dropped, connection closed");
        }
    }
}

struct Resident {
    handle: WorldHandle,
    task: JoinHandle<()>,
}

/// Owns every resident world and the store they are persisted to.
pub struct WorldManager {
    store: Arc<dyn PersistenceStore>,
    worlds: Mutex<HashMap<WorldId, Resident>>,
    next_conn: AtomicU64,
    defaults: WorldConfig,
}

impl WorldManager {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            worlds: Mutex::new(HashMap::new()),
            next_conn: AtomicU64::new(1),
            defaults: WorldConfig::default(),
        }
    }

    /// Settings for worlds whose creator sends none.
    pub fn with_world_defaults(mut self, defaults: WorldConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    /// Create and persist a new world, then start it.
    ///
    /// The config is clamped before anything is stored.
    pub async fn create(&self, mut options: CreateWorldOptions) -> Result<WorldHandle, ManagerError> {
        options.config = options.config.sanitized();
        let store = Arc::clone(&self.store);
        let record = tokio::task::spawn_blocking(move || store.create_world(options)).await??;
        tracing::info!(world = %record.world_id, name = %record.name, "world created");

        let resident = start_world(record).await?;
        Ok(self.install(resident).await)
    }

    /// Handle to a running world, loading it from storage if it is not resident.
    ///
    /// The map lock is held only to look up and register worlds, never across
    /// store I/O or preloading.
    pub async fn get(&self, id: &WorldId) -> Result<Option<WorldHandle>, ManagerError> {
        if let Some(handle) = self.running(id).await {
            return Ok(Some(handle));
        }

        let store = Arc::clone(&self.store);
        let lookup = id.clone();
        let Some(record) = tokio::task::spawn_blocking(move || store.get_world(&lookup)).await??
        else {
            return Ok(None);
        };
        tracing::info!(world = %id, entities = record.entities.len(), "world loaded");
        let resident = start_world(record).await?;
        Ok(Some(self.install(resident).await))
    }

    async fn running(&self, id: &WorldId) -> Option<WorldHandle> {
        let mut worlds = self.worlds.lock().await;
        let resident = worlds.get(id)?;
        if !resident.handle.is_closed() {
            return Some(resident.handle.clone());
        }
        tracing::warn!(world = %id, "world task exited, reloading");
        worlds.remove(id);
        None
    }

    /// Register a started world. When another caller started the same world
    /// first, theirs is kept and `resident` stops once its handle is dropped.
    async fn install(&self, resident: Resident) -> WorldHandle {
        let mut worlds = self.worlds.lock().await;
        if let Some(existing) = worlds.get(&resident.handle.id) {
            if !existing.handle.is_closed() {
                tracing::debug!(world = %existing.handle.id, "world started twice, keeping the first");
                return existing.handle.clone();
            }
        }
        let handle = resident.handle.clone();
        worlds.insert(handle.id.clone(), resident);
        handle
    }

    /// Persist the current state of a resident world.
    pub async fn save(&self, id: &WorldId) -> Result<(), ManagerError> {
        let handle = self
            .worlds
            .lock()
            .await
            .get(id)
            .map(|r| r.handle.clone())
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        let record = handle.snapshot().await?;
        self.persist(record).await?;
        tracing::info!(world = %id, "world saved");
        Ok(())
    }

    /// Stop a world task, saving its final state. Returns `false` if the
    /// world was not resident.
    pub async fn evict(&self, id: &WorldId) -> Result<bool, ManagerError> {
        let Some(resident) = self.worlds.lock().await.remove(id) else {
            return Ok(false);
        };
        let record = resident.handle.shutdown().await?;
        resident.task.await?;
        self.persist(record).await?;
        tracing::info!(world = %id, "world evicted");
        Ok(true)
    }

    pub async fn list(&self) -> Result<Vec<WorldMetadata>, ManagerError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.list_worlds()).await??)
    }

    /// Ids of worlds with a running task.
    pub async fn resident(&self) -> Vec<WorldId> {
        let mut ids: Vec<_> = self.worlds.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Evict every resident world. Keeps going past failures and returns the first.
    pub async fn shutdown_all(&self) -> Result<(), ManagerError> {
        let mut first_error = None;
        for id in self.resident().await {
            if let Err(e) = self.evict(&id).await {
                tracing::warn!(world = %id, error = %e, "eviction failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn persist(&self, record: WorldRecord) -> Result<(), ManagerError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_world(&record)).await??;
        Ok(())
    }

    /// Route one decoded message from a connection.
    pub async fn handle_message(&self, link: &mut ClientLink, message: Message) {
        match message {
            Message::JoinWorld(req) => match self.get(&req.world_id).await {
                Ok(Some(handle)) => self.attach(link, handle, req.my_uid).await,
                Ok(None) => {
                    tracing::info!(conn = %link.id, world = %req.world_id, "join for unknown world");
                    link.reply(Message::WorldNotFound(WorldRef {
                        world_id: req.world_id,
                    }));
                }
                Err(e) => tracing::warn!(conn = %link.id, world = %req.world_id, error = %e, "world load failed"),
            },
            Message::NewWorld(req) => {
                let options = CreateWorldOptions {
                    name: req.name,
                    config: req.config.unwrap_or_else(|| self.defaults.clone()),
                };
                match self.create(options).await {
                    Ok(handle) => self.attach(link, handle, req.my_uid).await,
                    Err(e) => tracing::warn!(conn = %link.id, error = %e, "world creation failed"),
                }
            }
            Message::SaveWorld(req) => {
                if let Err(e) = self.save(&req.world_id).await {
                    tracing::warn!(conn = %link.id, world = %req.world_id, error = %e, "save failed");
                }
            }
            message @ (Message::GetChunk(_) | Message::Actions(_) | Message::PlayerActions(_)) => {
                let Some(handle) = &link.world else {
                    tracing::debug!(conn = %link.id, tag = message.tag(), "message before joining a world");
                    return;
                };
                if let Err(e) = handle.send(link.id, message) {
                    tracing::warn!(conn = %link.id, error = %e, "message not delivered to world");
                }
            }
            other => tracing::warn!(conn = %link.id, tag = other.tag(), "server-only message from client"),
        }
    }

    /// Detach the connection from its world, if any.
    pub async fn disconnect(&self, link: &mut ClientLink) {
        if let Some(handle) = link.world.take() {
            if let Err(e) = handle.leave(link.id) {
                tracing::debug!(conn = %link.id, error = %e, "world already gone");
            }
        }
    }

    async fn attach(&self, link: &mut ClientLink, handle: WorldHandle, player_uid: EntityUid) {
        self.disconnect(link).await;
        match handle.join(link.id, player_uid, link.outbox.clone()).await {
            Ok(()) => link.world = Some(handle),
            Err(e) => tracing::warn!(conn = %link.id, world = %handle.id, error = %e, "join rejected"),
        }
    }
}

async fn start_world(mut record: WorldRecord) -> Result<Resident, ManagerError> {
    record.config = record.config.sanitized();
    let world = WorldState::from_record(record)?;
    world.preload().await;

    let id = world.id.clone();
    let period = tick_period(&world.config);
    let (commands, rx) = mpsc::unbounded_channel();
    let server = WorldServer::new(world).with_hook(ProjectileHook);
    let task = tokio::spawn(run_world(server, rx, period));
    Ok(Resident {
        handle: WorldHandle { id, commands },
        task,
    })
}

/// The world task: ticks on a fixed interval and applies commands in between.
async fn run_world(
    mut server: WorldServer,
    mut commands: mpsc::UnboundedReceiver<WorldCommand>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                server.tick().await;
            }
            command = commands.recv() => match command {
                Some(WorldCommand::Join { conn, player_uid, outbox, reply }) => {
                    let _ = reply.send(server.join(conn, player_uid, outbox));
                }
                Some(WorldCommand::Leave { conn }) => server.leave(conn),
                Some(WorldCommand::Inbound { conn, message }) => server.enqueue(conn, message),
                Some(WorldCommand::Snapshot { reply }) => {
                    let _ = reply.send(server.world().to_record());
                }
                Some(WorldCommand::Shutdown { reply }) => {
                    let _ = reply.send(server.world().to_record());
                    break;
                }
                None => break,
            },
        }
    }
    tracing::info!(world = %server.world().id, ticks = server.tick_count(), "world task stopped");
}
