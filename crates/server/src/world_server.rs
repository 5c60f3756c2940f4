//! The per-world tick orchestrator.
//!
//! Each tick:
//! 1. Flush the world accumulator (passive mutations) to every connection.
//! 2. Fork one empty accumulator per connection.
//! 3. For each connection in order, apply its queued intents and append the
//!    resulting mutations to every other connection's accumulator.
//! 4. Send each non-empty accumulator to its connection.
//! 5. Clear all intake queues, then run passive tick hooks and record the
//!    entities they touched for the next flush.

use std::collections::BTreeMap;
use std::sync::Arc;

use craftsync_common::{ChunkPos, EntityUid};
use craftsync_kernel::{Chunk, RegistryError, StateDiff};
use craftsync_stream::{ChunkError, ChunkStore};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::connection::{ConnectionDirectory, ConnectionId};
use crate::hooks::TickHook;
use crate::message::{Message, PlayerNotice, SetChunk, Welcome, WelcomeGame};
use crate::processor::{ActionObserver, ActionProcessor};
use crate::world::WorldState;

type ChunkReply = (ConnectionId, ChunkPos, Result<Arc<Chunk>, ChunkError>);

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub intents_applied: usize,
    pub intents_dropped: usize,
    pub diffs_sent: usize,
    pub chunks_sent: usize,
}

pub struct WorldServer {
    world: WorldState,
    processor: ActionProcessor,
    directory: ConnectionDirectory,
    hooks: Vec<Box<dyn TickHook>>,
    /// Notices delivered with the next passive flush.
    pending_notices: Vec<Message>,
    tick: u64,
}

impl WorldServer {
    pub fn new(world: WorldState) -> Self {
        Self {
            world,
            processor: ActionProcessor::new(),
            directory: ConnectionDirectory::new(),
            hooks: Vec::new(),
            pending_notices: Vec::new(),
            tick: 0,
        }
    }

    pub fn with_hook(mut self, hook: impl TickHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn add_hook(&mut self, hook: Box<dyn TickHook>) {
        self.hooks.push(hook);
    }

    pub fn add_observer(&mut self, player: EntityUid, observer: ActionObserver) {
        self.processor.add_observer(player, observer);
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Attach a connection as `player_uid`, creating the player if needed.
    ///
    /// The joiner gets a welcome; everyone else is told about the new player
    /// right away rather than on the next tick.
    pub fn join(
        &mut self,
        conn: ConnectionId,
        player_uid: EntityUid,
        outbox: mpsc::UnboundedSender<Message>,
    ) -> Result<(), RegistryError> {
        let mut scratch = StateDiff::new();
        let (_, created) = self
            .world
            .entities
            .create_or_get_player(&mut scratch, &player_uid)?;
        if self.directory.is_player_connected(&player_uid, Some(conn)) {
            tracing::warn!(%conn, player = %player_uid, "player already has a live connection");
        }

        let active_players = self.directory.players();
        self.directory.insert(conn, player_uid.clone(), outbox);

        let welcome = Message::Welcome(Welcome {
            uid: player_uid.clone(),
            game: WelcomeGame {
                world_id: self.world.id.clone(),
                name: self.world.name.clone(),
                config: self.world.config.clone(),
                entities: self.world.entities.to_records(),
                active_players,
            },
        });
        if let Err(e) = self.directory.send(conn, welcome) {
            tracing::warn!(%conn, error = %e, "welcome not delivered");
        }

        let mut added = StateDiff::new();
        added.add_entity(player_uid.clone());
        let record = added.serialize(&self.world.entities, self.world.chunks.as_ref());
        self.directory.broadcast(&Message::GameDiff(record), Some(conn));
        self.directory.broadcast(
            &Message::NewPlayer(PlayerNotice {
                uid: player_uid.clone(),
            }),
            Some(conn),
        );

        tracing::info!(
            world = %self.world.id,
            %conn,
            player = %player_uid,
            created,
            players = self.directory.len(),
            "player joined"
        );
        Ok(())
    }

    /// Detach a connection. Its player is removed now; the removal reaches
    /// the remaining connections with the next tick's passive flush.
    pub fn leave(&mut self, conn: ConnectionId) {
        let Some(session) = self.directory.remove(conn) else {
            return;
        };
        let uid = session.player_uid;
        if self.directory.is_player_connected(&uid, None) {
            tracing::info!(%conn, player = %uid, "connection closed, player still connected elsewhere");
            return;
        }
        if self.world.entities.remove(&uid).is_some() {
            self.world.diff.remove_entity(uid.clone());
        }
        self.processor.remove_observers(&uid);
        self.pending_notices
            .push(Message::PlayerLeave(PlayerNotice { uid: uid.clone() }));
        tracing::info!(
            world = %self.world.id,
            %conn,
            player = %uid,
            players = self.directory.len(),
            "player left"
        );
    }

    /// Queue an inbound message from `conn` for the next tick.
    ///
    /// Intents naming a player other than the connection's own are refused.
    pub fn enqueue(&mut self, conn: ConnectionId, message: Message) {
        let Some(session) = self.directory.get_mut(conn) else {
            tracing::warn!(%conn, tag = message.tag(), "message from unknown connection");
            return;
        };
        match message {
            Message::Actions(action) | Message::PlayerActions(action) => {
                if action.player_uid() != &session.player_uid {
                    tracing::warn!(
                        %conn,
                        player = %session.player_uid,
                        named = %action.player_uid(),
                        kind = %action.kind(),
                        "intent for another player refused"
                    );
                    return;
                }
                session.intake.push(action)
            }
            Message::GetChunk(req) => session.intake.request_chunk(req.pos),
            other => tracing::warn!(%conn, tag = other.tag(), "unexpected message for world"),
        }
    }

    /// Run one tick.
    pub async fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let span = tracing::info_span!("tick", world = %self.world.id, tick = self.tick);
        self.run_tick().instrument(span).await
    }

    async fn run_tick(&mut self) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        // 1. passive flush
        if self.world.diff.has_data() {
            let record = self
                .world
                .diff
                .serialize(&self.world.entities, self.world.chunks.as_ref());
            self.directory.broadcast(&Message::GameDiff(record), None);
        }
        for notice in std::mem::take(&mut self.pending_notices) {
            self.directory.broadcast(&notice, None);
        }
        self.world.diff.clear();

        // 2. fork baselines
        let ids = self.directory.ids();
        let mut outgoing: BTreeMap<ConnectionId, StateDiff> = ids
            .iter()
            .map(|id| (*id, self.world.diff.copy()))
            .collect();

        // Chunk requests load concurrently and share in-flight loads.
        let chunk_loads = self.spawn_chunk_loads();

        // 3. drain intents per connection
        for id in &ids {
            self.world.diff.clear();
            let actions = match self.directory.get_mut(*id) {
                Some(session) => session.intake.drain(),
                None => continue,
            };
            for action in &actions {
                match self.processor.perform(&mut self.world, action).await {
                    Ok(()) => report.intents_applied += 1,
                    Err(e) => {
                        report.intents_dropped += 1;
                        if e.is_soft() {
                            tracing::debug!(conn = %id, kind = %action.kind(), error = %e, "intent dropped");
                        } else {
                            tracing::warn!(conn = %id, kind = %action.kind(), error = %e, "intent failed");
                        }
                    }
                }
            }
            for (other, diff) in outgoing.iter_mut() {
                if other != id {
                    diff.append(&self.world.diff);
                }
            }
        }
        report.chunks_sent = self.deliver_chunks(chunk_loads).await;

        // 4. emit
        for (id, diff) in &outgoing {
            if !diff.has_data() {
                continue;
            }
            let record = diff.serialize(&self.world.entities, self.world.chunks.as_ref());
            match self.directory.send(*id, Message::GameDiff(record)) {
                Ok(()) => report.diffs_sent += 1,
                Err(e) => tracing::warn!(conn = %id, error = %e, "diff not delivered"),
            }
        }

        // 5. reset
        for (_, session) in self.directory.sessions_mut() {
            session.intake.clear();
        }
        self.world.diff.clear();

        // Intent mutations were recorded explicitly above.
        self.world.entities.take_dirty();
        for hook in &mut self.hooks {
            tracing::trace!(hook = hook.name(), "running tick hook");
            hook.run(&mut self.world);
        }
        self.world.record_dirty_entities();

        tracing::trace!(
            applied = report.intents_applied,
            dropped = report.intents_dropped,
            diffs = report.diffs_sent,
            chunks = report.chunks_sent,
            "tick done"
        );
        report
    }

    fn spawn_chunk_loads(&mut self) -> JoinSet<ChunkReply> {
        let mut loads = JoinSet::new();
        for (id, session) in self.directory.sessions_mut() {
            for pos in session.intake.drain_chunk_requests() {
                let store: Arc<ChunkStore> = Arc::clone(&self.world.chunks);
                let id = *id;
                loads.spawn(async move { (id, pos, store.get(pos).await) });
            }
        }
        loads
    }

    /// Answer chunk requests with the chunk as it stands after this tick's intents.
    async fn deliver_chunks(
        &mut self,
        mut loads: JoinSet<ChunkReply>,
    ) -> usize {
        let mut sent = 0;
        while let Some(joined) = loads.join_next().await {
            let (id, pos, loaded) = match joined {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "chunk load task failed");
                    continue;
                }
            };
            if let Err(e) = loaded {
                tracing::warn!(conn = %id, %pos, error = %e, "chunk request failed");
                continue;
            }
            let Some(chunk) = self.world.chunks.cached(pos) else {
                continue;
            };
            let message = Message::SetChunk(SetChunk {
                pos,
                data: chunk.serialize(),
            });
            match self.directory.send(id, message) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(conn = %id, error = %e, "chunk not delivered"),
            }
        }
        sent
    }
}
