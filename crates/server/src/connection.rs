use crate::message::Message;
use craftsync_common::EntityUid;
use craftsync_input::ActionIntake;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Opaque connection identity. Allocated in increasing order, so ordering
/// by id is connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("no session for {0}")]
    UnknownConnection(ConnectionId),
    #[error("{0} is closed")]
    Closed(ConnectionId),
}

/// A connection joined to a world, with the intents it queued since the last tick.
pub struct Session {
    pub player_uid: EntityUid,
    pub intake: ActionIntake,
    outbox: mpsc::UnboundedSender<Message>,
}

/// Sessions of one world, iterated in connection order.
#[derive(Default)]
pub struct ConnectionDirectory {
    sessions: BTreeMap<ConnectionId, Session>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Replaces any previous session under `id`.
    pub fn insert(
        &mut self,
        id: ConnectionId,
        player_uid: EntityUid,
        outbox: mpsc::UnboundedSender<Message>,
    ) {
        self.sessions.insert(
            id,
            Session {
                player_uid,
                intake: ActionIntake::new(),
                outbox,
            },
        );
    }

    /// Drop a session, returning it with whatever it had queued.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Session for `id`, if joined.
    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Connection ids in iteration order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    /// Player uid of every session, in connection order.
    pub fn players(&self) -> Vec<EntityUid> {
        self.sessions.values().map(|s| s.player_uid.clone()).collect()
    }

    /// Whether any session other than `except` is attributed to `uid`.
    pub fn is_player_connected(&self, uid: &EntityUid, except: Option<ConnectionId>) -> bool {
        self.sessions
            .iter()
            .any(|(id, s)| Some(*id) != except && &s.player_uid == uid)
    }

    /// Sessions in connection order.
    pub fn sessions_mut(&mut self) -> impl Iterator<Item = (&ConnectionId, &mut Session)> {
        self.sessions.iter_mut()
    }

    /// Number of joined connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queue `message` on one session's outbox.
    pub fn send(&self, id: ConnectionId, message: Message) -> Result<(), SendError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(SendError::UnknownConnection(id))?;
        session
            .outbox
            .send(message)
            .map_err(|_| SendError::Closed(id))
    }

    /// Send to every session except `excluding`. Returns the number of failed sends.
    pub fn broadcast(&self, message: &Message, excluding: Option<ConnectionId>) -> usize {
        let mut failed = 0;
        for (id, session) in &self.sessions {
            if Some(*id) == excluding {
                continue;
            }
            if session.outbox.send(message.clone()).is_err() {
                tracing::warn!(conn = %id, tag = message.tag(), "send failed, connection closed");
                failed += 1;
            }
        }
        failed
    }
}
