use crate::action::PlayerAction;
use craftsync_common::ChunkPos;

/// Per-connection queue of intents received between ticks.
#[derive(Debug, Clone, Default)]
pub struct ActionIntake {
    actions: Vec<PlayerAction>,
    chunk_requests: Vec<ChunkPos>,
}

impl ActionIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: PlayerAction) {
        tracing::trace!(kind = %action.kind(), player = %action.player_uid(), "intent queued");
        self.actions.push(action);
    }

    /// Queue a chunk the connection asked to be streamed.
    pub fn request_chunk(&mut self, pos: ChunkPos) {
        self.chunk_requests.push(pos);
    }

    /// Take every queued intent in arrival order.
    pub fn drain(&mut self) -> Vec<PlayerAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn drain_chunk_requests(&mut self) -> Vec<ChunkPos> {
        std::mem::take(&mut self.chunk_requests)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.chunk_requests.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.chunk_requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftsync_common::EntityUid;

    #[test]
    fn drain_preserves_arrival_order_and_empties() {
        let mut q = ActionIntake::new();
        q.push(PlayerAction::jump(EntityUid::from("a")));
        q.push(PlayerAction::set_belt_index(EntityUid::from("a"), 1));
        assert_eq!(q.len(), 2);

        let drained = q.drain();
        assert_eq!(drained[0], PlayerAction::jump(EntityUid::from("a")));
        assert_eq!(drained.len(), 2);
        assert!(q.is_empty());
        assert!(q.drain().is_empty());
    }

    #[test]
    fn clear_drops_actions_and_chunk_requests() {
        let mut q = ActionIntake::new();
        q.push(PlayerAction::jump(EntityUid::from("a")));
        q.request_chunk(ChunkPos::new(0, 0));
        assert!(!q.is_empty());
        q.clear();
        assert!(q.is_empty());
        assert!(q.drain_chunk_requests().is_empty());
    }
}
