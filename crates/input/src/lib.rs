//! Intents: the closed set of player actions and the queue they wait in.
//!
//! # Invariants
//! - Intents are immutable once queued and consumed exactly once.
//! - Every intent names the player it is attributed to.
//! - A queue is append-only until it is drained or cleared at a tick boundary.

pub mod action;
pub mod intake;

pub use action::{
    BeltIndexData, BlockTargetData, MoveData, PlayerAction, PlayerActionKind, PlayerRef,
    RotateData, SetPosData,
};
pub use intake::ActionIntake;
