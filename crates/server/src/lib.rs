//! World Server: per-world tick loop that applies queued intents and fans
//! out per-connection diffs.
//!
//! # Invariants
//! - World state is mutated only inside the world's own task, at tick boundaries.
//! - A connection never receives the diff produced by its own intents.
//! - Failures of one intent or one session never abort the tick.

pub mod config;
pub mod connection;
pub mod hooks;
pub mod manager;
pub mod message;
pub mod processor;
pub mod world;
pub mod world_server;

pub use config::{ServerConfig, tick_period};
pub use connection::{ConnectionDirectory, ConnectionId, SendError, Session};
pub use hooks::{ProjectileHook, TickHook};
pub use manager::{ClientLink, ManagerError, WorldCommand, WorldHandle, WorldManager};
pub use message::{Message, ProtocolError};
pub use processor::{ActionError, ActionEvent, ActionObserver, ActionProcessor};
pub use world::WorldState;
pub use world_server::{TickReport, WorldServer};
