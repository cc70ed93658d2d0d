//! Client-side synchronization core for a small multiplayer party racer.
//!
//! Every participant runs this crate and cooperates through a shared,
//! path-addressed replicated tree ([`store::ReplicatedStore`]); there is no
//! dedicated game server. A [`room::RoomSession`] handles the lobby: joining
//! by short code, readiness, host election, and the pre-game countdown. A
//! [`game::GameSession`] owns the per-room game document and its forward-only
//! phase machine, and a [`race::RaceSimulator`] drives this client's own car
//! at a fixed tick rate, publishing throttled position updates for everyone
//! else to render.
//!
//! The crate ships an in-process [`store::MemoryStore`] backend used by the
//! tests and for single-machine play; real deployments implement
//! [`store::ReplicatedStore`] over their replication transport.

pub mod config;
pub mod content;
pub mod error;
pub mod game;
pub mod model;
pub mod paths;
pub mod race;
pub mod room;
pub mod store;

pub use config::SyncConfig;
pub use error::{SessionError, SessionResult};
pub use game::GameSession;
pub use race::{Controls, RaceSimulator, finish_board, ranking};
pub use room::RoomSession;
pub use store::{MemoryConn, MemoryStore, ReplicatedStore, SharedStore};
