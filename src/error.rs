//! Error taxonomy for the session operation surface.
//!
//! Every error is surfaced synchronously to the caller of the triggering
//! operation; nothing is retried automatically. Throttled publish writes are
//! fire-and-forget and never reach this layer (failures are logged and
//! swallowed), relying on listener replay to reconcile state.

use thiserror::Error;

use crate::store::StoreError;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur in room, game, and race operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input rejected before any store call (empty name, bad room code, ...).
    #[error("invalid input: {0}")]
    Validation(String),
    /// Join attempted against a room that does not exist.
    #[error("room `{0}` not found")]
    NotFound(String),
    /// Join attempted while the room is already playing.
    #[error("game already in progress")]
    GameInProgress,
    /// Host tried to start while some non-host member is not ready.
    #[error("not all players are ready")]
    PlayersNotReady,
    /// A host-only operation was invoked by a non-host member.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation cannot be performed in the current phase.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A replicated document failed to encode or decode.
    #[error("encode/decode failed: {0}")]
    Codec(#[from] serde_json::Error),
    /// The store rejected an operation outright.
    #[error("store operation failed")]
    Store(#[from] StoreError),
}
