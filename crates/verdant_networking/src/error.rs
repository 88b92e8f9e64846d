//! # Networking Error Types

use thiserror::Error;

/// Result alias for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors decoding or encoding a frame.
///
/// A bad inbound frame is logged and discarded; it never ends a session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no string `type` field.
    #[error("frame has no `type` field")]
    MissingType,

    /// Outbound message could not be serialized.
    #[error("cannot encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors of the connection lifecycle.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// A send was attempted while no session is active. Transient.
    #[error("not connected")]
    NotConnected,

    /// The auth endpoint refused the credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Socket or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// No welcome within the join timeout.
    #[error("room {room} did not answer within the join timeout")]
    JoinTimeout {
        /// Room that timed out.
        room: String,
    },

    /// All six gardens of the room belong to other players.
    #[error("room {room} has no free garden")]
    GardenFull {
        /// Rejected room.
        room: String,
    },

    /// The room answered but never placed our player.
    #[error("room {room} rejected the join: {reason}")]
    JoinRejected {
        /// Rejected room.
        room: String,
        /// What was missing.
        reason: String,
    },

    /// Every candidate room failed.
    #[error("no room accepted the player ({tried} tried)")]
    NoRoomAvailable {
        /// Number of rooms tried.
        tried: usize,
    },

    /// Consecutive failures reached the configured limit.
    #[error("giving up after {attempts} failed connection attempts: {last}")]
    RetriesExhausted {
        /// Failed attempts in a row.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },

    /// Frame codec failure on the outbound side.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
