//! # Transport Layer
//!
//! The session never sees sockets. It talks to a [`Link`]: a pair of text
//! channels pumped by whatever [`Connector`] opened it.
//!
//! ```text
//!   Session ──tx──► [mpsc] ──► pump ──► socket
//!   Session ◄──rx── [mpsc] ◄── pump ◄── socket
//! ```
//!
//! Dropping the `Link` closes both directions.

pub mod ws;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::ConnectionResult;

pub use ws::WsConnector;

/// Default capacity of each link direction.
pub const LINK_CAPACITY: usize = 256;

/// Bidirectional text channel to one room.
#[derive(Debug)]
pub struct Link {
    /// Frames to the server.
    pub tx: mpsc::Sender<String>,
    /// Frames from the server.
    pub rx: mpsc::Receiver<String>,
}

impl Link {
    /// Two connected ends: the first for the bot, the second for the peer.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (to_peer, from_bot) = mpsc::channel(capacity);
        let (to_bot, from_peer) = mpsc::channel(capacity);
        (
            Self {
                tx: to_peer,
                rx: from_peer,
            },
            Self {
                tx: to_bot,
                rx: from_bot,
            },
        )
    }
}

/// Session credential: the cookie string sent to the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credential {
    /// `name=value; name=value` cookie header.
    pub cookies: String,
}

impl Credential {
    /// Wraps a cookie string.
    #[must_use]
    pub fn new(cookies: impl Into<String>) -> Self {
        Self {
            cookies: cookies.into(),
        }
    }
}

/// Opens links to rooms.
pub trait Connector: Send + Sync {
    /// Checks the credential against `room`, returning a refreshed one.
    fn authenticate<'a>(
        &'a self,
        room: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Credential>>;

    /// Opens a link to `room` as `player_id`.
    fn open<'a>(
        &'a self,
        room: &'a str,
        player_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Link>>;
}
