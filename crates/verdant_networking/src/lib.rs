//! # VERDANT Networking
//!
//! Keeps the bot connected to one room and the store in sync with it.
//!
//! ## Architecture
//!
//! - **Protocol**: JSON envelopes, decoded into [`Inbound`] and encoded from [`Outbound`]
//! - **Transport**: a [`Connector`] opens a [`Link`]; [`WsConnector`] does it over WSS
//! - **Connection**: [`ConnectionManager`] runs auth, room search, the session and backoff
//! - **Tasks**: [`SessionTask`]s run while connected and stop with the session
//!
//! ```text
//!   socket ──► Link.rx ──► ProtocolProcessor ──► StateStore
//!   socket ◄── Link.tx ◄── writer task ◄── Outbox ◄── SessionTask::tick
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use verdant_networking::{ConnectionManager, ConnectionSettings, Credential, WsConnector};
//!
//! let connector = Arc::new(WsConnector::new(config.server.clone()));
//! let settings = ConnectionSettings::from_config(&config, None);
//! let manager = ConnectionManager::new(connector, settings, store, Credential::new(cookies));
//! manager.run().await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod connection;
pub mod error;
pub mod journal;
pub mod protocol;
pub mod stats;
pub mod transport;

// Re-exports for convenience
pub use connection::{
    Backoff, ConnectionManager, ConnectionSettings, ConnectionState, JoinRules, Outbox, SessionTask,
    TaskContext, TaskError,
};
pub use error::{ConnectionError, ConnectionResult, ProtocolError};
pub use journal::{Direction, JournalEntry, JournalReader, MessageJournal};
pub use protocol::{decode, Inbound, Outbound, PingTracker, ProtocolProcessor};
pub use stats::{LinkStats, LinkStatsSnapshot};
pub use transport::{Connector, Credential, Link, WsConnector, LINK_CAPACITY};
