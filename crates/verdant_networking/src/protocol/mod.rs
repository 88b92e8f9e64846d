//! # Protocol
//!
//! JSON envelope codec and the processor feeding the state store.
//!
//! ## Frame Flow
//!
//! ```text
//! text frame ─► decode() ─► Inbound ─► ProtocolProcessor::dispatch ─► StateStore
//!                                             │
//!                                             └─► Option<Outbound> (Pong echo)
//! ```

pub mod messages;
pub mod processor;

pub use messages::{decode, is_text_ping, Inbound, Outbound, ROOM_SCOPE, TEXT_PING, TEXT_PONG};
pub use processor::{PingTracker, ProtocolProcessor};
