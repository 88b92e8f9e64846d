//! # Join Handshake
//!
//! ```text
//!   bot                                 room
//!    │── VoteForGame ──────────────────►│
//!    │── SetSelectedGame ──────────────►│
//!    │◄───────────────────── Welcome ───│   bounded by the join timeout
//!    │◄──────── FullState / PartialState│   bounded by the grace window
//!    │   accept: player placed in room  │
//!    │   reject: six gardens, none ours │
//! ```
//!
//! Frames seen here are kept and replayed through the processor once the
//! session starts, so no state is lost between join and session.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use verdant_core::tree;
use verdant_core::world::{garden_full_for, player_present};

use crate::connection::outbox::Wire;
use crate::error::{ConnectionError, ConnectionResult};
use crate::protocol::{decode, is_text_ping, Inbound, Outbound, TEXT_PONG};
use crate::transport::Link;

/// Time limits of one join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinRules {
    /// Wait for the welcome.
    pub join_timeout: Duration,
    /// Wait after the welcome for the player to show up.
    pub grace: Duration,
}

/// A room that accepted us.
#[derive(Debug)]
pub(crate) struct Joined {
    pub(crate) link: Link,
    pub(crate) room: String,
    pub(crate) replay: Vec<String>,
}

#[derive(Default)]
struct Scratch {
    tree: Option<Value>,
    welcome_player: Option<String>,
    frames: Vec<String>,
}

impl Scratch {
    /// Folds one frame in. Returns true for a welcome.
    fn absorb(&mut self, raw: String) -> bool {
        let mut welcome = false;
        match decode(&raw) {
            Ok(Inbound::Welcome {
                player_id,
                full_state,
                ..
            }) => {
                welcome = true;
                if player_id.is_some() {
                    self.welcome_player = player_id;
                }
                if full_state.is_some() {
                    self.tree = full_state;
                }
            }
            Ok(Inbound::FullState(tree)) => self.tree = Some(tree),
            Ok(Inbound::PartialState { ops, .. }) => {
                if let Some(doc) = self.tree.as_mut() {
                    for op in &ops {
                        if let Err(error) = tree::apply(doc, op) {
                            tracing::warn!("join: skipped patch op during handshake: {}", error);
                        }
                    }
                }
            }
            _ => {}
        }
        self.frames.push(raw);
        welcome
    }
}

/// Reads the next non-keepalive frame before `deadline`.
///
/// `Ok(None)` means the deadline passed.
async fn next_frame(link: &mut Link, wire: &Wire, deadline: Instant) -> ConnectionResult<Option<String>> {
    loop {
        let raw = match tokio::time::timeout_at(deadline, link.rx.recv()).await {
            Err(_) => return Ok(None),
            Ok(None) => {
                return Err(ConnectionError::Transport("link closed during join".into()));
            }
            Ok(Some(raw)) => raw,
        };
        wire.received(&raw);
        if is_text_ping(&raw) {
            wire.send_text(TEXT_PONG.to_owned()).await?;
            wire.stats().record_pong_sent();
            continue;
        }
        return Ok(Some(raw));
    }
}

/// Runs the join handshake on a freshly opened link.
pub(crate) async fn join(
    mut link: Link,
    wire: &Wire,
    room: &str,
    player_id: &str,
    rules: JoinRules,
) -> ConnectionResult<Joined> {
    wire.send(&Outbound::vote_for_game()).await?;
    wire.send(&Outbound::select_game()).await?;

    let mut scratch = Scratch::default();
    let welcome_deadline = Instant::now() + rules.join_timeout;
    loop {
        let Some(raw) = next_frame(&mut link, wire, welcome_deadline).await? else {
            return Err(ConnectionError::JoinTimeout { room: room.to_owned() });
        };
        if scratch.absorb(raw) {
            break;
        }
    }

    let accepted = |scratch: Scratch, link: Link| Joined {
        link,
        room: room.to_owned(),
        replay: scratch.frames,
    };

    let grace_deadline = Instant::now() + rules.grace;
    loop {
        if let Some(tree) = &scratch.tree {
            if garden_full_for(tree, player_id) {
                return Err(ConnectionError::GardenFull { room: room.to_owned() });
            }
            if player_present(tree, player_id) {
                tracing::debug!("player placed in {}", room);
                return Ok(accepted(scratch, link));
            }
        }
        match next_frame(&mut link, wire, grace_deadline).await? {
            Some(raw) => {
                scratch.absorb(raw);
            }
            None => break,
        }
    }

    if scratch.tree.is_none() && scratch.welcome_player.as_deref() == Some(player_id) {
        return Ok(accepted(scratch, link));
    }
    Err(ConnectionError::JoinRejected {
        room: room.to_owned(),
        reason: "player not placed in room".into(),
    })
}
