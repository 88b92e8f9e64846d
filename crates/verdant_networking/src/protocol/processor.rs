//! # Protocol Processor
//!
//! Routes decoded frames into the state store. The processor is the only
//! writer of the store during a session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use verdant_core::StateStore;

use crate::protocol::messages::{decode, Inbound, Outbound};
use crate::stats::LinkStats;

/// Pings kept waiting for a pong before the oldest are forgotten.
const MAX_OUTSTANDING_PINGS: usize = 64;

/// Issues ping ids and matches pongs to them.
#[derive(Debug, Default)]
pub struct PingTracker {
    next_id: AtomicU64,
    outstanding: Mutex<HashMap<u64, Instant>>,
}

impl PingTracker {
    /// Creates a tracker starting at id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next ping id and records its send time.
    pub fn issue(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut outstanding = self.outstanding.lock();
        if outstanding.len() >= MAX_OUTSTANDING_PINGS {
            if let Some(oldest) = outstanding.keys().min().copied() {
                outstanding.remove(&oldest);
            }
        }
        outstanding.insert(id, Instant::now());
        id
    }

    /// Round trip of the ping answered by `id`, if it was ours.
    pub fn complete(&self, id: &Value) -> Option<Duration> {
        let id = id.as_u64()?;
        self.outstanding.lock().remove(&id).map(|sent| sent.elapsed())
    }

    /// Forgets every outstanding ping.
    pub fn clear(&self) {
        self.outstanding.lock().clear();
    }
}

/// Applies inbound frames to the store.
#[derive(Clone, Debug)]
pub struct ProtocolProcessor {
    store: Arc<StateStore>,
    pings: Arc<PingTracker>,
    stats: Arc<LinkStats>,
}

impl ProtocolProcessor {
    /// Creates a processor writing into `store`.
    #[must_use]
    pub fn new(store: Arc<StateStore>, pings: Arc<PingTracker>, stats: Arc<LinkStats>) -> Self {
        Self { store, pings, stats }
    }

    /// Decodes and dispatches one text frame.
    ///
    /// Undecodable frames are logged and dropped.
    pub fn handle_text(&self, raw: &str) -> Option<Outbound> {
        match decode(raw) {
            Ok(inbound) => self.dispatch(inbound),
            Err(error) => {
                self.stats.record_decode_error();
                tracing::warn!("discarding inbound frame: {}", error);
                None
            }
        }
    }

    /// Applies one decoded frame. Returns the reply to send, if any.
    pub fn dispatch(&self, inbound: Inbound) -> Option<Outbound> {
        match inbound {
            Inbound::Welcome {
                player_id,
                room_id,
                full_state,
            } => {
                tracing::info!(
                    "welcome (player {}, room {})",
                    player_id.as_deref().unwrap_or("?"),
                    room_id.as_deref().unwrap_or("?")
                );
                self.store.set_identity(player_id, room_id);
                if let Some(tree) = full_state {
                    self.store.apply_full(tree);
                }
                None
            }
            Inbound::FullState(tree) => {
                self.store.apply_full(tree);
                None
            }
            Inbound::PartialState { ops, dropped } => {
                let report = self.store.apply_patch(&ops);
                self.stats.record_patches(report.applied as u64, (report.skipped.len() + dropped) as u64);
                None
            }
            Inbound::Ping { id } => {
                self.stats.record_ping_received();
                Some(Outbound::Pong { id })
            }
            Inbound::Pong { id } => {
                self.stats.record_pong_received();
                if let Some(rtt) = self.pings.complete(&id) {
                    self.stats.record_rtt(rtt);
                    tracing::trace!("pong {} after {:?}", id, rtt);
                }
                None
            }
            Inbound::Other { kind } => {
                tracing::debug!("ignoring {} frame", kind);
                None
            }
        }
    }
}
