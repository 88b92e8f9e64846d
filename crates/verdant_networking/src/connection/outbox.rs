//! # Outbox
//!
//! Policies queue commands through a cloneable [`Outbox`]. One writer task
//! per session drains it into the link, so frames never interleave.
//!
//! The outbox is attached only while the connection is `Connected`; any
//! other time `send` fails fast with [`ConnectionError::NotConnected`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{ConnectionError, ConnectionResult};
use crate::journal::{Direction, MessageJournal};
use crate::protocol::Outbound;
use crate::stats::LinkStats;

/// Cloneable handle for queuing outbound commands.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Outbound>>>>,
}

impl Outbox {
    /// Creates a detached outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an outbox that is always attached to the returned receiver.
    ///
    /// Useful for driving session tasks without a server.
    #[must_use]
    pub fn loopback() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let outbox = Self::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        outbox.attach(sender);
        (outbox, receiver)
    }

    pub(crate) fn attach(&self, sender: mpsc::UnboundedSender<Outbound>) {
        *self.sender.lock() = Some(sender);
    }

    pub(crate) fn detach(&self) {
        self.sender.lock().take();
    }

    /// True while a session is accepting commands.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Queues a command for the current session.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] when no session is active.
    pub fn send(&self, message: Outbound) -> ConnectionResult<()> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(ConnectionError::NotConnected)?;
        sender.send(message).map_err(|_| ConnectionError::NotConnected)
    }
}

/// Writes frames to one link, journaling and counting them.
#[derive(Clone, Debug)]
pub(crate) struct Wire {
    tx: mpsc::Sender<String>,
    journal: Option<MessageJournal>,
    stats: Arc<LinkStats>,
}

impl Wire {
    pub(crate) fn new(tx: mpsc::Sender<String>, journal: Option<MessageJournal>, stats: Arc<LinkStats>) -> Self {
        Self { tx, journal, stats }
    }

    pub(crate) async fn send_text(&self, text: String) -> ConnectionResult<()> {
        if let Some(journal) = &self.journal {
            journal.record(Direction::Sent, &text);
        }
        tracing::trace!("-> {}", text);
        self.tx
            .send(text)
            .await
            .map_err(|_| ConnectionError::Transport("link closed".into()))?;
        self.stats.record_sent();
        Ok(())
    }

    pub(crate) async fn send(&self, message: &Outbound) -> ConnectionResult<()> {
        self.send_text(message.encode()?).await?;
        match message {
            Outbound::Ping { .. } => self.stats.record_ping_sent(),
            Outbound::Pong { .. } => self.stats.record_pong_sent(),
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn received(&self, raw: &str) {
        if let Some(journal) = &self.journal {
            journal.record(Direction::Received, raw);
        }
        tracing::trace!("<- {}", raw);
        self.stats.record_received();
    }

    pub(crate) fn stats(&self) -> &LinkStats {
        &self.stats
    }
}
