//! # Message Journal
//!
//! Every frame sent or received is offered to an optional journal channel.
//! The session never blocks on it: when the consumer falls behind, entries
//! are dropped and counted.
//!
//! ```text
//!   reader ──┐
//!   writer ──┼──> [bounded channel] ──> JournalReader (file sink, UI, tests)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Direction of a journaled frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Server to bot.
    Received,
    /// Bot to server.
    Sent,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "RECEIVED",
            Self::Sent => "SENT",
        })
    }
}

/// One journaled frame.
#[derive(Clone, Debug)]
pub struct JournalEntry {
    /// Wall-clock time the frame was seen.
    pub at: SystemTime,
    /// Direction.
    pub direction: Direction,
    /// Raw text.
    pub raw: String,
}

/// Producer side, cloned into the reader and writer.
#[derive(Clone, Debug)]
pub struct MessageJournal {
    sender: Sender<JournalEntry>,
    dropped: Arc<AtomicU64>,
}

/// Consumer side.
#[derive(Debug)]
pub struct JournalReader {
    receiver: Receiver<JournalEntry>,
}

impl MessageJournal {
    /// Creates a journal holding at most `capacity` pending entries.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, JournalReader) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            JournalReader { receiver },
        )
    }

    /// Offers a frame; never blocks.
    pub fn record(&self, direction: Direction, raw: &str) {
        let entry = JournalEntry {
            at: SystemTime::now(),
            direction,
            raw: raw.to_owned(),
        };
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Consumer gone; journaling is best effort.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Entries dropped because the consumer fell behind.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl JournalReader {
    /// Next entry, waiting at most `timeout`.
    ///
    /// Returns `Err(true)` once every producer is gone and the channel is
    /// drained, `Err(false)` on timeout.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<JournalEntry, bool> {
        self.receiver.recv_timeout(timeout).map_err(|error| match error {
            RecvTimeoutError::Disconnected => true,
            RecvTimeoutError::Timeout => false,
        })
    }

    /// Every entry currently queued.
    pub fn drain(&self) -> Vec<JournalEntry> {
        self.receiver.try_iter().collect()
    }
}
