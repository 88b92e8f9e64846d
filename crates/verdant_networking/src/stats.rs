//! # Link Statistics
//!
//! Lock-free counters shared by the reader, the writer and the keepalive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const NO_RTT: u64 = u64::MAX;

/// Live counters.
#[derive(Debug)]
pub struct LinkStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    pings_sent: AtomicU64,
    pings_received: AtomicU64,
    pongs_sent: AtomicU64,
    pongs_received: AtomicU64,
    patches_applied: AtomicU64,
    patches_skipped: AtomicU64,
    decode_errors: AtomicU64,
    sessions: AtomicU64,
    last_rtt_us: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    /// Frames written to the link.
    pub frames_sent: u64,
    /// Frames read from the link.
    pub frames_received: u64,
    /// Pings we sent.
    pub pings_sent: u64,
    /// Pings the server sent.
    pub pings_received: u64,
    /// Pongs we sent.
    pub pongs_sent: u64,
    /// Pongs the server sent.
    pub pongs_received: u64,
    /// Patch ops applied.
    pub patches_applied: u64,
    /// Patch ops skipped or malformed.
    pub patches_skipped: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Sessions established.
    pub sessions: u64,
    /// Most recent ping round trip.
    pub last_rtt: Option<Duration>,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            pings_received: AtomicU64::new(0),
            pongs_sent: AtomicU64::new(0),
            pongs_received: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
            patches_skipped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            sessions: AtomicU64::new(0),
            last_rtt_us: AtomicU64::new(NO_RTT),
        }
    }
}

impl LinkStats {
    #[inline]
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// One frame written.
    pub fn record_sent(&self) {
        Self::bump(&self.frames_sent, 1);
    }

    /// One frame read.
    pub fn record_received(&self) {
        Self::bump(&self.frames_received, 1);
    }

    /// One ping sent.
    pub fn record_ping_sent(&self) {
        Self::bump(&self.pings_sent, 1);
    }

    /// One server ping seen.
    pub fn record_ping_received(&self) {
        Self::bump(&self.pings_received, 1);
    }

    /// One pong sent.
    pub fn record_pong_sent(&self) {
        Self::bump(&self.pongs_sent, 1);
    }

    /// One server pong seen.
    pub fn record_pong_received(&self) {
        Self::bump(&self.pongs_received, 1);
    }

    /// Outcome of one patch batch.
    pub fn record_patches(&self, applied: u64, skipped: u64) {
        Self::bump(&self.patches_applied, applied);
        Self::bump(&self.patches_skipped, skipped);
    }

    /// One undecodable frame.
    pub fn record_decode_error(&self) {
        Self::bump(&self.decode_errors, 1);
    }

    /// One session established.
    pub fn record_session(&self) {
        Self::bump(&self.sessions, 1);
    }

    /// Latest round trip.
    pub fn record_rtt(&self, rtt: Duration) {
        let micros = u64::try_from(rtt.as_micros()).unwrap_or(NO_RTT - 1);
        self.last_rtt_us.store(micros, Ordering::Relaxed);
    }

    /// Copies every counter.
    #[must_use]
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let rtt = load(&self.last_rtt_us);
        LinkStatsSnapshot {
            frames_sent: load(&self.frames_sent),
            frames_received: load(&self.frames_received),
            pings_sent: load(&self.pings_sent),
            pings_received: load(&self.pings_received),
            pongs_sent: load(&self.pongs_sent),
            pongs_received: load(&self.pongs_received),
            patches_applied: load(&self.patches_applied),
            patches_skipped: load(&self.patches_skipped),
            decode_errors: load(&self.decode_errors),
            sessions: load(&self.sessions),
            last_rtt: (rtt != NO_RTT).then(|| Duration::from_micros(rtt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = LinkStats::default();
        stats.record_sent();
        stats.record_sent();
        stats.record_patches(3, 1);
        stats.record_rtt(Duration::from_millis(12));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!((snapshot.patches_applied, snapshot.patches_skipped), (3, 1));
        assert_eq!(snapshot.last_rtt, Some(Duration::from_millis(12)));
        assert_eq!(LinkStats::default().snapshot().last_rtt, None);
    }
}
