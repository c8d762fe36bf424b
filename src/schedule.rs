//! Purpose: Decide when pending mutations get flushed to durable storage.
//! Exports: `CommitSchedule`, `MAX_PENDING_WRITES`, `MAX_FLUSH_INTERVAL`.
//! Role: Pure scheduler state owned by the store, mutated under its lock.
//! Invariants: A failed flush leaves the counters untouched so the caller can
//! retry; only `mark_flushed` resets them.
use std::time::{Duration, Instant};

/// Flush once more than this many mutations are pending.
pub const MAX_PENDING_WRITES: u64 = 16 * 1024;
/// Flush once this much time has passed since the last flush.
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct CommitSchedule {
    pending: u64,
    last_flush: Instant,
}

impl CommitSchedule {
    pub fn new(now: Instant) -> Self {
        Self {
            pending: 0,
            last_flush: now,
        }
    }

    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Count one mutation (insert, replace, or delete).
    pub fn record_write(&mut self) {
        self.pending += 1;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now > self.last_flush + MAX_FLUSH_INTERVAL || self.pending > MAX_PENDING_WRITES
    }

    /// Reset after a successful flush; returns what was flushed and how long
    /// the batch accumulated.
    pub fn mark_flushed(&mut self, now: Instant) -> (u64, Duration) {
        let flushed = self.pending;
        let elapsed = now.saturating_duration_since(self.last_flush);
        self.pending = 0;
        self.last_flush = now;
        (flushed, elapsed)
    }
}
