//! Per-session diff queue (§4.2 "Session").
//!
//! A `Session` holds the outbound `DiffPacket` queue for one client: diffs
//! accumulate in sequence order as the publisher emits them, and drain as
//! the connection's write pump acks delivered sequences. The queue has a
//! bounded retention limit; once full, the oldest unacked packet is
//! dropped to make room, and the drop is counted rather than silently
//! discarded.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::SessionError;
use crate::ids::Sequence;

/// One outbound frame awaiting delivery to a client (§3 "DiffPacket").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPacket {
    pub sequence: Sequence,
    pub payload: Vec<u8>,
}

/// Point-in-time counters for observability and tests (§4.2 "Stats").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub enqueued: u64,
    pub acked: u64,
    pub dropped: u64,
    pub pending: usize,
    pub next_sequence: Sequence,
    pub last_dropped_sequence: Option<Sequence>,
    pub last_snapshot_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<DiffPacket>,
    max_diffs: usize,
    next_sequence: Sequence,
    last_acked: Option<Sequence>,
    closed: bool,
    enqueued: u64,
    acked: u64,
    dropped: u64,
    last_dropped_sequence: Option<Sequence>,
    last_snapshot_time: Option<DateTime<Utc>>,
}

/// The per-client outbound diff queue. Cheap to clone (`Arc`-backed in
/// practice via `Manager`, which owns one `Session` per live client).
#[derive(Debug)]
pub struct Session {
    inner: Mutex<Inner>,
}

impl Session {
    /// Create a new, open session with the given retention limit.
    #[must_use]
    pub fn new(max_diffs: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                max_diffs,
                next_sequence: Sequence::zero(),
                last_acked: None,
                closed: false,
                enqueued: 0,
                acked: 0,
                dropped: 0,
                last_dropped_sequence: None,
                last_snapshot_time: None,
            }),
        }
    }

    /// Append a diff to the queue, assigning it the next sequence number.
    /// Returns the assigned sequence. If the queue is at capacity, the
    /// oldest pending packet is dropped and counted first.
    ///
    /// # Errors
    /// Returns `SessionError::Closed` if the session has been closed; the
    /// caller must treat this as a signal to tear down the connection.
    pub fn enqueue_diff(&self, payload: Vec<u8>) -> Result<Sequence, SessionError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SessionError::Closed);
        }
        if inner.queue.len() >= inner.max_diffs.max(1) {
            if let Some(dropped) = inner.queue.pop_front() {
                inner.dropped += 1;
                inner.last_dropped_sequence = Some(dropped.sequence);
            }
        }
        let sequence = inner.next_sequence.next();
        inner.next_sequence = sequence;
        inner.queue.push_back(DiffPacket { sequence, payload });
        inner.enqueued += 1;
        Ok(sequence)
    }

    /// Acknowledge delivery up to and including `sequence`: every packet at
    /// or below that sequence is removed from the queue. Acks below the
    /// high-water mark, or for sequences never enqueued, are no-ops.
    pub fn ack(&self, sequence: Sequence) {
        let mut inner = self.inner.lock();
        while let Some(front) = inner.queue.front() {
            if front.sequence.get() <= sequence.get() {
                inner.queue.pop_front();
                inner.acked += 1;
            } else {
                break;
            }
        }
        inner.last_acked = Some(match inner.last_acked {
            Some(prev) if prev.get() >= sequence.get() => prev,
            _ => sequence,
        });
    }

    /// All diffs currently queued for delivery, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<DiffPacket> {
        self.inner.lock().queue.iter().cloned().collect()
    }

    /// Diffs queued strictly after `since`, oldest first — used to resume a
    /// session after a reconnect with a known last-seen sequence.
    #[must_use]
    pub fn pending_since(&self, since: Sequence) -> Vec<DiffPacket> {
        self.inner
            .lock()
            .queue
            .iter()
            .filter(|p| p.sequence.get() > since.get())
            .cloned()
            .collect()
    }

    /// Change the retention limit. Shrinking the limit evicts the oldest
    /// packets (counted as drops) until the queue fits.
    pub fn set_max_diffs(&self, max_diffs: usize) {
        let mut inner = self.inner.lock();
        inner.max_diffs = max_diffs.max(1);
        while inner.queue.len() > inner.max_diffs {
            if let Some(dropped) = inner.queue.pop_front() {
                inner.dropped += 1;
                inner.last_dropped_sequence = Some(dropped.sequence);
            }
        }
    }

    /// Record that a fresh full snapshot (e.g. an initial `TreeSnapshot`)
    /// was just sent to this session's client.
    pub fn record_snapshot_sent(&self) {
        self.inner.lock().last_snapshot_time = Some(Utc::now());
    }

    /// Mark the session closed. Further `enqueue_diff` calls fail.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    #[must_use]
    pub fn last_sequence(&self) -> Sequence {
        self.inner.lock().next_sequence
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let inner = self.inner.lock();
        SessionStats {
            enqueued: inner.enqueued,
            acked: inner.acked,
            dropped: inner.dropped,
            pending: inner.queue.len(),
            next_sequence: inner.next_sequence,
            last_dropped_sequence: inner.last_dropped_sequence,
            last_snapshot_time: inner.last_snapshot_time,
        }
    }
}
