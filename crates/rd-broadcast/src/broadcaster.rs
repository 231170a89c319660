//! Per-run ring buffer + subscriber fan-out (spec §4.3, §5).
//!
//! Publish and subscribe are both serialized through one `std::sync::Mutex`
//! so a snapshot-then-subscribe pair can never race a concurrent publish:
//! either the publish lands before the lock is taken (and is in the
//! snapshot) or after it's released (and arrives on the fresh receiver).
//! There is no `.await` anywhere under the lock.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rd_core::model::{EventCursor, EventEnvelope, EventKind};
use tokio::sync::broadcast;

/// Ring buffer capacity per run. Generous enough to cover reconnects within
/// a live process without holding unbounded history in memory; anything
/// older than this is only recoverable from `events.jsonl`/`rollup.jsonl`.
const DEFAULT_CAPACITY: usize = 4096;

/// Broadcast channel capacity. Must be >= ring capacity or a slow subscriber
/// could lag past events still sitting in the ring, which would make a
/// snapshot-then-live handoff redeliver nothing instead of lagging cleanly.
const CHANNEL_CAPACITY: usize = DEFAULT_CAPACITY;

struct Inner {
    ring: VecDeque<EventEnvelope>,
    capacity: usize,
    sequence: u64,
    tx: broadcast::Sender<EventEnvelope>,
}

/// Owns one run's event history and live fan-out. A single producer
/// (the run's executor/`RunManager`) calls [`publish`](Self::publish); any
/// number of SSE subscribers call [`subscribe_with_snapshot`](Self::subscribe_with_snapshot).
pub struct RunBroadcaster {
    inner: Mutex<Inner>,
}

impl Default for RunBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RunBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(CHANNEL_CAPACITY));
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                sequence: 0,
                tx,
            }),
        }
    }

    /// Appends a new envelope, assigns it the next sequence number, and
    /// notifies any live subscribers. Never blocks on a subscriber: a full
    /// broadcast channel just drops the slowest receiver's oldest entries,
    /// which surfaces to that receiver as `Lagged` on its next `recv`.
    pub fn publish(&self, kind: EventKind, payload: serde_json::Value, now: DateTime<Utc>) -> EventEnvelope {
        let mut inner = self.inner.lock().expect("broadcaster mutex poisoned");
        let sequence = inner.sequence;
        inner.sequence += 1;
        let envelope = EventEnvelope {
            kind,
            created_at: now,
            sequence,
            payload,
        };
        inner.ring.push_back(envelope.clone());
        while inner.ring.len() > inner.capacity {
            inner.ring.pop_front();
        }
        let _ = inner.tx.send(envelope.clone());
        envelope
    }

    /// Seeds the ring and sequence counter from recovered history (used when
    /// a broadcaster is created for a run that already has persisted events,
    /// e.g. on daemon restart). Sequence continues from `max(history) + 1`.
    /// Does not broadcast — there are no live subscribers yet at seed time.
    pub fn seed(&self, history: Vec<EventEnvelope>) {
        let mut inner = self.inner.lock().expect("broadcaster mutex poisoned");
        let next_sequence = history.last().map(|e| e.sequence + 1).unwrap_or(0);
        inner.ring = history.into();
        while inner.ring.len() > inner.capacity {
            inner.ring.pop_front();
        }
        inner.sequence = inner.sequence.max(next_sequence);
    }

    /// Atomically takes a snapshot of the current ring contents and a fresh
    /// live receiver. No event can be missing from both or present in both.
    pub fn subscribe_with_snapshot(&self) -> (Vec<EventEnvelope>, broadcast::Receiver<EventEnvelope>) {
        let inner = self.inner.lock().expect("broadcaster mutex poisoned");
        let snapshot = inner.ring.iter().cloned().collect();
        let rx = inner.tx.subscribe();
        (snapshot, rx)
    }

    pub fn last_cursor(&self) -> Option<EventCursor> {
        let inner = self.inner.lock().expect("broadcaster mutex poisoned");
        inner.ring.back().map(|e| e.cursor())
    }

    pub fn tail(&self, n: usize) -> Vec<EventEnvelope> {
        let inner = self.inner.lock().expect("broadcaster mutex poisoned");
        let len = inner.ring.len();
        inner.ring.iter().skip(len.saturating_sub(n)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_at(b: &RunBroadcaster, seq_hint: &str) -> EventEnvelope {
        b.publish(EventKind::Notification, json!({ "hint": seq_hint }), Utc::now())
    }

    #[test]
    fn publish_assigns_monotonically_increasing_sequence() {
        let b = RunBroadcaster::new(8);
        let a = envelope_at(&b, "a");
        let c = envelope_at(&b, "b");
        assert_eq!(a.sequence, 0);
        assert_eq!(c.sequence, 1);
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let b = RunBroadcaster::new(2);
        envelope_at(&b, "a");
        envelope_at(&b, "b");
        envelope_at(&b, "c");
        let (snapshot, _rx) = b.subscribe_with_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].payload["hint"], "b");
        assert_eq!(snapshot[1].payload["hint"], "c");
    }

    #[test]
    fn snapshot_and_live_handoff_has_no_gap_or_duplicate() {
        let b = RunBroadcaster::new(8);
        envelope_at(&b, "historical");
        let (snapshot, mut rx) = b.subscribe_with_snapshot();
        assert_eq!(snapshot.len(), 1);
        envelope_at(&b, "live");
        let received = rx.try_recv().expect("live event should be delivered");
        assert_eq!(received.payload["hint"], "live");
        assert!(rx.try_recv().is_err());
    }

    /// E6: two envelopes sharing a `created_at` still land in publish order,
    /// broken by sequence rather than timestamp, and each appears exactly
    /// once in the ring.
    #[test]
    fn envelopes_sharing_a_timestamp_are_ordered_by_sequence_not_time() {
        let b = RunBroadcaster::new(8);
        let shared = Utc::now();
        let first = b.publish(EventKind::Notification, json!({ "hint": "first" }), shared);
        let injected = b.publish(EventKind::Notification, json!({ "hint": "injected" }), shared);
        assert_eq!(first.created_at, injected.created_at);
        assert!(injected.sequence > first.sequence);

        let (snapshot, _rx) = b.subscribe_with_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].payload["hint"], "first");
        assert_eq!(snapshot[1].payload["hint"], "injected");
    }

    #[test]
    fn seed_continues_sequence_counter_from_recovered_history() {
        let b = RunBroadcaster::new(8);
        b.seed(vec![EventEnvelope {
            kind: EventKind::Notification,
            created_at: Utc::now(),
            sequence: 41,
            payload: json!({}),
        }]);
        let next = envelope_at(&b, "after-seed");
        assert_eq!(next.sequence, 42);
    }

    #[test]
    fn tail_returns_last_n_in_order() {
        let b = RunBroadcaster::new(8);
        for hint in ["a", "b", "c"] {
            envelope_at(&b, hint);
        }
        let last_two = b.tail(2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].payload["hint"], "b");
        assert_eq!(last_two[1].payload["hint"], "c");
    }
}
