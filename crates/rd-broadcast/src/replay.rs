//! SSE replay/follow/tail semantics over a run's event history (spec §4.3).
//!
//! Stays format-agnostic: yields [`ReplayItem`]s, not axum SSE frames, so
//! `rd-server` owns the HTTP-framework-specific mapping. Grounded on
//! `other_examples/93bd505a_orchard9-sdlc…routes-runs.rs.rs`'s `stream_run`
//! handler (`BroadcastStream::new(rx).filter_map(...)` turning `Lagged(n)`
//! into a terminal marker instead of silently resuming).

use futures::stream::{self, BoxStream, StreamExt};
use rd_core::model::{EventCursor, EventEnvelope};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// `replay`/`follow`/`tail` query parameters on `GET /v1/runs/{id}/events`.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub replay: bool,
    pub follow: bool,
    pub tail: Option<u64>,
}

/// One item produced by [`replay_stream`]. `SlowConsumer` is terminal: no
/// further items follow it.
#[derive(Debug, Clone)]
pub enum ReplayItem {
    Envelope(EventEnvelope),
    SlowConsumer,
}

/// `tail` must be a positive integer; `tail=0` and negative values are a
/// client error, not silently clamped (spec §4.1 query validation).
pub fn validate_tail(raw: Option<i64>) -> rd_core::Result<Option<u64>> {
    match raw {
        None => Ok(None),
        Some(n) if n > 0 => Ok(Some(n as u64)),
        Some(n) => Err(rd_core::Error::invalid_request(format!(
            "tail must be a positive integer, got {n}"
        ))),
    }
}

/// Builds the full replay/follow stream for one SSE subscriber.
///
/// `run_meta` is always emitted first. `history` is the already
/// format-filtered (raw or rollup) backlog, oldest first, sliced to the last
/// `tail` entries if set. `terminal` is the run's current terminal or pause
/// marker if it has already reached one; it's appended unless it's already
/// the last element of `history` (the common case, since lifecycle events
/// are themselves entries in the event buffer). `live` is `None` when
/// `follow=false`.
pub fn replay_stream(
    run_meta: EventEnvelope,
    mut history: Vec<EventEnvelope>,
    terminal: Option<EventEnvelope>,
    live: Option<broadcast::Receiver<EventEnvelope>>,
    options: ReplayOptions,
) -> BoxStream<'static, ReplayItem> {
    if !options.replay {
        history.clear();
    } else if let Some(tail) = options.tail {
        let tail = tail as usize;
        if history.len() > tail {
            let start = history.len() - tail;
            history.drain(0..start);
        }
        if let Some(term) = terminal {
            let already_present = history.last().map(|e| e.kind) == Some(term.kind);
            if !already_present {
                history.push(term);
            }
        }
    } else if let Some(term) = terminal {
        let already_present = history.last().map(|e| e.kind) == Some(term.kind);
        if !already_present {
            history.push(term);
        }
    }

    let cursor_floor = history
        .last()
        .map(|e| e.cursor())
        .unwrap_or_else(|| run_meta.cursor());

    let mut items = Vec::with_capacity(history.len() + 1);
    items.push(ReplayItem::Envelope(run_meta));
    items.extend(history.into_iter().map(ReplayItem::Envelope));
    let history_stream = stream::iter(items);

    match live {
        Some(rx) if options.follow => history_stream.chain(live_stream_after(rx, cursor_floor)).boxed(),
        _ => history_stream.boxed(),
    }
}

/// Live tail of the replay stream: delivers only envelopes strictly newer
/// than `floor` (defends against the rare double-delivery a tail-truncated
/// snapshot could otherwise cause), and turns `Lagged` into a single
/// `SlowConsumer` item followed by stream end, never a silent gap.
fn live_stream_after(rx: broadcast::Receiver<EventEnvelope>, floor: EventCursor) -> BoxStream<'static, ReplayItem> {
    let base = BroadcastStream::new(rx);
    stream::unfold((base, false), move |(mut base, done)| async move {
        if done {
            return None;
        }
        loop {
            match base.next().await {
                None => return None,
                Some(Ok(envelope)) => {
                    if envelope.cursor() > floor {
                        return Some((ReplayItem::Envelope(envelope), (base, false)));
                    }
                    continue;
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "SSE subscriber lagged, disconnecting as a slow consumer");
                    return Some((ReplayItem::SlowConsumer, (base, true)));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rd_core::model::EventKind;
    use serde_json::json;

    fn envelope(kind: EventKind, sequence: u64) -> EventEnvelope {
        EventEnvelope {
            kind,
            created_at: Utc::now(),
            sequence,
            payload: json!({}),
        }
    }

    #[test]
    fn validate_tail_rejects_zero_and_negative() {
        assert!(validate_tail(Some(0)).is_err());
        assert!(validate_tail(Some(-1)).is_err());
        assert_eq!(validate_tail(Some(5)).unwrap(), Some(5));
        assert_eq!(validate_tail(None).unwrap(), None);
    }

    #[tokio::test]
    async fn replay_false_emits_only_run_meta_when_not_following() {
        let meta = envelope(EventKind::RunMeta, 0);
        let history = vec![envelope(EventKind::Notification, 1)];
        let stream = replay_stream(
            meta,
            history,
            None,
            None,
            ReplayOptions {
                replay: false,
                follow: false,
                tail: None,
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], ReplayItem::Envelope(ref e) if e.kind == EventKind::RunMeta));
    }

    #[tokio::test]
    async fn replay_appends_terminal_marker_when_not_already_last() {
        let meta = envelope(EventKind::RunMeta, 0);
        let history = vec![envelope(EventKind::Notification, 1)];
        let terminal = envelope(EventKind::RunCompleted, 2);
        let stream = replay_stream(
            meta,
            history,
            Some(terminal),
            None,
            ReplayOptions {
                replay: true,
                follow: false,
                tail: None,
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], ReplayItem::Envelope(ref e) if e.kind == EventKind::RunCompleted));
    }

    #[tokio::test]
    async fn replay_does_not_duplicate_terminal_marker_already_present() {
        let meta = envelope(EventKind::RunMeta, 0);
        let terminal = envelope(EventKind::RunFailed, 1);
        let history = vec![terminal.clone()];
        let stream = replay_stream(
            meta,
            history,
            Some(terminal),
            None,
            ReplayOptions {
                replay: true,
                follow: false,
                tail: None,
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn tail_slices_to_last_n_historical_entries() {
        let meta = envelope(EventKind::RunMeta, 0);
        let history = vec![
            envelope(EventKind::Notification, 1),
            envelope(EventKind::Notification, 2),
            envelope(EventKind::Notification, 3),
        ];
        let stream = replay_stream(
            meta,
            history,
            None,
            None,
            ReplayOptions {
                replay: true,
                follow: false,
                tail: Some(2),
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], ReplayItem::Envelope(ref e) if e.sequence == 2));
        assert!(matches!(items[2], ReplayItem::Envelope(ref e) if e.sequence == 3));
    }

    #[tokio::test]
    async fn live_lag_yields_one_slow_consumer_item_then_ends() {
        let (tx, rx) = broadcast::channel(2);
        let meta = envelope(EventKind::RunMeta, 0);
        let stream = replay_stream(
            meta,
            vec![],
            None,
            Some(rx),
            ReplayOptions {
                replay: true,
                follow: true,
                tail: None,
            },
        );
        for i in 1..=5u64 {
            let _ = tx.send(envelope(EventKind::Notification, i));
        }
        drop(tx);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], ReplayItem::Envelope(ref e) if e.kind == EventKind::RunMeta));
        assert!(matches!(items[1], ReplayItem::SlowConsumer));
    }

    #[tokio::test]
    async fn live_events_after_floor_are_forwarded_in_order() {
        let (tx, rx) = broadcast::channel(8);
        let meta = envelope(EventKind::RunMeta, 0);
        let history = vec![envelope(EventKind::Notification, 1)];
        let stream = replay_stream(
            meta,
            history,
            None,
            Some(rx),
            ReplayOptions {
                replay: true,
                follow: true,
                tail: None,
            },
        );
        let _ = tx.send(envelope(EventKind::Notification, 2));
        drop(tx);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], ReplayItem::Envelope(ref e) if e.sequence == 2));
    }
}
