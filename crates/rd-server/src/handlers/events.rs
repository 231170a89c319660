use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use rd_broadcast::replay::{validate_tail, ReplayOptions};
use rd_broadcast::ReplayItem;
use rd_core::model::ReplayFormat;
use rd_core::RunId;

use crate::dto::EventsQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let tail = validate_tail(query.tail).map_err(ApiError)?;
    let replay_format = query.replay_format.unwrap_or(ReplayFormat::Auto);

    let source = state.run_manager.events_source(run_id, replay_format).await?;
    let options = ReplayOptions {
        replay: query.replay,
        follow: query.follow,
        tail,
    };
    let live = query.follow.then_some(source.live);
    let replay = rd_broadcast::replay::replay_stream(source.run_meta, source.history, source.terminal, live, options);

    let sse_stream = replay.filter_map(|item| async move {
        match item {
            ReplayItem::Envelope(envelope) => {
                let data = serde_json::to_string(&envelope.payload).unwrap_or_default();
                Some(Ok(Event::default().event(envelope.kind.sse_name()).data(data)))
            }
            ReplayItem::SlowConsumer => {
                let data = serde_json::json!({ "error": "slow_consumer" }).to_string();
                Some(Ok(Event::default().event("error").data(data)))
            }
        }
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
