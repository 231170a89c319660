use axum::extract::{Path, Query, State};
use axum::Json;
use rd_core::RunId;

use crate::dto::{MessageDto, MessagesQuery, ThinkingSummariesQuery, ThinkingSummaryDto};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn messages(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<MessageDto>>> {
    let records = state.run_manager.messages(run_id, query.count, query.tail_events).await?;
    let messages = records
        .into_iter()
        .map(|r| MessageDto {
            text: r.text.unwrap_or_default(),
            created_at: r.created_at,
        })
        .collect();
    Ok(Json(messages))
}

pub async fn thinking_summaries(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Query(query): Query<ThinkingSummariesQuery>,
) -> ApiResult<Json<Vec<ThinkingSummaryDto>>> {
    let summaries = state.run_manager.thinking_summaries(run_id, query.tail_events).await?;
    let dtos = summaries
        .into_iter()
        .map(|s| ThinkingSummaryDto {
            text: s.text,
            created_at: if query.timestamps { Some(s.created_at) } else { None },
        })
        .collect();
    Ok(Json(dtos))
}
