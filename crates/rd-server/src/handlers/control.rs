use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rd_core::model::RunRecord;
use rd_core::RunId;

use crate::dto::{ResumeRequest, SteerRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn interrupt_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<StatusCode> {
    state.run_manager.interrupt(run_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<StatusCode> {
    state.run_manager.stop(run_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(req): Json<ResumeRequest>,
) -> ApiResult<Json<RunRecord>> {
    let record = state.run_manager.resume(run_id, req).await?;
    Ok(Json(record))
}

pub async fn steer_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(req): Json<SteerRequest>,
) -> ApiResult<StatusCode> {
    state.run_manager.steer(run_id, req.prompt).await?;
    Ok(StatusCode::ACCEPTED)
}
