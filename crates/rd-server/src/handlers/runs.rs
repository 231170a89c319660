use axum::extract::{Path, Query, State};
use axum::Json;
use rd_core::model::RunRecord;
use rd_core::RunId;

use crate::dto::{CreateRunRequest, CreateRunResponse, ListRunsQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_run(State(state): State<AppState>, Json(req): Json<CreateRunRequest>) -> ApiResult<Json<CreateRunResponse>> {
    let record = state.run_manager.create_run(req).await?;
    Ok(Json(CreateRunResponse {
        run_id: record.id,
        status: record.status,
    }))
}

pub async fn list_runs(State(state): State<AppState>, Query(query): Query<ListRunsQuery>) -> ApiResult<Json<Vec<RunRecord>>> {
    let runs = state.run_manager.list_runs(query.cwd, query.all).await?;
    Ok(Json(runs))
}

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<Json<RunRecord>> {
    let record = state.run_manager.get_run(run_id).await?;
    Ok(Json(record))
}
