use axum::extract::State;
use axum::Json;
use rd_executor::SupervisorState;

use crate::dto::{HealthResponse, InfoResponse};
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let codex_runtime = match state.supervisor.state() {
        SupervisorState::Ok => "ok",
        SupervisorState::Starting => "starting",
        SupervisorState::Faulted => "faulted",
        SupervisorState::Disabled => "disabled",
    };
    Json(HealthResponse { ok: true, codex_runtime })
}

pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        base_url: state.base_url.clone(),
        port: state.port,
        runner_id: state.runner_id(),
        version: state.version.clone(),
    })
}
