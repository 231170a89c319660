//! Wire request/response bodies for the HTTP surface (spec §4.1, §6).
//! `RunRecord` itself is also the `GET /v1/runs/{id}` response body — no
//! separate DTO for it.

use rd_core::model::{ReasoningEffort, ReplayFormat, ReviewDescriptor, RunKind};
use rd_core::RunId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub cwd: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_run_kind")]
    pub kind: RunKind,
    #[serde(default)]
    pub review: Option<ReviewDescriptor>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub effort: Option<ReasoningEffort>,
    #[serde(default)]
    pub sandbox: Option<String>,
    #[serde(default)]
    pub approval_policy: Option<String>,
}

fn default_run_kind() -> RunKind {
    RunKind::Exec
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: RunId,
    pub status: rd_core::model::RunStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub effort: Option<ReasoningEffort>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteerRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsQuery {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub tail_events: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingSummariesQuery {
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub tail_events: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingSummaryDto {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    #[serde(default = "default_true")]
    pub replay: bool,
    #[serde(default = "default_true")]
    pub follow: bool,
    #[serde(default)]
    pub tail: Option<i64>,
    #[serde(default)]
    pub replay_format: Option<ReplayFormat>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub codex_runtime: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub base_url: String,
    pub port: u16,
    pub runner_id: rd_core::RunnerId,
    pub version: String,
}
