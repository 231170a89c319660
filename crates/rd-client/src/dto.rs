//! Wire bodies for the HTTP surface, mirrored from the server side (spec
//! §4.1, §6) but in the opposite serde direction: requests serialize here,
//! responses deserialize here.

use chrono::{DateTime, Utc};
use rd_core::model::{ReasoningEffort, ReviewDescriptor, RunKind, RunStatus};
use rd_core::{RunId, RunnerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub cwd: String,
    pub prompt: String,
    pub kind: RunKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_policy: Option<String>,
}

impl CreateRunRequest {
    pub fn new(cwd: String, prompt: String, kind: RunKind) -> Self {
        Self { cwd, prompt, kind, review: None, model: None, effort: None, sandbox: None, approval_policy: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: RunId,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SteerRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingSummaryDto {
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub codex_runtime: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub base_url: String,
    pub port: u16,
    pub runner_id: RunnerId,
    pub version: String,
}
