//! Thin HTTP/SSE wrapper over the `/v1` surface (spec §4.1). Grounded on
//! the teacher's `OctoClient`: a cheap-to-construct struct holding the base
//! url, an auth token, and a shared `reqwest::Client`, with one `with_auth`
//! helper threading the bearer header through every request builder.

use futures::{Stream, StreamExt};
use rd_core::model::{ReplayFormat, RunRecord};
use rd_core::RunId;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde::Serialize;

use crate::dto::{
    CreateRunRequest, CreateRunResponse, HealthResponse, InfoResponse, MessageDto, ResumeRequest, SteerRequest,
    ThinkingSummaryDto,
};
use crate::error::{ClientError, Result};

/// One envelope off the `/v1/runs/{id}/events` SSE stream: the event name
/// (`run.meta`, `codex.rollup.outputLine`, ...) and its raw JSON payload,
/// left unparsed since the CLI's rendering needs differ per command.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub kind: String,
    pub payload: serde_json::Value,
}

pub struct RunnerClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl RunnerClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { base_url: base_url.into(), token, http: reqwest::Client::new() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.send().await.map_err(|source| ClientError::Request { url: self.base_url.clone(), source })?;
        self.into_json(response).await
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = req.send().await.map_err(|source| ClientError::Request { url: self.base_url.clone(), source })?;
        self.check_status(response).await.map(|_| ())
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body.get("message").and_then(|v| v.as_str()).unwrap_or("request failed").to_string();
        Err(ClientError::Api { status, url, message })
    }

    async fn into_json<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;
        let url = response.url().to_string();
        response.json().await.map_err(|source| ClientError::Request { url, source })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send_json(self.with_auth(self.http.get(self.url("/v1/health")))).await
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        self.send_json(self.with_auth(self.http.get(self.url("/v1/info")))).await
    }

    pub async fn create_run(&self, req: &CreateRunRequest) -> Result<CreateRunResponse> {
        self.send_json(self.with_auth(self.http.post(self.url("/v1/runs")).json(req))).await
    }

    pub async fn list_runs(&self, cwd: Option<&str>, all: bool) -> Result<Vec<RunRecord>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(cwd) = cwd {
            query.push(("cwd", cwd.to_string()));
        }
        query.push(("all", all.to_string()));
        self.send_json(self.with_auth(self.http.get(self.url("/v1/runs")).query(&query))).await
    }

    pub async fn get_run(&self, id: RunId) -> Result<RunRecord> {
        self.send_json(self.with_auth(self.http.get(self.url(&format!("/v1/runs/{id}"))))).await
    }

    pub async fn interrupt(&self, id: RunId) -> Result<()> {
        self.send_empty(self.with_auth(self.http.post(self.url(&format!("/v1/runs/{id}/interrupt"))))).await
    }

    pub async fn stop(&self, id: RunId) -> Result<()> {
        self.send_empty(self.with_auth(self.http.post(self.url(&format!("/v1/runs/{id}/stop"))))).await
    }

    pub async fn resume(&self, id: RunId, req: &ResumeRequest) -> Result<RunRecord> {
        self.send_json(self.with_auth(self.http.post(self.url(&format!("/v1/runs/{id}/resume"))).json(req))).await
    }

    pub async fn steer(&self, id: RunId, prompt: String) -> Result<()> {
        let req = SteerRequest { prompt };
        self.send_empty(self.with_auth(self.http.post(self.url(&format!("/v1/runs/{id}/steer"))).json(&req))).await
    }

    pub async fn messages(&self, id: RunId, count: Option<usize>, tail_events: Option<usize>) -> Result<Vec<MessageDto>> {
        let query = CountQuery { count, tail_events };
        self.send_json(self.with_auth(self.http.get(self.url(&format!("/v1/runs/{id}/messages"))).query(&query))).await
    }

    pub async fn thinking_summaries(
        &self,
        id: RunId,
        timestamps: bool,
        tail_events: Option<usize>,
    ) -> Result<Vec<ThinkingSummaryDto>> {
        let query = ThinkingQuery { timestamps, tail_events };
        self.send_json(self.with_auth(self.http.get(self.url(&format!("/v1/runs/{id}/thinking-summaries"))).query(&query)))
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send_empty(self.with_auth(self.http.post(self.url("/v1/shutdown")))).await
    }

    /// Opens the SSE stream for a run (spec §4.3). `tail=None` omits the
    /// query parameter entirely rather than sending `tail=0`, which the
    /// server rejects outright.
    pub fn stream_events(
        &self,
        id: RunId,
        replay: bool,
        follow: bool,
        tail: Option<u64>,
        replay_format: ReplayFormat,
    ) -> Result<impl Stream<Item = Result<ServerEvent>>> {
        let query = EventsQuery { replay, follow, tail, replay_format };
        let request = self.with_auth(self.http.get(self.url(&format!("/v1/runs/{id}/events"))).query(&query));
        let source = EventSource::new(request)?;

        Ok(source.filter_map(|event| async move {
            match event {
                Ok(SseEvent::Open) => None,
                Ok(SseEvent::Message(message)) => {
                    let payload = serde_json::from_str(&message.data).unwrap_or(serde_json::Value::Null);
                    Some(Ok(ServerEvent { kind: message.event, payload }))
                }
                Err(reqwest_eventsource::Error::StreamEnded) => None,
                Err(err) => Some(Err(ClientError::Core(rd_core::Error::Exception(format!("event stream error: {err}"))))),
            }
        }))
    }
}

#[derive(Serialize)]
struct CountQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(rename = "tailEvents", skip_serializing_if = "Option::is_none")]
    tail_events: Option<usize>,
}

#[derive(Serialize)]
struct ThinkingQuery {
    timestamps: bool,
    #[serde(rename = "tailEvents", skip_serializing_if = "Option::is_none")]
    tail_events: Option<usize>,
}

#[derive(Serialize)]
struct EventsQuery {
    replay: bool,
    follow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tail: Option<u64>,
    #[serde(rename = "replayFormat")]
    replay_format: ReplayFormat,
}
