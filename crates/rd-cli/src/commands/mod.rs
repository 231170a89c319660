//! Per-command handlers. Each one resolves a target, builds a
//! `RunnerClient`, and renders its result through `crate::output`.

pub mod exec;
pub mod review;
pub mod run;
pub mod runs;
pub mod status;

use std::path::{Path, PathBuf};

use futures::StreamExt;
use rd_client::{discover, resolve_token, RunnerClient, ServerEvent, Target};
use rd_core::model::{EventKind, ReplayFormat};
use rd_core::RunId;

use crate::cli::{CommonOpts, OutputFormat, RunSelector};

/// Resolves `--cd`, discovers a runner, resolves a token, and builds a
/// client — the common setup every command needs before it can do
/// anything (spec §6, §4.7).
pub async fn connect(common: &CommonOpts) -> rd_core::Result<(RunnerClient, Target, PathBuf)> {
    let cwd = resolve_cwd(common.cd.as_deref())?;
    let target = discover(common.url.clone(), &cwd).await?;
    let token = resolve_token(common.token.clone(), &target).await;
    let client = RunnerClient::new(target.base_url.clone(), token);
    Ok((client, target, cwd))
}

pub fn resolve_cwd(explicit: Option<&Path>) -> rd_core::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir().map_err(rd_core::Error::from),
    }
}

/// Resolves `run attach|interrupt|stop|...`'s `<id>|--last` selector (spec
/// §6) against the runs known for `cwd`.
pub async fn resolve_run_id(client: &RunnerClient, selector: &RunSelector, cwd: &Path) -> rd_core::Result<RunId> {
    if selector.last {
        let cwd_str = cwd.to_string_lossy().to_string();
        let mut runs = client.list_runs(Some(&cwd_str), false).await?;
        runs.sort_by_key(|run| run.created_at);
        return runs
            .pop()
            .map(|run| run.id)
            .ok_or_else(|| rd_core::Error::not_found(format!("no runs found for {cwd_str}")));
    }

    let raw = selector
        .id
        .as_deref()
        .ok_or_else(|| rd_core::Error::invalid_request("a run id or --last is required"))?;
    raw.parse()
        .map_err(|_| rd_core::Error::invalid_request(format!("'{raw}' is not a valid run id")))
}

/// Replays and follows a run's event stream, rendering each envelope as it
/// arrives (spec §4.3). Returns once a terminal marker (`run.completed`,
/// `run.failed`, `run.interrupted`) or `run.paused` ends the segment.
pub async fn attach(client: &RunnerClient, id: RunId, format: OutputFormat) -> rd_core::Result<()> {
    let mut stream = client.stream_events(id, true, true, None, ReplayFormat::Auto)?;

    while let Some(event) = stream.next().await {
        let event = event?;
        render_event(format, &event);
        if is_segment_end(&event.kind) {
            break;
        }
    }
    Ok(())
}

fn is_segment_end(kind: &str) -> bool {
    [
        EventKind::RunCompleted.sse_name(),
        EventKind::RunFailed.sse_name(),
        EventKind::RunInterrupted.sse_name(),
        EventKind::RunPaused.sse_name(),
    ]
    .contains(&kind)
}

fn render_event(format: OutputFormat, event: &ServerEvent) {
    let human = || -> Option<String> {
        if event.kind == EventKind::RollupOutputLine.sse_name() || event.kind == EventKind::RollupAgentMessage.sse_name() {
            return event.payload.get("text").and_then(|v| v.as_str()).map(|text| text.trim_end_matches('\n').to_string());
        }
        if event.kind == EventKind::RunPaused.sse_name() {
            return Some("-- paused --".to_string());
        }
        if event.kind == EventKind::RunFailed.sse_name() {
            let reason = event.payload.get("error").and_then(|v| v.as_str()).unwrap_or("unknown error");
            return Some(format!("-- failed: {reason} --"));
        }
        if event.kind == EventKind::RunInterrupted.sse_name() {
            return Some("-- interrupted --".to_string());
        }
        if event.kind == EventKind::RunCompleted.sse_name() {
            return Some("-- completed --".to_string());
        }
        None
    };

    #[derive(serde::Serialize)]
    struct Wire<'a> {
        event: &'a str,
        payload: &'a serde_json::Value,
    }
    crate::output::print_stream_value(format, human, &Wire { event: &event.kind, payload: &event.payload });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_end_matches_every_terminal_and_pause_marker_only() {
        assert!(is_segment_end(EventKind::RunCompleted.sse_name()));
        assert!(is_segment_end(EventKind::RunFailed.sse_name()));
        assert!(is_segment_end(EventKind::RunInterrupted.sse_name()));
        assert!(is_segment_end(EventKind::RunPaused.sse_name()));
        assert!(!is_segment_end(EventKind::RunMeta.sse_name()));
        assert!(!is_segment_end(EventKind::RollupOutputLine.sse_name()));
        assert!(!is_segment_end(EventKind::Notification.sse_name()));
    }

    #[tokio::test]
    async fn resolve_run_id_rejects_a_malformed_explicit_id() {
        let client = RunnerClient::new("http://127.0.0.1:1", None);
        let selector = RunSelector { id: Some("not-a-uuid".to_string()), last: false };
        let err = resolve_run_id(&client, &selector, Path::new("/tmp")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn resolve_run_id_requires_either_an_id_or_last() {
        let client = RunnerClient::new("http://127.0.0.1:1", None);
        let selector = RunSelector { id: None, last: false };
        let err = resolve_run_id(&client, &selector, Path::new("/tmp")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }
}
