//! Durable data model: run records, event envelopes, rollup records,
//! identity, and the daemon runtime descriptor (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RunId, RunnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Exec,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    Exec,
    Appserver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDelivery {
    Inline,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDescriptor {
    pub uncommitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub extra_options: Vec<String>,
    pub mode: ReviewMode,
    pub delivery: ReviewDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Run lifecycle states (spec §4.2). `Queued` is traversed immediately on
/// dispatch in practice, but is a real, observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Paused,
    Succeeded,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Interrupted
        )
    }
}

/// The durable record of one run (spec §3). `run.json` on disk is this
/// struct serialized whole; fields named immutable in the spec are never
/// mutated in place once written (identifier, created_at, cwd, prompt, kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    pub created_at: DateTime<Utc>,
    pub cwd: String,
    pub prompt: String,
    pub kind: RunKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    pub sandbox: String,
    pub approval_policy: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notification_at: Option<DateTime<Utc>>,
    pub events_log_path: String,
    pub rollup_log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fixed SSE/event-kind vocabulary (spec §4.1, §6). `Notification` carries
/// the raw `codex.notification` kind string from the agent in `payload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    #[serde(rename = "run.meta")]
    RunMeta,
    #[serde(rename = "codex.rollup.outputLine")]
    RollupOutputLine,
    #[serde(rename = "codex.rollup.agentMessage")]
    RollupAgentMessage,
    #[serde(rename = "codex.notification")]
    Notification,
    #[serde(rename = "run.paused")]
    RunPaused,
    #[serde(rename = "run.completed")]
    RunCompleted,
    #[serde(rename = "run.failed")]
    RunFailed,
    #[serde(rename = "run.interrupted")]
    RunInterrupted,
}

impl EventKind {
    /// Name as it appears after `event:` in the SSE frame.
    pub fn sse_name(self) -> &'static str {
        match self {
            EventKind::RunMeta => "run.meta",
            EventKind::RollupOutputLine => "codex.rollup.outputLine",
            EventKind::RollupAgentMessage => "codex.rollup.agentMessage",
            EventKind::Notification => "codex.notification",
            EventKind::RunPaused => "run.paused",
            EventKind::RunCompleted => "run.completed",
            EventKind::RunFailed => "run.failed",
            EventKind::RunInterrupted => "run.interrupted",
        }
    }

    /// The terminal-category markers that end SSE replay (spec §4.3 rule 7).
    pub fn is_terminal_marker(self) -> bool {
        matches!(
            self,
            EventKind::RunCompleted | EventKind::RunFailed | EventKind::RunInterrupted
        )
    }

    /// `run.paused` ends a *live* stream segment but must not be treated as
    /// the final word during replay if a later resume supersedes it (spec
    /// §4.3 rule 7) — callers distinguish this from `is_terminal_marker`.
    pub fn is_pause_marker(self) -> bool {
        matches!(self, EventKind::RunPaused)
    }
}

/// A subscriber's replay cursor. Ties in `created_at` are broken by
/// `sequence`, never by timestamp alone (spec §4.3, testable property 7 aka
/// E6): two envelopes sharing a timestamp are still totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

/// One entry in a run's event buffer / `events.jsonl` (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupKind {
    OutputLine,
    AgentMessage,
}

/// One entry in a run's `rollup.jsonl` (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupRecord {
    #[serde(rename = "type")]
    pub kind: RollupKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_with_newline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_control: Option<bool>,
}

/// `replayFormat` query parameter on `GET /v1/runs/{id}/events` (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFormat {
    Auto,
    Raw,
    Rollup,
}

/// The two concrete formats `Auto` resolves to (spec §4.3 rule 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedReplayFormat {
    Raw,
    Rollup,
}

impl ReplayFormat {
    /// `auto` prefers `raw` when raw events are persisted for this run,
    /// otherwise falls back to `rollup`.
    pub fn resolve(self, raw_persisted: bool) -> ResolvedReplayFormat {
        match self {
            ReplayFormat::Raw => ResolvedReplayFormat::Raw,
            ReplayFormat::Rollup => ResolvedReplayFormat::Rollup,
            ReplayFormat::Auto => {
                if raw_persisted {
                    ResolvedReplayFormat::Raw
                } else {
                    ResolvedReplayFormat::Rollup
                }
            }
        }
    }
}

/// Per-state-directory identity record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub runner_id: RunnerId,
    pub token: String,
}

/// `<stateDir>/runs/index.jsonl` entry (spec §4.6):
/// `RunIndexEntry{runId, createdAt, cwd, relativeDir}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIndexEntry {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub cwd: String,
    pub relative_dir: String,
}

/// The atomically-written discovery file (spec §3, §6):
/// `{baseUrl, listen, port, pid, startedAtUtc, stateDir, version}`.
/// Deliberately has no token field; clients must read the identity file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRuntimeDescriptor {
    pub base_url: String,
    pub listen: String,
    pub port: u16,
    pub pid: u32,
    pub started_at_utc: DateTime<Utc>,
    pub state_dir: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_sse_names() {
        let kinds = [
            EventKind::RunMeta,
            EventKind::RollupOutputLine,
            EventKind::RollupAgentMessage,
            EventKind::Notification,
            EventKind::RunPaused,
            EventKind::RunCompleted,
            EventKind::RunFailed,
            EventKind::RunInterrupted,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.sse_name()));
        }
    }

    #[test]
    fn only_succeeded_failed_interrupted_are_terminal() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Interrupted.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
    }

    #[test]
    fn cursor_ordering_breaks_ties_by_sequence() {
        let t = Utc::now();
        let a = EventCursor {
            created_at: t,
            sequence: 1,
        };
        let b = EventCursor {
            created_at: t,
            sequence: 2,
        };
        assert!(a < b);
    }

    #[test]
    fn run_paused_is_not_a_terminal_marker() {
        assert!(!EventKind::RunPaused.is_terminal_marker());
        assert!(EventKind::RunPaused.is_pause_marker());
    }
}
