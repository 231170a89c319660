//! Owns run records, drives the lifecycle state machine, and coordinates
//! the executor, store, and broadcaster for every run (spec §4.2, §2's
//! "run manager" layer). One per server process.
//!
//! Concurrency: every run has its own `tokio::sync::Mutex<RunState>` —
//! an async mutex rather than `std::sync::Mutex` because transitions need
//! to stay held across the broadcaster publish *and* the run.json persist
//! that make up one logical transition (spec §5: "transitions are
//! serialized per run under a per-run mutex"). The spec's adjacent warning
//! ("no suspension point holds a per-run mutex across an await") is about
//! blocking mutexes starving the executor; an async mutex held briefly
//! across an await it owns is the correct primitive here, not a violation
//! of that rule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rd_broadcast::BroadcastRegistry;
use rd_core::model::{
    EventEnvelope, EventKind, ReplayFormat, ResolvedReplayFormat, RollupKind, RollupRecord, RunIndexEntry, RunRecord,
    RunStatus,
};
use rd_core::RunId;
use rd_executor::{ExecutorRunConfig, InterruptHandle, RunExecutionContext, RunExecutor, SteerHandle};
use rd_rollup::RollupEngine;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::dto::{CreateRunRequest, ResumeRequest};

/// Grace period an executor gets to honor `interrupt`/`stop` before the run
/// is force-marked `failed` (spec §5).
const CANCELLATION_GRACE: Duration = Duration::from_secs(5);

struct RunState {
    record: RunRecord,
    dir: PathBuf,
    rollup: RollupEngine,
    interrupt: Option<InterruptHandle>,
    steer: Option<SteerHandle>,
    /// Set by `interrupt`/`stop` while waiting for the executor to return;
    /// a naturally-returned `succeeded` still wins over it (open question
    /// in spec §9, resolved here as "whichever write lands first").
    pending_cancel: Option<RunStatus>,
}

pub struct EventsSource {
    pub run_meta: EventEnvelope,
    pub history: Vec<EventEnvelope>,
    pub terminal: Option<EventEnvelope>,
    pub live: broadcast::Receiver<EventEnvelope>,
}

pub struct RunManager {
    state_dir: PathBuf,
    persist_raw_events: bool,
    broadcasts: Arc<BroadcastRegistry>,
    executor: Arc<dyn RunExecutor>,
    runs: DashMap<RunId, Arc<Mutex<RunState>>>,
}

impl RunManager {
    pub fn new(
        state_dir: PathBuf,
        persist_raw_events: bool,
        broadcasts: Arc<BroadcastRegistry>,
        executor: Arc<dyn RunExecutor>,
    ) -> Self {
        Self {
            state_dir,
            persist_raw_events,
            broadcasts,
            executor,
            runs: DashMap::new(),
        }
    }

    pub async fn create_run(&self, req: CreateRunRequest) -> rd_core::Result<RunRecord> {
        if matches!(req.kind, rd_core::model::RunKind::Exec) && req.prompt.trim().is_empty() {
            return Err(rd_core::Error::invalid_request("prompt must not be empty"));
        }
        let cwd = rd_core::paths::normalize_cwd(std::path::Path::new(&req.cwd))?;
        if tokio::fs::metadata(&cwd).await.is_err() {
            return Err(rd_core::Error::invalid_request(format!("cwd does not exist: {cwd}")));
        }

        let id = RunId::new();
        let now = Utc::now();
        let record = RunRecord {
            id,
            created_at: now,
            cwd: cwd.clone(),
            prompt: req.prompt,
            kind: req.kind,
            review: req.review,
            model: req.model,
            effort: req.effort,
            sandbox: req.sandbox.unwrap_or_else(|| "workspace-write".to_string()),
            approval_policy: req.approval_policy.unwrap_or_else(|| "on-request".to_string()),
            status: RunStatus::Queued,
            thread_id: None,
            turn_id: None,
            last_notification_at: None,
            events_log_path: "events.jsonl".to_string(),
            rollup_log_path: "rollup.jsonl".to_string(),
            error: None,
        };

        let dir = rd_store::run_dir::create(&self.state_dir, &record).await?;
        rd_store::index::append(
            &self.state_dir,
            &RunIndexEntry {
                run_id: id,
                created_at: now,
                cwd,
                relative_dir: rd_store::run_dir::relative_dir(now, id),
            },
        )
        .await?;

        let broadcaster = self.broadcasts.get_or_create(id);
        broadcaster.publish(EventKind::RunMeta, serde_json::to_value(&record)?, now);

        let state = Arc::new(Mutex::new(RunState {
            record: record.clone(),
            dir,
            rollup: RollupEngine::new(),
            interrupt: None,
            steer: None,
            pending_cancel: None,
        }));
        self.runs.insert(id, state.clone());
        self.dispatch(state.clone());
        Ok(state.lock().await.record.clone())
    }

    pub async fn get_run(&self, id: RunId) -> rd_core::Result<RunRecord> {
        let state = self.get_state(id).await?;
        Ok(state.lock().await.record.clone())
    }

    pub async fn list_runs(&self, cwd: Option<String>, all: bool) -> rd_core::Result<Vec<RunRecord>> {
        let entries = rd_store::index::read_all(&self.state_dir).await?;
        let filter = match (&cwd, all) {
            (Some(raw), false) => Some(rd_core::paths::normalize_cwd(std::path::Path::new(raw))?),
            _ => None,
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(filter) = &filter {
                if !rd_core::paths::cwd_eq(&entry.cwd, filter) {
                    continue;
                }
            }
            if let Some(state) = self.runs.get(&entry.run_id) {
                out.push(state.lock().await.record.clone());
                continue;
            }
            let dir = self.state_dir.join("runs").join(&entry.relative_dir);
            match rd_store::run_dir::read_run_json(&dir).await {
                Ok(record) => out.push(record),
                Err(err) => tracing::warn!(%err, run_id = %entry.run_id, "skipping unreadable run in listing"),
            }
        }
        Ok(out)
    }

    pub async fn interrupt(&self, id: RunId) -> rd_core::Result<()> {
        self.request_cancel(id, RunStatus::Interrupted).await
    }

    pub async fn stop(&self, id: RunId) -> rd_core::Result<()> {
        self.request_cancel(id, RunStatus::Paused).await
    }

    async fn request_cancel(&self, id: RunId, target: RunStatus) -> rd_core::Result<()> {
        let state = self.get_state(id).await?;
        let interrupt = {
            let mut guard = state.lock().await;
            if guard.record.status != RunStatus::Running {
                return Err(rd_core::Error::invalid_state(format!(
                    "run is not running (status: {:?})",
                    guard.record.status
                )));
            }
            guard.pending_cancel = Some(target);
            guard.interrupt.clone()
        };
        if let Some(handle) = interrupt {
            handle.fire();
        }
        let broadcaster = self.broadcasts.get_or_create(id);
        tokio::spawn(escalate_after_grace(state, broadcaster));
        Ok(())
    }

    pub async fn resume(&self, id: RunId, req: ResumeRequest) -> rd_core::Result<RunRecord> {
        let state = self.get_state(id).await?;
        {
            let mut guard = state.lock().await;
            if guard.record.status != RunStatus::Paused {
                return Err(rd_core::Error::invalid_state(format!(
                    "cannot resume from status {:?}",
                    guard.record.status
                )));
            }
            if let Some(prompt) = req.prompt {
                guard.record.prompt = prompt;
            }
            if req.effort.is_some() {
                guard.record.effort = req.effort;
            }
            guard.record.turn_id = None;
            guard.record.error = None;
            guard.pending_cancel = None;
            guard.record.status = RunStatus::Queued;
            let dir = guard.dir.clone();
            let record = guard.record.clone();
            drop(guard);
            rd_store::run_dir::write_run_json(&dir, &record).await?;
        }
        self.dispatch(state.clone());
        Ok(state.lock().await.record.clone())
    }

    pub async fn steer(&self, id: RunId, text: String) -> rd_core::Result<()> {
        let state = self.get_state(id).await?;
        let handle = state.lock().await.steer.clone();
        match handle {
            Some(handle) if handle.is_registered() => {
                handle.fire(text);
                Ok(())
            }
            _ => Err(rd_core::Error::invalid_state("no active turn to steer")),
        }
    }

    pub async fn messages(&self, id: RunId, count: Option<usize>, tail_events: Option<usize>) -> rd_core::Result<Vec<RollupRecord>> {
        let state = self.get_state(id).await?;
        let dir = state.lock().await.dir.clone();
        let records = match tail_events {
            Some(k) => rd_store::run_dir::tail_rollup(&dir, k).await?,
            None => rd_store::run_dir::read_all_rollup(&dir).await?,
        };
        let mut messages: Vec<RollupRecord> = records.into_iter().filter(|r| r.kind == RollupKind::AgentMessage).collect();
        if let Some(n) = count {
            if messages.len() > n {
                let start = messages.len() - n;
                messages.drain(0..start);
            }
        }
        for message in &mut messages {
            if let Some(text) = message.text.take() {
                message.text = Some(rd_rollup::mojibake::repair(&text));
            }
        }
        Ok(messages)
    }

    pub async fn thinking_summaries(&self, id: RunId, tail_events: Option<usize>) -> rd_core::Result<Vec<rd_rollup::ThinkingSummary>> {
        let state = self.get_state(id).await?;
        let dir = state.lock().await.dir.clone();
        let records = match tail_events {
            Some(k) => rd_store::run_dir::tail_rollup(&dir, k).await?,
            None => rd_store::run_dir::read_all_rollup(&dir).await?,
        };
        Ok(rd_rollup::mine_thinking_summaries(&records))
    }

    pub async fn events_source(&self, id: RunId, replay_format: ReplayFormat) -> rd_core::Result<EventsSource> {
        let state = self.get_state(id).await?;
        let record = state.lock().await.record.clone();
        let broadcaster = self.broadcasts.get_or_create(id);
        ensure_seeded(&state, &broadcaster).await;

        let resolved = replay_format.resolve(self.persist_raw_events);
        let (snapshot, live) = broadcaster.subscribe_with_snapshot();
        let history = if resolved == ResolvedReplayFormat::Raw && !self.persist_raw_events {
            Vec::new()
        } else {
            snapshot.into_iter().filter(|e| kind_allowed(e.kind, resolved)).collect()
        };

        let run_meta = EventEnvelope {
            kind: EventKind::RunMeta,
            created_at: record.created_at,
            sequence: 0,
            payload: serde_json::to_value(&record)?,
        };
        Ok(EventsSource {
            run_meta,
            history,
            terminal: terminal_marker(&record),
            live,
        })
    }

    async fn get_state(&self, id: RunId) -> rd_core::Result<Arc<Mutex<RunState>>> {
        if let Some(existing) = self.runs.get(&id) {
            return Ok(existing.clone());
        }

        let entries = rd_store::index::read_all(&self.state_dir).await?;
        let entry = entries
            .into_iter()
            .find(|e| e.run_id == id)
            .ok_or_else(|| rd_core::Error::not_found(format!("run {id}")))?;
        let dir = self.state_dir.join("runs").join(&entry.relative_dir);
        let mut record = rd_store::run_dir::read_run_json(&dir).await?;

        // A run found on disk still marked `running` belonged to a process
        // that no longer exists — nothing will ever resume driving it.
        if record.status == RunStatus::Running {
            record.status = RunStatus::Paused;
            record.error = Some("runner restarted".to_string());
            let _ = rd_store::run_dir::write_run_json(&dir, &record).await;
        }

        let state = Arc::new(Mutex::new(RunState {
            record,
            dir,
            rollup: RollupEngine::new(),
            interrupt: None,
            steer: None,
            pending_cancel: None,
        }));
        Ok(self.runs.entry(id).or_insert(state).clone())
    }

    /// Spawns the task that drives one turn end-to-end: wires up the
    /// notify/set_ids/interrupt/steer callbacks, calls the executor, and
    /// finalizes the run's terminal status once it returns.
    fn dispatch(&self, state: Arc<Mutex<RunState>>) {
        let executor = self.executor.clone();
        let broadcasts = self.broadcasts.clone();
        let persist_raw_events = self.persist_raw_events;

        tokio::spawn(async move {
            let (cfg, dir, run_id) = {
                let mut guard = state.lock().await;
                guard.record.status = RunStatus::Running;
                let record = guard.record.clone();
                (
                    ExecutorRunConfig {
                        id: record.id,
                        cwd: record.cwd.clone(),
                        prompt: record.prompt.clone(),
                        kind: record.kind,
                        review: record.review.clone(),
                        model: record.model.clone(),
                        effort: record.effort,
                        sandbox: record.sandbox.clone(),
                        approval_policy: record.approval_policy.clone(),
                        thread_id: record.thread_id.clone(),
                    },
                    guard.dir.clone(),
                    record.id,
                )
            };
            {
                let record = state.lock().await.record.clone();
                let _ = rd_store::run_dir::write_run_json(&dir, &record).await;
            }

            let broadcaster = broadcasts.get_or_create(run_id);

            let (tx, rx) = mpsc::unbounded_channel::<WriterMsg>();
            let writer_handle = tokio::spawn(writer_loop(
                rx,
                state.clone(),
                broadcaster.clone(),
                persist_raw_events,
            ));

            let notify_tx = tx.clone();
            let notify = move |kind: String, payload: Value| {
                let _ = notify_tx.send(WriterMsg::Notification { kind, payload });
            };
            let set_ids_tx = tx.clone();
            let set_ids = move |thread_id: Option<String>, turn_id: Option<String>, rollout_path: Option<String>| {
                let _ = set_ids_tx.send(WriterMsg::SetIds {
                    thread_id,
                    turn_id,
                    rollout_path,
                });
            };
            drop(tx);

            let interrupt = InterruptHandle::new();
            let steer = SteerHandle::new();
            {
                let mut guard = state.lock().await;
                guard.interrupt = Some(interrupt.clone());
                guard.steer = Some(steer.clone());
            }

            let ctx = RunExecutionContext::new(cfg, notify, set_ids, interrupt, steer);
            let result = executor.execute(ctx).await;
            let _ = writer_handle.await;

            finalize(state, broadcaster, result).await;
        });
    }
}

enum WriterMsg {
    Notification {
        kind: String,
        payload: Value,
    },
    SetIds {
        thread_id: Option<String>,
        turn_id: Option<String>,
        rollout_path: Option<String>,
    },
}

/// Single-consumer actor processing one run's notifications in arrival
/// order — broadcasting and rolling each one up happens here, never in the
/// fire-and-forget `notify`/`set_ids` closures themselves, so sequence
/// numbers and rollup line ordering can never race each other.
async fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
    state: Arc<Mutex<RunState>>,
    broadcaster: Arc<rd_broadcast::RunBroadcaster>,
    persist_raw_events: bool,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Notification { kind, payload } => {
                let now = Utc::now();
                let envelope = broadcaster.publish(
                    EventKind::Notification,
                    serde_json::json!({ "kind": kind, "payload": payload }),
                    now,
                );
                if persist_raw_events {
                    let dir = state.lock().await.dir.clone();
                    if let Err(err) = rd_store::run_dir::append_event(&dir, &envelope).await {
                        tracing::warn!(%err, "failed to persist raw event, continuing without it");
                    }
                }

                let records = {
                    let mut guard = state.lock().await;
                    guard.record.last_notification_at = Some(now);
                    rollup_records_for(&mut guard.rollup, &kind, &payload, now)
                };
                if records.is_empty() {
                    continue;
                }
                let dir = state.lock().await.dir.clone();
                for record in records {
                    let event_kind = rollup_event_kind(record.kind);
                    if let Ok(payload) = serde_json::to_value(&record) {
                        broadcaster.publish(event_kind, payload, record.created_at);
                    }
                    if let Err(err) = rd_store::run_dir::append_rollup(&dir, &record).await {
                        tracing::warn!(%err, "failed to persist rollup record, continuing without it");
                    }
                }
            }
            WriterMsg::SetIds {
                thread_id,
                turn_id,
                rollout_path: _,
            } => {
                let (dir, record) = {
                    let mut guard = state.lock().await;
                    if thread_id.is_some() {
                        guard.record.thread_id = thread_id;
                    }
                    if turn_id.is_some() {
                        guard.record.turn_id = turn_id;
                    }
                    (guard.dir.clone(), guard.record.clone())
                };
                let _ = rd_store::run_dir::write_run_json(&dir, &record).await;
            }
        }
    }
}

fn rollup_records_for(engine: &mut RollupEngine, kind: &str, payload: &Value, now: chrono::DateTime<Utc>) -> Vec<RollupRecord> {
    match kind {
        "item/commandExecution/outputDelta" => {
            let delta = payload.get("delta").and_then(|v| v.as_str()).unwrap_or("");
            engine.push_delta(delta, now)
        }
        "item/completed" => {
            let item = payload.get("item");
            let is_agent_message = item.and_then(|i| i.get("type")).and_then(|v| v.as_str()) == Some("agentMessage");
            if is_agent_message {
                let text = item.and_then(|i| i.get("text")).and_then(|v| v.as_str()).unwrap_or("");
                vec![engine.agent_message(text, now)]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn rollup_event_kind(kind: RollupKind) -> EventKind {
    match kind {
        RollupKind::OutputLine => EventKind::RollupOutputLine,
        RollupKind::AgentMessage => EventKind::RollupAgentMessage,
    }
}

fn kind_allowed(kind: EventKind, resolved: ResolvedReplayFormat) -> bool {
    match kind {
        // Never replayed from the snapshot: `replay_stream` always prepends
        // its own explicit `run.meta` opening frame, so passing this one
        // through too would duplicate it.
        EventKind::RunMeta => false,
        EventKind::Notification => resolved == ResolvedReplayFormat::Raw,
        EventKind::RollupOutputLine | EventKind::RollupAgentMessage => resolved == ResolvedReplayFormat::Rollup,
        _ => true,
    }
}

fn terminal_marker(record: &RunRecord) -> Option<EventEnvelope> {
    let kind = match record.status {
        RunStatus::Succeeded => EventKind::RunCompleted,
        RunStatus::Failed => EventKind::RunFailed,
        RunStatus::Interrupted => EventKind::RunInterrupted,
        RunStatus::Paused => EventKind::RunPaused,
        RunStatus::Queued | RunStatus::Running => return None,
    };
    let payload = serde_json::to_value(record).unwrap_or(Value::Null);
    Some(EventEnvelope {
        kind,
        created_at: record.last_notification_at.unwrap_or(record.created_at),
        // No real notification will ever follow a terminal run again, so an
        // out-of-band high sequence can't collide with a live envelope.
        sequence: u64::MAX,
        payload,
    })
}

/// Seeds the broadcaster from disk once per process lifetime for a run
/// that predates this process (e.g. after a restart): without this, a
/// fresh `RunBroadcaster` has an empty ring and `replay=true` would see
/// nothing even though `rollup.jsonl`/`events.jsonl` has history.
async fn ensure_seeded(state: &Arc<Mutex<RunState>>, broadcaster: &rd_broadcast::RunBroadcaster) {
    if broadcaster.last_cursor().is_some() {
        return;
    }
    let dir = state.lock().await.dir.clone();
    let mut merged: Vec<EventEnvelope> = rd_store::run_dir::read_all_events(&dir).await.unwrap_or_default();
    if let Ok(rollups) = rd_store::run_dir::read_all_rollup(&dir).await {
        for record in rollups {
            if let Ok(payload) = serde_json::to_value(&record) {
                merged.push(EventEnvelope {
                    kind: rollup_event_kind(record.kind),
                    created_at: record.created_at,
                    sequence: 0,
                    payload,
                });
            }
        }
    }
    if merged.is_empty() {
        return;
    }
    merged.sort_by_key(|e| e.created_at);
    for (index, envelope) in merged.iter_mut().enumerate() {
        envelope.sequence = index as u64;
    }
    broadcaster.seed(merged);
}

/// Runs once the executor returns: flushes any held rollup partial,
/// resolves the final status (a pending cancel loses to a natural
/// `succeeded` — spec §9's open question, resolved as first-write-wins),
/// and publishes the lifecycle marker before releasing the run's mutex so
/// no reader can observe the new status before the event is in the buffer.
async fn finalize(
    state: Arc<Mutex<RunState>>,
    broadcaster: Arc<rd_broadcast::RunBroadcaster>,
    result: rd_executor::RunExecutionResult,
) {
    let mut guard = state.lock().await;
    if guard.record.status.is_terminal() {
        // The grace-period escalation already wrote a terminal status.
        return;
    }

    let now = Utc::now();
    if let Some(partial) = guard.rollup.finish(now) {
        let dir = guard.dir.clone();
        if let Ok(payload) = serde_json::to_value(&partial) {
            broadcaster.publish(rollup_event_kind(partial.kind), payload, partial.created_at);
        }
        let _ = rd_store::run_dir::append_rollup(&dir, &partial).await;
    }

    let final_status = match guard.pending_cancel.take() {
        Some(_target) if result.status == RunStatus::Succeeded => RunStatus::Succeeded,
        Some(target) => target,
        None => result.status,
    };

    guard.record.status = final_status;
    if result.error.is_some() {
        guard.record.error = result.error;
    } else if final_status == RunStatus::Paused && guard.record.error.is_none() {
        guard.record.error = Some("stopped by request".to_string());
    } else if final_status == RunStatus::Interrupted && guard.record.error.is_none() {
        guard.record.error = Some("interrupted by request".to_string());
    }
    guard.interrupt = None;
    guard.steer = None;

    let event_kind = match final_status {
        RunStatus::Succeeded => Some(EventKind::RunCompleted),
        RunStatus::Failed => Some(EventKind::RunFailed),
        RunStatus::Interrupted => Some(EventKind::RunInterrupted),
        RunStatus::Paused => Some(EventKind::RunPaused),
        RunStatus::Queued | RunStatus::Running => None,
    };
    if let Some(kind) = event_kind {
        if let Ok(payload) = serde_json::to_value(&guard.record) {
            broadcaster.publish(kind, payload, now);
        }
    }

    let dir = guard.dir.clone();
    let record = guard.record.clone();
    drop(guard);
    let _ = rd_store::run_dir::write_run_json(&dir, &record).await;
}

/// Forces `failed`/`cancellation timeout` if the executor hasn't honored
/// `interrupt`/`stop` within the grace period (spec §5). Races with
/// [`finalize`] for the same mutex; whichever observes `running` first
/// wins, matching the "first write is authoritative" policy.
async fn escalate_after_grace(state: Arc<Mutex<RunState>>, broadcaster: Arc<rd_broadcast::RunBroadcaster>) {
    tokio::time::sleep(CANCELLATION_GRACE).await;
    let mut guard = state.lock().await;
    if guard.record.status != RunStatus::Running {
        return;
    }
    guard.pending_cancel = None;
    guard.record.status = RunStatus::Failed;
    guard.record.error = Some("cancellation timeout".to_string());
    if let Ok(payload) = serde_json::to_value(&guard.record) {
        broadcaster.publish(EventKind::RunFailed, payload, Utc::now());
    }
    let dir = guard.dir.clone();
    let record = guard.record.clone();
    drop(guard);
    let _ = rd_store::run_dir::write_run_json(&dir, &record).await;
}
