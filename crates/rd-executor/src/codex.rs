//! The real `RunExecutor`: drives the agent process via the supervisor.
//!
//! Fakes for `rd-server`'s own tests implement [`RunExecutor`] directly
//! without touching a [`Supervisor`] at all — this module is the only
//! place in the workspace that does.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::context::{RunExecutionContext, RunExecutionResult, RunExecutor};
use crate::protocol::{AgentCommand, AgentLine};
use crate::supervisor::Supervisor;

/// `codex.notification` kinds the executor itself interprets to decide
/// when a turn has ended. Everything else is forwarded to the caller via
/// `publish_notification` unmodified and otherwise ignored here.
const TURN_COMPLETED: &str = "turn/completed";
const TURN_FAILED: &str = "turn/failed";
const SESSION_STARTED: &str = "session/threadStarted";

pub struct CodexExecutor {
    supervisor: Arc<Supervisor>,
}

impl CodexExecutor {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl RunExecutor for CodexExecutor {
    async fn execute(&self, mut ctx: RunExecutionContext) -> RunExecutionResult {
        let client = self.supervisor.get_client().await;
        let mut lines = client.subscribe();

        let run_id = ctx.run.id;
        let start = AgentCommand::StartTurn {
            run_id,
            thread_id: ctx.run.thread_id.clone(),
            prompt: ctx.run.prompt.clone(),
            cwd: ctx.run.cwd.clone(),
            model: ctx.run.model.clone(),
            effort: ctx.effort(),
            sandbox: ctx.run.sandbox.clone(),
            approval_policy: ctx.run.approval_policy.clone(),
            review: ctx.run.review.clone(),
        };
        if let Err(err) = client.send_command(&start).await {
            return RunExecutionResult::failed(format!("failed to start turn: {err}"));
        }

        {
            let interrupt_client = client.clone();
            ctx.set_interrupt(move || {
                let client = interrupt_client.clone();
                tokio::spawn(async move {
                    let _ = client.send_command(&AgentCommand::Interrupt { run_id }).await;
                });
            });
        }
        {
            let steer_client = client.clone();
            ctx.set_steer(move |text| {
                let client = steer_client.clone();
                tokio::spawn(async move {
                    let _ = client.send_command(&AgentCommand::Steer { run_id, text }).await;
                });
            });
        }

        loop {
            match lines.recv().await {
                Ok(AgentLine::Notification { run_id: line_run_id, kind, payload }) => {
                    if line_run_id != run_id {
                        continue;
                    }
                    if kind == SESSION_STARTED {
                        let thread_id = payload.get("threadId").and_then(|v| v.as_str()).map(String::from);
                        let turn_id = payload.get("turnId").and_then(|v| v.as_str()).map(String::from);
                        let rollout_path = payload.get("rolloutPath").and_then(|v| v.as_str()).map(String::from);
                        ctx.set_codex_ids(thread_id, turn_id, rollout_path);
                    }
                    ctx.publish_notification(kind.clone(), payload.clone());
                    if kind == TURN_COMPLETED {
                        return RunExecutionResult::succeeded();
                    }
                    if kind == TURN_FAILED {
                        let reason = payload
                            .get("reason")
                            .and_then(|v| v.as_str())
                            .unwrap_or("turn failed")
                            .to_string();
                        return RunExecutionResult::failed(reason);
                    }
                }
                Ok(AgentLine::Ready) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return RunExecutionResult::paused("codex runtime restarted");
                }
            }
        }
    }
}
