//! The executor-facing surface (spec §6 "Executor interface").
//!
//! `RunExecutor` is implemented once for real by `codex::CodexExecutor`
//! (drives the agent via the [`crate::supervisor::Supervisor`]) and is
//! otherwise implemented by fakes in `rd-server`'s own tests — `rd-executor`
//! itself never assumes which implementation is in play.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rd_core::model::{ReasoningEffort, ReviewDescriptor, RunKind, RunStatus};
use rd_core::RunId;
use serde_json::Value;

/// The slice of a run's configuration an executor needs to start a turn.
/// Deliberately narrower than `rd_core::model::RunRecord`: no status,
/// timestamps, or log paths, since the executor neither reads nor writes
/// those.
#[derive(Debug, Clone)]
pub struct ExecutorRunConfig {
    pub id: RunId,
    pub cwd: String,
    pub prompt: String,
    pub kind: RunKind,
    pub review: Option<ReviewDescriptor>,
    pub model: Option<String>,
    pub effort: Option<ReasoningEffort>,
    pub sandbox: String,
    pub approval_policy: String,
    pub thread_id: Option<String>,
}

type InterruptFn = dyn Fn() + Send + Sync;

/// Shared with the caller that constructs a [`RunExecutionContext`] so stop
/// and interrupt requests can reach whatever handler the executor
/// registered mid-flight, without the caller needing a reference into the
/// executor itself.
#[derive(Clone, Default)]
pub struct InterruptHandle(Arc<Mutex<Option<Arc<InterruptFn>>>>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes the currently registered handler, if any. A no-op before the
    /// executor has called `set_interrupt`, which is expected during the
    /// brief window before the turn actually starts.
    pub fn fire(&self) {
        let handler = self.0.lock().expect("interrupt handle mutex poisoned").clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

type SteerFn = dyn Fn(String) + Send + Sync;

/// Mirrors [`InterruptHandle`] for `steer`: registered only while a turn
/// that actually accepts steering is active, so the caller can ask
/// `is_registered` to decide between delivering the text and failing with
/// "no active turn" (spec's `steer` contract is narrower than `interrupt` —
/// not every executor need support it).
#[derive(Clone, Default)]
pub struct SteerHandle(Arc<Mutex<Option<Arc<SteerFn>>>>);

impl SteerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self) -> bool {
        self.0.lock().expect("steer handle mutex poisoned").is_some()
    }

    /// Invokes the currently registered handler, if any. Callers that care
    /// whether steering is actually possible should check `is_registered`
    /// first rather than rely on this being a no-op.
    pub fn fire(&self, text: String) {
        let handler = self.0.lock().expect("steer handle mutex poisoned").clone();
        if let Some(handler) = handler {
            handler(text);
        }
    }
}

/// Passed by value into `RunExecutor::execute`; mutated in place as the
/// executor learns ids from the agent.
pub struct RunExecutionContext {
    pub run: ExecutorRunConfig,
    notify: Box<dyn FnMut(String, Value) + Send>,
    set_ids: Box<dyn FnMut(Option<String>, Option<String>, Option<String>) + Send>,
    interrupt: InterruptHandle,
    steer: SteerHandle,
}

impl RunExecutionContext {
    pub fn new(
        run: ExecutorRunConfig,
        notify: impl FnMut(String, Value) + Send + 'static,
        set_ids: impl FnMut(Option<String>, Option<String>, Option<String>) + Send + 'static,
        interrupt: InterruptHandle,
        steer: SteerHandle,
    ) -> Self {
        Self {
            run,
            notify: Box::new(notify),
            set_ids: Box::new(set_ids),
            interrupt,
            steer,
        }
    }

    /// Forwards one raw `codex.notification` kind/payload pair to the
    /// caller (which appends it to the event buffer and feeds the rollup
    /// engine; `rd-executor` does neither itself).
    pub fn publish_notification(&mut self, kind: impl Into<String>, payload: Value) {
        (self.notify)(kind.into(), payload);
    }

    /// Records the thread/turn/rollout ids the agent assigned once they're
    /// known, usually from the first notification of a new turn.
    pub fn set_codex_ids(&mut self, thread_id: Option<String>, turn_id: Option<String>, rollout_path: Option<String>) {
        (self.set_ids)(thread_id, turn_id, rollout_path);
    }

    /// Registers the handler invoked when the caller requests cooperative
    /// cancellation (`interrupt` or `stop`). Replaces any prior handler.
    pub fn set_interrupt(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.interrupt.0.lock().expect("interrupt handle mutex poisoned") = Some(Arc::new(handler));
    }

    /// Registers the handler invoked when the caller injects `steer` text
    /// into the active turn. Executors that don't support mid-turn steering
    /// simply never call this, leaving `SteerHandle::is_registered` false.
    pub fn set_steer(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        *self.steer.0.lock().expect("steer handle mutex poisoned") = Some(Arc::new(handler));
    }

    pub fn effort(&self) -> Option<ReasoningEffort> {
        self.run.effort
    }
}

#[derive(Debug, Clone)]
pub struct RunExecutionResult {
    pub status: RunStatus,
    pub error: Option<String>,
}

impl RunExecutionResult {
    pub fn succeeded() -> Self {
        Self {
            status: RunStatus::Succeeded,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            error: Some(reason.into()),
        }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Interrupted,
            error: Some(reason.into()),
        }
    }

    pub fn paused(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Paused,
            error: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, ctx: RunExecutionContext) -> RunExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_handle_fire_is_a_noop_before_any_handler_is_registered() {
        let handle = InterruptHandle::new();
        handle.fire();
    }

    #[test]
    fn interrupt_handle_invokes_the_most_recently_registered_handler() {
        let handle = InterruptHandle::new();
        let run = ExecutorRunConfig {
            id: RunId::new(),
            cwd: "/tmp".into(),
            prompt: "hi".into(),
            kind: RunKind::Exec,
            review: None,
            model: None,
            effort: None,
            sandbox: "workspace-write".into(),
            approval_policy: "never".into(),
            thread_id: None,
        };
        let ctx = RunExecutionContext::new(run, |_, _| {}, |_, _, _| {}, handle.clone(), SteerHandle::new());
        let fired = Arc::new(Mutex::new(false));
        let fired_clone = fired.clone();
        ctx.set_interrupt(move || *fired_clone.lock().unwrap() = true);
        handle.fire();
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn steer_handle_is_registered_only_after_a_handler_is_set() {
        let handle = SteerHandle::new();
        assert!(!handle.is_registered());
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();
        *handle.0.lock().unwrap() = Some(Arc::new(move |text: String| {
            *received_clone.lock().unwrap() = Some(text);
        }));
        assert!(handle.is_registered());
        handle.fire("more context".into());
        assert_eq!(received.lock().unwrap().as_deref(), Some("more context"));
    }

    #[test]
    fn run_execution_result_constructors_set_matching_status() {
        assert_eq!(RunExecutionResult::succeeded().status, RunStatus::Succeeded);
        assert_eq!(RunExecutionResult::failed("x").status, RunStatus::Failed);
        assert_eq!(RunExecutionResult::interrupted("x").status, RunStatus::Interrupted);
        assert_eq!(RunExecutionResult::paused("x").status, RunStatus::Paused);
    }
}
