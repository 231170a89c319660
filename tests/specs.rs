//! Workspace-level integration tests driving the real HTTP/SSE surface
//! end to end, against a scripted `RunExecutor` fake standing in for the
//! agent subprocess. Covers the lifecycle/replay properties that can only
//! be observed by actually running the server: §8's E1, E2, and E5.
//! E3/E4 (rollup line-splitting) live as unit tests in `rd-rollup`'s
//! `engine.rs`; E6 (replay tie-break) lives in `rd-broadcast`'s
//! `broadcaster.rs`, both next to the code whose invariant they pin down.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use rd_client::RunnerClient;
use rd_core::model::{EventKind, Identity, ReplayFormat, RunKind, RunStatus};
use rd_core::RunnerId;
use rd_executor::{RunExecutionContext, RunExecutionResult, RunExecutor, Supervisor, SupervisorConfig};
use rd_server::ServeConfig;
use tokio::sync::Notify;

/// Boots a real `rd-server` instance bound to an ephemeral loopback port,
/// backed by `executor`, with auth disabled so tests talk to it directly.
/// Returns a client already pointed at it and the server's join handle.
async fn spawn_server(executor: Arc<dyn RunExecutor>) -> (RunnerClient, tokio::task::JoinHandle<()>) {
    // Leaked deliberately: the server outlives this function, so an RAII
    // `TempDir` guard here would delete the directory out from under it.
    let state_dir = tempfile::tempdir().expect("tempdir").into_path();
    let supervisor = Supervisor::spawn(SupervisorConfig::default(), Arc::new(|| {}));

    let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let bound = Arc::new(tokio::sync::OnceCell::new());
    let bound_tx = bound.clone();

    let config = ServeConfig {
        listen,
        state_dir,
        identity: Identity { runner_id: RunnerId::new(), token: "test-token".to_string() },
        auth_required: false,
        dev_mode: true,
        persist_raw_events: false,
        version: "test".to_string(),
        supervisor,
        executor,
        on_bound: Some(Box::new(move |addr: SocketAddr| {
            Box::pin(async move {
                let _ = bound_tx.set(addr);
            }) as BoxFuture<'static, ()>
        })),
    };

    let handle = tokio::spawn(async move {
        let _ = rd_server::serve(config).await;
    });

    let addr = loop {
        if let Some(addr) = bound.get() {
            break *addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let client = RunnerClient::new(format!("http://{addr}"), None);
    (client, handle)
}

struct ScriptedExecutor {
    run: Box<
        dyn Fn(RunExecutionContext) -> Pin<Box<dyn Future<Output = RunExecutionResult> + Send>> + Send + Sync,
    >,
}

#[async_trait]
impl RunExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: RunExecutionContext) -> RunExecutionResult {
        (self.run)(ctx).await
    }
}

fn cwd_string() -> String {
    std::env::current_dir().unwrap().to_string_lossy().to_string()
}

/// E1: a run that emits one output delta and succeeds ends up `succeeded`,
/// and a `replay=true,follow=true` attach sees `run.meta`, a rollup/notification
/// line, and `run.completed`.
#[tokio::test]
async fn e1_happy_path_run_completes_and_replays_its_full_history() {
    let executor: Arc<dyn RunExecutor> = Arc::new(ScriptedExecutor {
        run: Box::new(|mut ctx: RunExecutionContext| {
            Box::pin(async move {
                ctx.publish_notification("item/commandExecution/outputDelta", serde_json::json!({ "delta": "hi\n" }));
                RunExecutionResult::succeeded()
            })
        }),
    });
    let (client, _server) = spawn_server(executor).await;

    let created = client
        .create_run(&rd_client::dto::CreateRunRequest::new(cwd_string(), "hi".to_string(), RunKind::Exec))
        .await
        .expect("create_run");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = client.get_run(created.run_id).await.expect("get_run");
        if record.status == RunStatus::Succeeded {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "run did not reach succeeded in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut stream = client
        .stream_events(created.run_id, true, true, None, ReplayFormat::Auto)
        .expect("stream_events");

    let mut kinds = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event.expect("event");
        let done = event.kind == EventKind::RunCompleted.sse_name();
        kinds.push(event.kind);
        if done {
            break;
        }
    }

    assert_eq!(kinds.first().map(String::as_str), Some(EventKind::RunMeta.sse_name()));
    assert!(kinds.iter().any(|k| k == EventKind::RollupOutputLine.sse_name() || k == EventKind::Notification.sse_name()));
    assert_eq!(kinds.last().map(String::as_str), Some(EventKind::RunCompleted.sse_name()));
    assert_eq!(
        kinds.iter().filter(|k| k.as_str() == EventKind::RunMeta.sse_name()).count(),
        1,
        "run.meta must open the replay exactly once, not once from the snapshot and once as the explicit opening frame"
    );
}

/// E2: subscribing with `replay=false,follow=true` strictly after an
/// "early" delta was published only observes events published afterward.
#[tokio::test]
async fn e2_follow_only_subscriber_misses_history_before_it_subscribed() {
    let early_published = Arc::new(Notify::new());
    let resume_execution = Arc::new(Notify::new());
    let early_published_in_executor = early_published.clone();
    let resume_execution_in_executor = resume_execution.clone();

    let executor: Arc<dyn RunExecutor> = Arc::new(ScriptedExecutor {
        run: Box::new(move |mut ctx: RunExecutionContext| {
            let early_published = early_published_in_executor.clone();
            let resume_execution = resume_execution_in_executor.clone();
            Box::pin(async move {
                ctx.publish_notification("item/commandExecution/outputDelta", serde_json::json!({ "delta": "early\n" }));
                early_published.notify_one();
                resume_execution.notified().await;
                ctx.publish_notification("item/commandExecution/outputDelta", serde_json::json!({ "delta": "late\n" }));
                RunExecutionResult::succeeded()
            })
        }),
    });
    let (client, _server) = spawn_server(executor).await;

    let created = client
        .create_run(&rd_client::dto::CreateRunRequest::new(cwd_string(), "hi".to_string(), RunKind::Exec))
        .await
        .expect("create_run");

    early_published.notified().await;

    let mut stream = client
        .stream_events(created.run_id, false, true, None, ReplayFormat::Auto)
        .expect("stream_events");
    resume_execution.notify_one();

    let mut saw_late = false;
    while let Some(event) = stream.next().await {
        let event = event.expect("event");
        if event.kind == EventKind::RollupOutputLine.sse_name() || event.kind == EventKind::Notification.sse_name() {
            let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            assert_ne!(text, "early", "a follow-only subscriber must not see pre-subscription history");
            if text == "late" {
                saw_late = true;
            }
        }
        if event.kind == EventKind::RunCompleted.sse_name() {
            break;
        }
    }
    assert!(saw_late, "expected the post-subscription delta to be observed");
}

/// E5: stopping a running run pauses it and emits `run.paused`; resuming it
/// with a new prompt drives it to `succeeded`, and a fresh replay attach
/// does not stop at the historical `run.paused` marker.
#[tokio::test]
async fn e5_stop_then_resume_reaches_succeeded_without_stopping_at_the_old_pause_marker() {
    let interrupted = Arc::new(Notify::new());
    // Signaled once `set_interrupt` has actually registered a handler, so
    // the test never calls `stop` while `interrupt.fire()` would still be a
    // no-op against an unregistered handle.
    let handler_installed = Arc::new(Notify::new());
    let invocation = Arc::new(AtomicUsize::new(0));
    let interrupted_in_executor = interrupted.clone();
    let handler_installed_in_executor = handler_installed.clone();
    let invocation_in_executor = invocation.clone();

    let executor: Arc<dyn RunExecutor> = Arc::new(ScriptedExecutor {
        run: Box::new(move |ctx: RunExecutionContext| {
            let interrupted = interrupted_in_executor.clone();
            let handler_installed = handler_installed_in_executor.clone();
            let invocation = invocation_in_executor.clone();
            Box::pin(async move {
                if invocation.fetch_add(1, Ordering::SeqCst) == 0 {
                    let interrupted = interrupted.clone();
                    ctx.set_interrupt(move || interrupted.notify_one());
                    handler_installed.notify_one();
                    interrupted.notified().await;
                    RunExecutionResult::interrupted("stopped by request")
                } else {
                    RunExecutionResult::succeeded()
                }
            })
        }),
    });
    let (client, _server) = spawn_server(executor).await;

    let created = client
        .create_run(&rd_client::dto::CreateRunRequest::new(cwd_string(), "hi".to_string(), RunKind::Exec))
        .await
        .expect("create_run");

    handler_installed.notified().await;
    client.stop(created.run_id).await.expect("stop");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if client.get_run(created.run_id).await.expect("get_run").status == RunStatus::Paused {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "run did not reach paused in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client
        .resume(created.run_id, &rd_client::dto::ResumeRequest { prompt: Some("continue".to_string()), effort: None })
        .await
        .expect("resume");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if client.get_run(created.run_id).await.expect("get_run").status == RunStatus::Succeeded {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "run did not reach succeeded after resume");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut stream = client
        .stream_events(created.run_id, true, true, None, ReplayFormat::Auto)
        .expect("stream_events");
    let mut last_kind = String::new();
    while let Some(event) = stream.next().await {
        let event = event.expect("event");
        last_kind = event.kind;
        if last_kind == EventKind::RunCompleted.sse_name() {
            break;
        }
    }
    assert_eq!(last_kind, EventKind::RunCompleted.sse_name(), "the historical run.paused must not terminate replay");
}

/// Sanity check that a bad request (nonexistent cwd) is rejected with the
/// spec's `invalid_request` kind rather than panicking the server.
#[tokio::test]
async fn create_run_rejects_a_nonexistent_cwd() {
    let executor: Arc<dyn RunExecutor> = Arc::new(ScriptedExecutor {
        run: Box::new(|_ctx: RunExecutionContext| Box::pin(async { RunExecutionResult::succeeded() })),
    });
    let (client, _server) = spawn_server(executor).await;

    let err = client
        .create_run(&rd_client::dto::CreateRunRequest::new(
            "/does/not/exist/anywhere".to_string(),
            "hi".to_string(),
            RunKind::Exec,
        ))
        .await
        .expect_err("nonexistent cwd should be rejected");

    assert!(matches!(err, rd_client::ClientError::Api { status: 400, .. }));
}
