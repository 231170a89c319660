//! Shared server bring-up for `serve` (foreground) and the detached daemon
//! child (spec §4.7): construct the supervisor and the real executor, then
//! hand both to `rd_server::serve`. Grounded on the teacher's `handle_serve`
//! (one function both the `serve` subcommand and the runner daemon's own
//! startup path call into).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rd_core::model::DaemonRuntimeDescriptor;
use rd_executor::{CodexExecutor, RunExecutor, Supervisor, SupervisorConfig};
use rd_server::ServeConfig;

/// `on_bound` is `Some` only for the detached daemon child, which must write
/// the runtime descriptor "once the socket is bound" (spec §3, §4.7); the
/// foreground server has nothing to write since it's discovered by its
/// static port, not a descriptor file.
pub async fn run(
    state_dir: PathBuf,
    port: u16,
    auth_required: bool,
    dev_mode: bool,
    persist_raw_events: bool,
    write_runtime_descriptor: bool,
) -> rd_core::Result<()> {
    tokio::fs::create_dir_all(&state_dir).await?;
    let identity = rd_store::identity::load_or_create(&state_dir).await?;

    let state_dir_for_restart_log = state_dir.clone();
    let supervisor = Supervisor::spawn(
        SupervisorConfig::default(),
        Arc::new(move || {
            tracing::warn!(
                state_dir = %state_dir_for_restart_log.display(),
                "agent process exited unexpectedly, runs will pause until it restarts",
            );
        }),
    );
    let executor: Arc<dyn RunExecutor> = Arc::new(CodexExecutor::new(supervisor.clone()));

    let listen: SocketAddr = format!("127.0.0.1:{port}")
        .parse()
        .expect("127.0.0.1:<port> is always a valid socket address");

    let on_bound = if write_runtime_descriptor {
        let descriptor_state_dir = state_dir.clone();
        let version = env!("CARGO_PKG_VERSION").to_string();
        Some(Box::new(move |actual_addr: SocketAddr| {
            Box::pin(async move {
                let descriptor = DaemonRuntimeDescriptor {
                    base_url: format!("http://{actual_addr}"),
                    listen: actual_addr.to_string(),
                    port: actual_addr.port(),
                    pid: std::process::id(),
                    started_at_utc: chrono::Utc::now(),
                    state_dir: descriptor_state_dir.display().to_string(),
                    version,
                };
                if let Err(err) = rd_store::runtime_descriptor::write(&descriptor_state_dir, &descriptor).await {
                    tracing::error!(%err, "failed to write daemon runtime descriptor");
                }
            }) as futures::future::BoxFuture<'static, ()>
        }) as Box<dyn FnOnce(SocketAddr) -> futures::future::BoxFuture<'static, ()> + Send>)
    } else {
        None
    };

    rd_server::serve(ServeConfig {
        listen,
        state_dir,
        identity,
        auth_required,
        dev_mode,
        persist_raw_events,
        version: env!("CARGO_PKG_VERSION").to_string(),
        supervisor,
        executor,
        on_bound,
    })
    .await
}
