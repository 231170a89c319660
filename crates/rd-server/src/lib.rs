//! The HTTP/SSE surface that mediates between the CLI client and the
//! long-lived agent subprocess (spec §4.1–§4.6). `serve` is the single
//! entry point both `rd-cli serve` (foreground) and the daemon parent
//! process call into.

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod run_manager;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rd_broadcast::BroadcastRegistry;
use rd_core::model::Identity;
use rd_executor::Supervisor;
use tokio::net::TcpListener;
use tokio::sync::watch;

use run_manager::RunManager;
use state::{AppState, AppStateInner};

pub struct ServeConfig {
    pub listen: SocketAddr,
    pub state_dir: PathBuf,
    pub identity: Identity,
    pub auth_required: bool,
    pub dev_mode: bool,
    pub persist_raw_events: bool,
    pub version: String,
    pub supervisor: Arc<Supervisor>,
    pub executor: Arc<dyn rd_executor::RunExecutor>,
    /// Awaited with the actual bound address before the router starts
    /// accepting requests. The daemon child uses this to write the runtime
    /// descriptor "once the socket is bound" (spec §4.7, §3); the foreground
    /// server and tests leave it `None`.
    pub on_bound: Option<Box<dyn FnOnce(SocketAddr) -> futures::future::BoxFuture<'static, ()> + Send>>,
}

/// Binds, builds the router, and serves until a shutdown is requested
/// either externally (Ctrl+C / SIGTERM, mirroring the teacher's `main.rs`)
/// or internally (`POST /v1/shutdown`, via `AppState::request_shutdown`).
pub async fn serve(config: ServeConfig) -> rd_core::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    let actual_addr = listener.local_addr()?;
    let base_url = format!("http://{actual_addr}");

    if let Some(on_bound) = config.on_bound {
        on_bound(actual_addr).await;
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let broadcasts = Arc::new(BroadcastRegistry::new());

    let state = AppState(Arc::new(AppStateInner {
        identity: config.identity,
        auth_required: config.auth_required,
        dev_mode: config.dev_mode,
        state_dir: config.state_dir.clone(),
        base_url: base_url.clone(),
        port: actual_addr.port(),
        version: config.version,
        started_at: Utc::now(),
        broadcasts: broadcasts.clone(),
        supervisor: config.supervisor,
        run_manager: Arc::new(RunManager::new(
            config.state_dir,
            config.persist_raw_events,
            broadcasts,
            config.executor,
        )),
        shutdown_tx,
    }));

    let app = router::build_router(state);

    tracing::info!(%base_url, "listening");

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };
        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
            _ = shutdown_rx.changed() => {},
        }
        tracing::info!("shutdown signal received, draining connections");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|err| rd_core::Error::Exception(format!("server error: {err}")))
}
