//! Shared application state injected into every handler via axum's
//! `State` extractor. Grounded on the teacher's `api::state::AppState`
//! shape (one cheap-to-clone struct wrapping an `Arc` of the real fields).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rd_broadcast::BroadcastRegistry;
use rd_core::model::Identity;
use rd_core::RunnerId;
use rd_executor::Supervisor;
use tokio::sync::watch;

use crate::run_manager::RunManager;

pub struct AppStateInner {
    pub identity: Identity,
    pub auth_required: bool,
    pub dev_mode: bool,
    pub state_dir: PathBuf,
    pub base_url: String,
    pub port: u16,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub broadcasts: Arc<BroadcastRegistry>,
    pub supervisor: Arc<Supervisor>,
    pub run_manager: Arc<RunManager>,
    pub shutdown_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct AppState(pub Arc<AppStateInner>);

impl AppState {
    pub fn runner_id(&self) -> RunnerId {
        self.0.identity.runner_id
    }

    /// Signals the graceful-shutdown future owned by `lib::serve` to begin
    /// draining connections and exit. Idempotent — a second call is a no-op
    /// since the receiver side only needs to observe the value change once.
    pub fn request_shutdown(&self) {
        let _ = self.0.shutdown_tx.send(true);
    }
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
