//! Owns the single long-lived agent process (spec §4.5).
//!
//! Grounded on the teacher's `PiSessionManager::create_session` process
//! spawn shape (`Command::new(...).stdin/stdout/stderr(Stdio::piped())`,
//! a dedicated stdout-reader task) and `stdout_reader_task`'s
//! read-parse-skip-on-error loop, adapted from "one process per session"
//! to "one process for the whole daemon, many concurrent runs".

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

use crate::client::AgentClient;
use crate::error::{ExecutorError, Result};
use crate::protocol::AgentLine;

const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Delay before re-spawning after an unexpected exit.
    pub restart_delay: Duration,
    /// How long to wait for the `ready` handshake line after spawn.
    pub handshake_timeout: Duration,
    /// Crashes within this window of each other count toward the
    /// exponential-backoff fault threshold.
    pub crash_loop_window: Duration,
    /// Consecutive crash-loop restarts before reporting `faulted`.
    pub max_crash_loop_restarts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("codex"),
            args: vec!["--mode".to_string(), "rpc".to_string()],
            restart_delay: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(10),
            crash_loop_window: Duration::from_secs(30),
            max_crash_loop_restarts: 5,
        }
    }
}

/// Reported by `GET /v1/health` as `codexRuntime` (spec §4.1, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Ok,
    Faulted,
    /// No agent binary is configured; the supervisor never spawns anything
    /// and `get_client()` suspends forever.
    Disabled,
}

/// Drives one agent process end-to-end: spawn, handshake, restart-on-exit
/// with backoff, graceful shutdown. `on_unexpected_exit` is the hook
/// `rd-server`'s `RunManager` uses to transition every `running` run to
/// `paused` with reason "codex runtime restarted" (spec §4.2); it is the
/// authoritative mechanism for that transition, not a side effect callers
/// infer from a closed channel.
pub struct Supervisor {
    config: SupervisorConfig,
    state: RwLock<SupervisorState>,
    client_tx: watch::Sender<Option<AgentClient>>,
    client_rx: watch::Receiver<Option<AgentClient>>,
    generation: Arc<AtomicU64>,
    shutting_down: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn spawn(config: SupervisorConfig, on_unexpected_exit: Arc<dyn Fn() + Send + Sync>) -> Arc<Self> {
        let disabled = config.binary.as_os_str().is_empty();
        let (client_tx, client_rx) = watch::channel(None);
        let supervisor = Arc::new(Self {
            config,
            state: RwLock::new(if disabled { SupervisorState::Disabled } else { SupervisorState::Starting }),
            client_tx,
            client_rx,
            generation: Arc::new(AtomicU64::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        });
        if !disabled {
            tokio::spawn(supervisor_loop(supervisor.clone(), on_unexpected_exit));
        }
        supervisor
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.read().expect("supervisor state lock poisoned")
    }

    /// Waits until a live client exists, then returns it. If the current
    /// process is mid-restart this suspends until the next one comes up.
    pub async fn get_client(&self) -> AgentClient {
        let mut rx = self.client_rx.clone();
        loop {
            if let Some(client) = rx.borrow().clone() {
                return client;
            }
            if rx.changed().await.is_err() {
                // Sender dropped only happens if the supervisor itself was
                // dropped; park forever rather than return a bogus client.
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }
}

async fn supervisor_loop(supervisor: Arc<Supervisor>, on_unexpected_exit: Arc<dyn Fn() + Send + Sync>) {
    let mut consecutive_crashes: u32 = 0;
    let mut last_crash_at: Option<tokio::time::Instant> = None;

    loop {
        if supervisor.shutting_down.load(Ordering::Acquire) {
            return;
        }

        *supervisor.state.write().expect("supervisor state lock poisoned") = SupervisorState::Starting;

        match spawn_and_run_one_generation(&supervisor).await {
            Ok(()) => {
                consecutive_crashes = 0;
            }
            Err(err) => {
                tracing::warn!(error = %err, "agent process failed to start or handshake");
            }
        }

        if supervisor.shutting_down.load(Ordering::Acquire) {
            return;
        }

        let now = tokio::time::Instant::now();
        let within_crash_loop_window = last_crash_at
            .map(|t| now.duration_since(t) < supervisor.config.crash_loop_window)
            .unwrap_or(false);
        consecutive_crashes = if within_crash_loop_window { consecutive_crashes + 1 } else { 1 };
        last_crash_at = Some(now);

        if consecutive_crashes > supervisor.config.max_crash_loop_restarts {
            *supervisor.state.write().expect("supervisor state lock poisoned") = SupervisorState::Faulted;
        }

        on_unexpected_exit();

        let backoff = supervisor.config.restart_delay * consecutive_crashes.min(8);
        tokio::time::sleep(backoff).await;
    }
}

/// Spawns one process generation, performs the handshake, publishes the
/// client, and waits for the process to exit. Returns once the process
/// has exited (normally or otherwise) so the caller can decide to restart.
async fn spawn_and_run_one_generation(supervisor: &Arc<Supervisor>) -> Result<()> {
    let mut command = Command::new(&supervisor.config.binary);
    command
        .args(&supervisor.config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ExecutorError::Spawn)?;
    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "spawned agent process");

    let stdin = child.stdin.take().expect("stdin was piped");
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take();

    let (lines_tx, mut handshake_rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
    let reader_lines_tx = lines_tx.clone();

    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if !line.trim().is_empty() {
                    tracing::debug!(%line, "agent stderr");
                }
            }
        });
    }

    let reader_handle = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            for parsed in AgentLine::parse_all(&line) {
                match parsed {
                    Ok(agent_line) => {
                        let _ = reader_lines_tx.send(agent_line);
                    }
                    Err(reason) => {
                        tracing::warn!(%reason, %line, "failed to parse agent line, skipping");
                    }
                }
            }
        }
    });

    match timeout(supervisor.config.handshake_timeout, handshake_rx.recv()).await {
        Ok(Ok(AgentLine::Ready)) => {}
        Ok(Ok(other)) => {
            tracing::warn!(?other, "expected a ready handshake but got a notification first");
        }
        Ok(Err(_)) | Err(_) => {
            let _ = child.start_kill();
            reader_handle.abort();
            return Err(ExecutorError::HandshakeFailed);
        }
    }

    let generation = supervisor.generation.fetch_add(1, Ordering::AcqRel) + 1;
    let client = AgentClient::new(generation, supervisor.generation.clone(), stdin, lines_tx);
    let _ = supervisor.client_tx.send(Some(client));
    *supervisor.state.write().expect("supervisor state lock poisoned") = SupervisorState::Ok;

    let _ = child.wait().await;
    let _ = supervisor.client_tx.send(None);
    reader_handle.abort();
    tracing::warn!(pid, "agent process exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn echo_ready_config() -> SupervisorConfig {
        SupervisorConfig {
            binary: PathBuf::from("sh"),
            args: vec![
                "-c".to_string(),
                // Emit the handshake then block forever reading stdin.
                "echo '{\"type\":\"ready\"}'; cat >/dev/null".to_string(),
            ],
            restart_delay: Duration::from_millis(10),
            handshake_timeout: Duration::from_secs(5),
            crash_loop_window: Duration::from_secs(30),
            max_crash_loop_restarts: 5,
        }
    }

    #[tokio::test]
    async fn supervisor_reaches_ok_after_handshake() {
        let exits = Arc::new(AtomicUsize::new(0));
        let exits_clone = exits.clone();
        let supervisor = Supervisor::spawn(echo_ready_config(), Arc::new(move || {
            exits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let client = tokio::time::timeout(Duration::from_secs(5), supervisor.get_client())
            .await
            .expect("supervisor should publish a client before the deadline");
        assert!(client.is_live());
        assert_eq!(supervisor.state(), SupervisorState::Ok);
        supervisor.shutdown();
    }

    #[tokio::test]
    async fn supervisor_marks_faulted_after_repeated_immediate_crashes() {
        let config = SupervisorConfig {
            binary: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "exit 1".to_string()],
            restart_delay: Duration::from_millis(1),
            handshake_timeout: Duration::from_millis(200),
            crash_loop_window: Duration::from_secs(30),
            max_crash_loop_restarts: 1,
        };
        let supervisor = Supervisor::spawn(config, Arc::new(|| {}));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(supervisor.state(), SupervisorState::Faulted);
        supervisor.shutdown();
    }

    #[tokio::test]
    async fn supervisor_with_an_empty_binary_path_reports_disabled_and_never_spawns() {
        let config = SupervisorConfig { binary: PathBuf::new(), ..echo_ready_config() };
        let supervisor = Supervisor::spawn(config, Arc::new(|| {}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(supervisor.state(), SupervisorState::Disabled);
    }
}
