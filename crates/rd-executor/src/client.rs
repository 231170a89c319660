//! Handle to the supervisor's current agent process.
//!
//! Cloning an `AgentClient` is cheap and safe to share across concurrently
//! executing runs (spec §4.5: "the client is thread-safe at the protocol
//! level"). When the supervisor restarts the process it publishes a new
//! client carrying a higher generation; old handles detect this on their
//! next operation rather than silently writing to a dead pipe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{broadcast, Mutex};

use crate::error::{ExecutorError, Result};
use crate::protocol::{AgentCommand, AgentLine};

#[derive(Clone)]
pub struct AgentClient {
    generation: u64,
    current_generation: Arc<AtomicU64>,
    stdin: Arc<Mutex<ChildStdin>>,
    lines: broadcast::Sender<AgentLine>,
}

impl AgentClient {
    pub(crate) fn new(
        generation: u64,
        current_generation: Arc<AtomicU64>,
        stdin: ChildStdin,
        lines: broadcast::Sender<AgentLine>,
    ) -> Self {
        Self {
            generation,
            current_generation,
            stdin: Arc::new(Mutex::new(stdin)),
            lines,
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.current_generation.load(Ordering::Acquire) != self.generation {
            Err(ExecutorError::ClientStale)
        } else {
            Ok(())
        }
    }

    pub async fn send_command(&self, command: &AgentCommand) -> Result<()> {
        self.check_live()?;
        let mut line = serde_json::to_string(command).map_err(ExecutorError::Serialize)?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await.map_err(ExecutorError::Io)?;
        stdin.flush().await.map_err(ExecutorError::Io)?;
        Ok(())
    }

    /// Every notification the process emits for every run, not just one.
    /// Callers filter by `run_id`. The sender is dropped (closing this
    /// receiver) when the reader task for this generation's process ends.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentLine> {
        self.lines.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.check_live().is_ok()
    }
}
