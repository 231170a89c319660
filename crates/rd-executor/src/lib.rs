//! Drives the single long-lived agent process and exposes the
//! `RunExecutor` seam the core implementation and test fakes both
//! implement (spec §4.5, §6).

pub mod client;
pub mod codex;
pub mod context;
pub mod error;
pub mod protocol;
pub mod supervisor;

pub use client::AgentClient;
pub use codex::CodexExecutor;
pub use context::{ExecutorRunConfig, InterruptHandle, RunExecutionContext, RunExecutionResult, RunExecutor, SteerHandle};
pub use error::{ExecutorError, Result};
pub use protocol::{AgentCommand, AgentLine};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};
