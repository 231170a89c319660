//! Narrower error taxonomy for the agent supervisor, converted into
//! `rd_core::Error` at the `rd-server` boundary (spec §10.2).

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("agent process did not complete its handshake")]
    HandshakeFailed,

    #[error("the agent client was replaced by a restart; re-acquire via get_client()")]
    ClientStale,

    #[error("failed to write to agent stdin: {0}")]
    Io(#[source] std::io::Error),

    #[error("failed to serialize agent command: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("the agent supervisor is shutting down")]
    ShuttingDown,
}

impl From<ExecutorError> for rd_core::Error {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::ClientStale | ExecutorError::ShuttingDown => {
                rd_core::Error::invalid_state(err.to_string())
            }
            other => rd_core::Error::Exception(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
