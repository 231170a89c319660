use std::path::PathBuf;

use rd_core::Error as CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed run.json at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("run {run_id} not found")]
    RunNotFound { run_id: String },
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound { run_id } => CoreError::not_found(format!("run {run_id}")),
            other => CoreError::Exception(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
