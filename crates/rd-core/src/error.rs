//! Error taxonomy shared by every crate in the workspace.
//!
//! One enum, one variant per kind named in the error handling design: each
//! variant carries the context a caller needs to act on it (paths, pids,
//! tried targets). `rd-server` maps this to HTTP responses; `rd-cli` maps it
//! to stderr output. Library crates define their own narrower `thiserror`
//! enums and convert into this one at the boundary rather than leaking
//! `anyhow::Error` past their own edge.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        details: Option<Value>,
    },

    #[error("unauthorized")]
    Unauthorized,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{message}")]
    InvalidState { message: String },

    #[error("no runner reachable (tried: {})", .tried.join(", "))]
    RunnerNotFound { tried: Vec<String> },

    #[error("failed to install daemon into {path}: {reason}")]
    DaemonInstallFailed { path: String, reason: String },

    #[error("daemon did not become healthy within {waited_secs}s")]
    DaemonStartTimeout { waited_secs: u64 },

    #[error("failed to shut down daemon: {reason}")]
    ShutdownFailed { reason: String },

    #[error("{0}")]
    Exception(String),
}

impl Error {
    /// The stable kind string used in API error bodies (`{"error": "<kind>"}`)
    /// and as the CLI's machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRequest { .. } => "invalid_request",
            Error::Unauthorized => "unauthorized",
            Error::NotFound { .. } => "not_found",
            Error::InvalidState { .. } => "invalid_state",
            Error::RunnerNotFound { .. } => "runner_not_found",
            Error::DaemonInstallFailed { .. } => "daemon_install_failed",
            Error::DaemonStartTimeout { .. } => "daemon_start_timeout",
            Error::ShutdownFailed { .. } => "shutdown_failed",
            Error::Exception(_) => "exception",
        }
    }

    /// HTTP status this kind maps to. Daemon-lifecycle and discovery kinds
    /// are CLI-only and never actually rendered over HTTP; they get a
    /// placeholder of 500 so callers have a total function.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidRequest { .. } => 400,
            Error::Unauthorized => 401,
            Error::NotFound { .. } => 404,
            Error::InvalidState { .. } => 409,
            Error::RunnerNotFound { .. }
            | Error::DaemonInstallFailed { .. }
            | Error::DaemonStartTimeout { .. }
            | Error::ShutdownFailed { .. }
            | Error::Exception(_) => 500,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// Wire body shared by the HTTP and CLI surfaces.
    pub fn to_api_error(&self) -> ApiError {
        let details = match self {
            Error::InvalidRequest { details, .. } => details.clone(),
            _ => None,
        };
        ApiError {
            error: self.kind(),
            message: self.to_string(),
            details,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Exception(format!("io error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Exception(format!("json error: {err}"))
    }
}

/// `{error, message, details?}` — shared by HTTP JSON bodies and
/// `--output-format json|jsonl` CLI error output.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status_agree_with_the_taxonomy() {
        let cases: Vec<(Error, &str, u16)> = vec![
            (Error::invalid_request("bad cwd"), "invalid_request", 400),
            (Error::Unauthorized, "unauthorized", 401),
            (Error::not_found("run"), "not_found", 404),
            (Error::invalid_state("resume on running"), "invalid_state", 409),
            (
                Error::RunnerNotFound {
                    tried: vec!["daemon".into(), "foreground".into()],
                },
                "runner_not_found",
                500,
            ),
        ];
        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.http_status(), status);
        }
    }

    #[test]
    fn api_error_serializes_without_details_when_absent() {
        let err = Error::not_found("run abc123");
        let json = serde_json::to_value(err.to_api_error()).unwrap();
        assert_eq!(json["error"], "not_found");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn runner_not_found_message_names_both_tried_targets() {
        let err = Error::RunnerNotFound {
            tried: vec!["http://127.0.0.1:8787".into(), "daemon runtime file".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("http://127.0.0.1:8787"));
        assert!(msg.contains("daemon runtime file"));
    }
}
