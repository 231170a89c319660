//! Target discovery and token resolution for the CLI (spec §6, §4.7):
//! "explicit URL > daemon runtime descriptor (health-checked) > foreground
//! static port (health-checked) > typed failure with actionable message."
//! Grounded on the teacher's `AppPaths::discover` (XDG-aware directory
//! resolution) and `OctoClient` (bearer-auth HTTP wrapper), generalized to
//! the two-tier foreground/daemon split this spec requires.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rd_core::config::{ClientConfig, RunnerConfig};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Explicit,
    Daemon,
    Foreground,
}

/// A runner the client has decided to talk to: its base URL, and — unless
/// it came from an explicit `--url` with no matching local state directory
/// — the state directory whose `identity.json` backs token resolution.
#[derive(Debug, Clone)]
pub struct Target {
    pub base_url: String,
    pub state_dir: Option<PathBuf>,
    pub source: TargetSource,
}

/// Runs the discovery order against the local filesystem and network.
/// `cwd` is the directory whose project-local `.codex-d` would host a
/// foreground server; it need not be the process's actual cwd (`--cd`).
pub async fn discover(explicit_url: Option<String>, cwd: &Path) -> rd_core::Result<Target> {
    if let Some(raw) = explicit_url {
        return Ok(Target { base_url: trim_trailing_slash(&raw), state_dir: None, source: TargetSource::Explicit });
    }

    let probe = reqwest::Client::builder()
        .timeout(HEALTH_CHECK_TIMEOUT)
        .build()
        .map_err(|err| rd_core::Error::Exception(format!("failed to build discovery http client: {err}")))?;

    let config = RunnerConfig::default();
    let mut tried = Vec::new();

    if let Ok(daemon_dir) = config.daemon_state_dir() {
        if let Ok(Some(descriptor)) = rd_store::runtime_descriptor::read(&daemon_dir).await {
            tried.push(descriptor.base_url.clone());
            if is_reachable(&probe, &descriptor.base_url).await {
                tracing::debug!(base_url = %descriptor.base_url, "discovered daemon runner");
                return Ok(Target { base_url: descriptor.base_url, state_dir: Some(daemon_dir), source: TargetSource::Daemon });
            }
        }
    }

    let foreground_dir = config.foreground_state_dir(cwd);
    let foreground_url = format!("http://127.0.0.1:{}", config.foreground_port());
    tried.push(foreground_url.clone());
    if is_reachable(&probe, &foreground_url).await {
        tracing::debug!(base_url = %foreground_url, "discovered foreground runner");
        return Ok(Target { base_url: foreground_url, state_dir: Some(foreground_dir), source: TargetSource::Foreground });
    }

    tracing::debug!(?tried, "no runner reachable");
    Err(rd_core::Error::RunnerNotFound { tried })
}

/// A connection attempt, not a health *verdict*: `/v1/health` answers 401
/// when auth is required, and that still counts as reachable (spec §4.1) —
/// only a transport-level failure (refused, DNS, timeout) means "not this
/// one".
async fn is_reachable(http: &reqwest::Client, base_url: &str) -> bool {
    http.get(format!("{base_url}/v1/health")).send().await.is_ok()
}

/// Token resolution order (spec §6): explicit, then environment, then the
/// identity file of whichever target discovery picked. An explicit target
/// with no known state directory (a bare `--url`) simply has no identity
/// file to fall back to.
pub async fn resolve_token(explicit: Option<String>, target: &Target) -> Option<String> {
    if explicit.is_some() {
        return explicit;
    }
    if let Some(token) = ClientConfig::from_env().token {
        return Some(token);
    }
    let state_dir = target.state_dir.as_ref()?;
    rd_store::identity::read(state_dir).await.ok().flatten().map(|identity| identity.token)
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_exactly_the_trailing_slashes() {
        assert_eq!(trim_trailing_slash("http://127.0.0.1:8787/"), "http://127.0.0.1:8787");
        assert_eq!(trim_trailing_slash("http://127.0.0.1:8787"), "http://127.0.0.1:8787");
    }

    #[tokio::test]
    async fn explicit_token_wins_even_with_a_populated_identity_file() {
        let target = Target { base_url: "http://127.0.0.1:8787".into(), state_dir: None, source: TargetSource::Explicit };
        let token = resolve_token(Some("explicit-token".into()), &target).await;
        assert_eq!(token.as_deref(), Some("explicit-token"));
    }

    #[tokio::test]
    async fn falls_back_to_identity_file_when_state_dir_is_known() {
        let dir = tempfile::tempdir().unwrap();
        let identity = rd_store::identity::load_or_create(dir.path()).await.unwrap();
        let target = Target { base_url: "http://127.0.0.1:8787".into(), state_dir: Some(dir.path().to_path_buf()), source: TargetSource::Foreground };
        let token = resolve_token(None, &target).await;
        assert_eq!(token, Some(identity.token));
    }
}
