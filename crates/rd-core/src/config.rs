//! Configuration layering (ambient stack §10.3): compile-time dev-mode
//! default, overridden by environment variables, overridden again by CLI
//! flags at the call site. Grounded in the teacher's pattern of co-locating
//! a `Default` impl with environment-variable resolution.

use std::env;
use std::path::PathBuf;

const APP_NAME: &str = "codex-d";

/// Stable foreground port in production mode (spec §4.7).
pub const DEFAULT_FOREGROUND_PORT: u16 = 8787;
/// Stable foreground port in dev mode.
pub const DEFAULT_FOREGROUND_PORT_DEV: u16 = 8788;
/// `0` asks the OS for an ephemeral port, which the daemon always does
/// unless an operator pins one via `CODEX_D_DAEMON_PORT`.
pub const DEFAULT_DAEMON_PORT: u16 = 0;

pub const DEFAULT_FOREGROUND_STATE_DIR_NAME: &str = ".codex-d";
pub const DEV_STATE_DIR_SUFFIX: &str = "-dev";

/// Whether this process is running in dev mode. Environment override wins;
/// otherwise the compile-time build flag decides (spec §4.7).
pub fn dev_mode() -> bool {
    match env::var("CODEX_D_DEV_MODE") {
        Ok(v) => parse_bool_env(&v).unwrap_or(cfg!(debug_assertions)),
        Err(_) => cfg!(debug_assertions),
    }
}

fn parse_bool_env(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Runner-side config assembled by `rd-cli` from environment variables and
/// CLI flags and passed down explicitly — no global statics (spec §9's
/// "no in-process singletons" note).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub dev_mode: bool,
    pub foreground_state_dir: Option<String>,
    pub daemon_state_dir: Option<String>,
    pub foreground_port: Option<u16>,
    pub daemon_port: Option<u16>,
    pub persist_raw_events: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let dev_mode = dev_mode();
        Self {
            dev_mode,
            foreground_state_dir: env::var("CODEX_D_FOREGROUND_STATE_DIR").ok(),
            daemon_state_dir: env::var("CODEX_D_DAEMON_STATE_DIR").ok(),
            foreground_port: env::var("CODEX_D_FOREGROUND_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
            daemon_port: env::var("CODEX_D_DAEMON_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
            persist_raw_events: env::var("CODEX_D_PERSIST_RAW_EVENTS")
                .ok()
                .and_then(|v| parse_bool_env(&v))
                .unwrap_or(false),
        }
    }
}

impl RunnerConfig {
    pub fn foreground_port(&self) -> u16 {
        self.foreground_port.unwrap_or(if self.dev_mode {
            DEFAULT_FOREGROUND_PORT_DEV
        } else {
            DEFAULT_FOREGROUND_PORT
        })
    }

    pub fn daemon_port(&self) -> u16 {
        self.daemon_port.unwrap_or(DEFAULT_DAEMON_PORT)
    }

    pub fn foreground_state_dir_name(&self) -> String {
        if self.dev_mode {
            format!("{DEFAULT_FOREGROUND_STATE_DIR_NAME}{DEV_STATE_DIR_SUFFIX}")
        } else {
            DEFAULT_FOREGROUND_STATE_DIR_NAME.to_string()
        }
    }

    /// Project-local state dir used by the foreground server (spec §4.7):
    /// `<cwd>/.codex-d`, or the explicit override if one was configured.
    pub fn foreground_state_dir(&self, cwd: &std::path::Path) -> PathBuf {
        match &self.foreground_state_dir {
            Some(dir) => PathBuf::from(dir),
            None => cwd.join(self.foreground_state_dir_name()),
        }
    }

    /// Per-user state dir used by the detached daemon (spec §4.7), or the
    /// explicit override if one was configured.
    pub fn daemon_state_dir(&self) -> std::io::Result<PathBuf> {
        if let Some(dir) = &self.daemon_state_dir {
            return Ok(PathBuf::from(dir));
        }
        default_daemon_state_dir()
    }
}

/// Mirrors the teacher's `default_state_dir()`: `XDG_STATE_HOME` wins, then
/// the platform default via `dirs`, then a `~/.local/state` fallback.
fn default_daemon_state_dir() -> std::io::Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }
    if let Some(mut dir) = dirs::state_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join(APP_NAME))
        .ok_or_else(|| std::io::Error::other("unable to determine a per-user state directory"))
}

/// Client-side discovery/connection config (spec §6, §4.7).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl ClientConfig {
    /// Env-derived config, checking the primary name before its alias, as
    /// the spec requires (`CODEX_D_URL` before `CODEX_RUNNER_URL`, etc.).
    pub fn from_env() -> Self {
        Self {
            url: env::var("CODEX_D_URL")
                .ok()
                .or_else(|| env::var("CODEX_RUNNER_URL").ok()),
            token: env::var("CODEX_D_TOKEN")
                .ok()
                .or_else(|| env::var("CODEX_RUNNER_TOKEN").ok()),
        }
    }
}

/// Generates a bearer token with at least 32 bytes of URL-safe entropy
/// (spec §3: "opaque ASCII, ≥ 32 bytes of entropy, URL-safe").
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    const TOKEN_LENGTH: usize = 43;
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_has_at_least_32_bytes_of_material() {
        let token = generate_token();
        assert!(token.len() >= 32);
        assert!(token.is_ascii());
    }

    #[test]
    fn foreground_port_falls_back_to_dev_default_in_dev_mode() {
        let cfg = RunnerConfig {
            dev_mode: true,
            foreground_state_dir: None,
            daemon_state_dir: None,
            foreground_port: None,
            daemon_port: None,
            persist_raw_events: false,
        };
        assert_eq!(cfg.foreground_port(), DEFAULT_FOREGROUND_PORT_DEV);
    }

    #[test]
    fn explicit_foreground_port_overrides_the_default() {
        let cfg = RunnerConfig {
            dev_mode: false,
            foreground_state_dir: None,
            daemon_state_dir: None,
            foreground_port: Some(9000),
            daemon_port: None,
            persist_raw_events: false,
        };
        assert_eq!(cfg.foreground_port(), 9000);
    }

    #[test]
    fn foreground_state_dir_defaults_to_a_dotdir_under_cwd() {
        let cfg = RunnerConfig {
            dev_mode: false,
            foreground_state_dir: None,
            daemon_state_dir: None,
            foreground_port: None,
            daemon_port: None,
            persist_raw_events: false,
        };
        let dir = cfg.foreground_state_dir(std::path::Path::new("/tmp/project"));
        assert_eq!(dir, std::path::PathBuf::from("/tmp/project/.codex-d"));
    }

    #[test]
    fn explicit_foreground_state_dir_overrides_the_cwd_default() {
        let cfg = RunnerConfig {
            dev_mode: false,
            foreground_state_dir: Some("/var/lib/codex-d".into()),
            daemon_state_dir: None,
            foreground_port: None,
            daemon_port: None,
            persist_raw_events: false,
        };
        let dir = cfg.foreground_state_dir(std::path::Path::new("/tmp/project"));
        assert_eq!(dir, std::path::PathBuf::from("/var/lib/codex-d"));
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool_env("1"), Some(true));
        assert_eq!(parse_bool_env("true"), Some(true));
        assert_eq!(parse_bool_env("0"), Some(false));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }
}
