//! `daemon start|stop|status` (spec §4.7): self-install, detach, and
//! supervise the per-user server. Runs entirely synchronously, mirroring
//! the teacher's `fn main()` -> sync `try_main()` -> per-subcommand async
//! entry point split, so the process never forks while a multi-threaded
//! tokio runtime is live. The lock-file guard against a double start is
//! grounded on `groblegark-oddjobs`'s `lifecycle::startup_inner`: open
//! without truncating, take an exclusive `fs2` lock, only then write our
//! pid — truncating first would stomp the running daemon's pid file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use rd_core::config::RunnerConfig;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const HEALTH_POLL_TIMEOUT: Duration = Duration::from_secs(10);

fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join("daemon.lock")
}

fn version_path(install_dir: &Path) -> PathBuf {
    install_dir.join(".version")
}

/// Mirrors `default_daemon_state_dir`'s three-tier resolution, but for the
/// tree the daemon binary gets self-installed into rather than its runtime
/// state.
fn install_dir() -> std::io::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join("codex-d").join("install"));
    }
    if let Some(mut dir) = dirs::data_dir() {
        dir.push("codex-d");
        dir.push("install");
        return Ok(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join("codex-d").join("install"))
        .ok_or_else(|| std::io::Error::other("unable to determine a per-user data directory"))
}

/// Current version marker: the source-tree hash in dev mode (spec §4.7),
/// the crate version otherwise.
fn current_version_marker(dev_mode: bool) -> String {
    if dev_mode {
        option_env!("CODEX_D_SOURCE_HASH").unwrap_or(env!("CARGO_PKG_VERSION")).to_string()
    } else {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// Copies the running binary's application directory into the install dir
/// if the installed version marker is missing, stale, or `force` is set.
fn self_install(dev_mode: bool, force: bool) -> rd_core::Result<PathBuf> {
    let install_dir = install_dir().map_err(rd_core::Error::from)?;
    let current_exe = std::env::current_exe().map_err(rd_core::Error::from)?;
    let source_dir = current_exe
        .parent()
        .ok_or_else(|| rd_core::Error::DaemonInstallFailed {
            path: install_dir.display().to_string(),
            reason: "current executable has no parent directory".into(),
        })?;

    let marker = current_version_marker(dev_mode);
    let installed_marker = fs::read_to_string(version_path(&install_dir)).ok();

    if !force && installed_marker.as_deref() == Some(marker.as_str()) {
        tracing::debug!(%marker, "installed version marker matches, skipping self-install");
        return Ok(install_dir);
    }

    fs::create_dir_all(&install_dir).map_err(|err| rd_core::Error::DaemonInstallFailed {
        path: install_dir.display().to_string(),
        reason: err.to_string(),
    })?;
    copy_dir_tree(source_dir, &install_dir).map_err(|err| rd_core::Error::DaemonInstallFailed {
        path: install_dir.display().to_string(),
        reason: err.to_string(),
    })?;
    fs::write(version_path(&install_dir), &marker).map_err(|err| rd_core::Error::DaemonInstallFailed {
        path: install_dir.display().to_string(),
        reason: err.to_string(),
    })?;

    tracing::info!(install_dir = %install_dir.display(), %marker, "installed daemon binary tree");
    Ok(install_dir)
}

fn copy_dir_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dest_path)?;
            copy_dir_tree(&entry.path(), &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// Self-installs if needed, forks, and execs the installed binary into the
/// hidden `__daemon-child` subcommand, then polls `/v1/health` until it
/// answers or `HEALTH_POLL_TIMEOUT` elapses (spec §4.7).
pub fn start(force: bool) -> rd_core::Result<()> {
    let config = RunnerConfig::default();
    let state_dir = config.daemon_state_dir().map_err(rd_core::Error::from)?;
    fs::create_dir_all(&state_dir).map_err(rd_core::Error::from)?;

    let mut lock_file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(&state_dir))
        .map_err(rd_core::Error::from)?;
    if lock_file.try_lock_exclusive().is_err() {
        let probe_runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(rd_core::Error::from)?;
        if let Some(descriptor) = read_descriptor(&probe_runtime, &state_dir)? {
            if is_alive(descriptor.pid) {
                tracing::info!(pid = descriptor.pid, "daemon already running");
                return Ok(());
            }
        }
        return Err(rd_core::Error::DaemonInstallFailed {
            path: lock_path(&state_dir).display().to_string(),
            reason: "another process holds the daemon lock".into(),
        });
    }
    lock_file.set_len(0).map_err(rd_core::Error::from)?;
    writeln!(lock_file, "{}", std::process::id()).map_err(rd_core::Error::from)?;

    let installed_dir = self_install(config.dev_mode, force)?;
    let child_binary = installed_dir.join("codex-d");

    match fork::fork().map_err(|errno| rd_core::Error::Exception(format!("fork failed: errno {errno}")))? {
        fork::Fork::Parent(child_pid) => {
            drop(lock_file);
            tracing::info!(child_pid, "daemon child forked, waiting for it to become healthy");
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(rd_core::Error::from)?;
            wait_for_health(&runtime, &state_dir)
        }
        fork::Fork::Child => {
            let _ = rustix::process::setsid();
            let mut command = std::process::Command::new(&child_binary);
            command.arg("__daemon-child");
            let err = std::os::unix::process::CommandExt::exec(&mut command);
            eprintln!("failed to exec installed daemon binary {}: {err}", child_binary.display());
            std::process::exit(1);
        }
    }
}

fn read_descriptor(
    runtime: &tokio::runtime::Runtime,
    state_dir: &Path,
) -> rd_core::Result<Option<rd_core::model::DaemonRuntimeDescriptor>> {
    runtime
        .block_on(rd_store::runtime_descriptor::read(state_dir))
        .map_err(|err| rd_core::Error::Exception(err.to_string()))
}

fn is_alive(pid: u32) -> bool {
    rustix::process::test_kill_process(rustix::process::Pid::from_raw(pid as i32).expect("nonzero pid")).is_ok()
}

fn wait_for_health(runtime: &tokio::runtime::Runtime, state_dir: &Path) -> rd_core::Result<()> {
    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .map_err(|err| rd_core::Error::Exception(format!("failed to build health-check client: {err}")))?;

    let deadline = Instant::now() + HEALTH_POLL_TIMEOUT;
    while Instant::now() < deadline {
        if let Ok(Some(descriptor)) = read_descriptor(runtime, state_dir) {
            if http.get(format!("{}/v1/health", descriptor.base_url)).send().is_ok() {
                tracing::info!(base_url = %descriptor.base_url, "daemon is healthy");
                return Ok(());
            }
        }
        std::thread::sleep(HEALTH_POLL_INTERVAL);
    }

    Err(rd_core::Error::DaemonStartTimeout { waited_secs: HEALTH_POLL_TIMEOUT.as_secs() })
}

/// Graceful shutdown via `POST /v1/shutdown`, falling back to a pid kill
/// when `force` is set (spec §4.7); the runtime descriptor is removed
/// best-effort either way.
pub fn stop(force: bool) -> rd_core::Result<()> {
    let config = RunnerConfig::default();
    let state_dir = config.daemon_state_dir().map_err(rd_core::Error::from)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(rd_core::Error::from)?;
    let descriptor = read_descriptor(&runtime, &state_dir)?;

    let Some(descriptor) = descriptor else {
        return Err(rd_core::Error::ShutdownFailed { reason: "no runtime descriptor found, is the daemon running?".into() });
    };

    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|err| rd_core::Error::Exception(format!("failed to build shutdown client: {err}")))?;

    let graceful = http.post(format!("{}/v1/shutdown", descriptor.base_url)).send().map(|r| r.status().is_success()).unwrap_or(false);

    if !graceful {
        if !force {
            runtime.block_on(rd_store::runtime_descriptor::remove(&state_dir));
            return Err(rd_core::Error::ShutdownFailed { reason: "graceful shutdown request failed, retry with --force".into() });
        }
        if let Some(pid) = rustix::process::Pid::from_raw(descriptor.pid as i32) {
            let _ = rustix::process::kill_process(pid, rustix::process::Signal::Term);
        }
    }

    runtime.block_on(rd_store::runtime_descriptor::remove(&state_dir));
    Ok(())
}

/// Reports whether the descriptor names a live pid, without requiring a
/// health check (used by `daemon status`, which should work even if the
/// http server itself is wedged).
pub fn status() -> rd_core::Result<bool> {
    let config = RunnerConfig::default();
    let state_dir = config.daemon_state_dir().map_err(rd_core::Error::from)?;
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(rd_core::Error::from)?;
    let descriptor = read_descriptor(&runtime, &state_dir)?;
    Ok(descriptor.is_some_and(|d| is_alive(d.pid)))
}
