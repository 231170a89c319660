//! Per-run directory layout and file management (spec §4.6):
//! `<stateDir>/runs/<yyyy>/<mm>/<runId>/{run.json,events.jsonl,rollup.jsonl}`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use rd_core::model::{EventEnvelope, RollupRecord, RunRecord};
use rd_core::RunId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};

/// Directory for a run, relative to the state dir's `runs/` root, e.g.
/// `2026/07/<runId>`. Computed from the run's creation timestamp so listing
/// by month stays cheap as the store grows.
pub fn relative_dir(created_at: DateTime<Utc>, run_id: RunId) -> String {
    format!("{}/{:02}/{run_id}", created_at.format("%Y"), created_at.month())
}

pub fn run_dir(state_dir: &Path, created_at: DateTime<Utc>, run_id: RunId) -> PathBuf {
    state_dir.join("runs").join(relative_dir(created_at, run_id))
}

fn run_json_path(dir: &Path) -> PathBuf {
    dir.join("run.json")
}

fn events_path(dir: &Path) -> PathBuf {
    dir.join("events.jsonl")
}

fn rollup_path(dir: &Path) -> PathBuf {
    dir.join("rollup.jsonl")
}

/// Creates the run directory and writes the initial `run.json`.
pub async fn create(state_dir: &Path, record: &RunRecord) -> Result<PathBuf> {
    let dir = run_dir(state_dir, record.created_at, record.id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| StoreError::Io { path: dir.clone(), source })?;
    write_run_json(&dir, record).await?;
    Ok(dir)
}

/// Rewrites `run.json` atomically (spec §4.6: "rewritten atomically on
/// status or metadata change").
pub async fn write_run_json(dir: &Path, record: &RunRecord) -> Result<()> {
    let path = run_json_path(dir);
    let bytes = serde_json::to_vec_pretty(record)
        .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
    write_atomic(&path, &bytes).await
}

pub async fn read_run_json(dir: &Path) -> Result<RunRecord> {
    let path = run_json_path(dir);
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| StoreError::Io { path: path.clone(), source })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt { path, source })
}

/// Appends one event envelope to `events.jsonl`, only called when raw
/// persistence is enabled. Opened in append mode so a concurrent reader can
/// hold the file open without racing truncation (spec §4.6).
pub async fn append_event(dir: &Path, envelope: &EventEnvelope) -> Result<()> {
    append_jsonl(&events_path(dir), envelope).await
}

pub async fn append_rollup(dir: &Path, record: &RollupRecord) -> Result<()> {
    append_jsonl(&rollup_path(dir), record).await
}

async fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
    }
    let mut line = serde_json::to_string(value)
        .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

pub async fn read_all_events(dir: &Path) -> Result<Vec<EventEnvelope>> {
    read_all_jsonl(&events_path(dir)).await
}

pub async fn read_all_rollup(dir: &Path) -> Result<Vec<RollupRecord>> {
    read_all_jsonl(&rollup_path(dir)).await
}

/// Last `n` well-formed lines; malformed lines are skipped entirely, not
/// counted towards `n` (spec §4.6: "read the last N well-formed lines").
pub async fn tail_rollup(dir: &Path, n: usize) -> Result<Vec<RollupRecord>> {
    let mut all = read_all_rollup(dir).await?;
    if all.len() > n {
        all.drain(0..all.len() - n);
    }
    Ok(all)
}

async fn read_all_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::Io { path: path.to_path_buf(), source }),
    };
    let mut lines = BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?
    {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(value) => out.push(value),
            Err(err) => tracing::warn!(%err, path = %path.display(), "skipping malformed jsonl line"),
        }
    }
    Ok(out)
}

/// Whether any rollup records have ever been written for this run — the
/// spec's presence signal ("no rollup file is written" when unsupported).
pub async fn has_rollup(dir: &Path) -> bool {
    tokio::fs::metadata(rollup_path(dir)).await.is_ok()
}

pub async fn has_raw_events(dir: &Path) -> bool {
    tokio::fs::metadata(events_path(dir)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rd_core::model::{RollupKind, RunKind, RunStatus};
    use tempfile::tempdir;

    fn record() -> RunRecord {
        RunRecord {
            id: RunId::new(),
            created_at: Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap(),
            cwd: "/tmp/project".into(),
            prompt: "hi".into(),
            kind: RunKind::Exec,
            review: None,
            model: None,
            effort: None,
            sandbox: "read-only".into(),
            approval_policy: "never".into(),
            status: RunStatus::Running,
            thread_id: None,
            turn_id: None,
            last_notification_at: None,
            events_log_path: "events.jsonl".into(),
            rollup_log_path: "rollup.jsonl".into(),
            error: None,
        }
    }

    #[tokio::test]
    async fn create_and_read_back_run_json() {
        let state_dir = tempdir().unwrap();
        let record = record();
        let dir = create(state_dir.path(), &record).await.unwrap();
        let read_back = read_run_json(&dir).await.unwrap();
        assert_eq!(read_back.id, record.id);
        assert_eq!(read_back.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn relative_dir_buckets_by_year_and_month() {
        let dir = relative_dir(Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap(), RunId::new());
        assert!(dir.starts_with("2026/07/"));
    }

    #[tokio::test]
    async fn tail_returns_last_n_well_formed_rollup_lines() {
        let state_dir = tempdir().unwrap();
        let record = record();
        let dir = create(state_dir.path(), &record).await.unwrap();
        for i in 0..5 {
            append_rollup(
                &dir,
                &RollupRecord {
                    kind: RollupKind::OutputLine,
                    created_at: Utc::now(),
                    source: None,
                    text: Some(format!("line {i}")),
                    ends_with_newline: Some(true),
                    is_control: None,
                },
            )
            .await
            .unwrap();
        }
        let tail = tail_rollup(&dir, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text.as_deref(), Some("line 3"));
        assert_eq!(tail[1].text.as_deref(), Some("line 4"));
    }

    #[tokio::test]
    async fn has_rollup_is_false_until_first_record_written() {
        let state_dir = tempdir().unwrap();
        let record = record();
        let dir = create(state_dir.path(), &record).await.unwrap();
        assert!(!has_rollup(&dir).await);
        append_rollup(
            &dir,
            &RollupRecord {
                kind: RollupKind::AgentMessage,
                created_at: Utc::now(),
                source: None,
                text: Some("done".into()),
                ends_with_newline: None,
                is_control: None,
            },
        )
        .await
        .unwrap();
        assert!(has_rollup(&dir).await);
    }
}
