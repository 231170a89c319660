//! `<stateDir>/runs/index.jsonl` — append-only, single-writer (the run
//! manager). Readers tolerate a torn last line by skipping it (spec §4.6).

use std::path::{Path, PathBuf};

use rd_core::model::RunIndexEntry;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

pub fn index_path(state_dir: &Path) -> PathBuf {
    state_dir.join("runs").join("index.jsonl")
}

pub async fn append(state_dir: &Path, entry: &RunIndexEntry) -> Result<()> {
    let path = index_path(state_dir);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
    }
    let mut line = serde_json::to_string(entry)
        .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|source| StoreError::Io { path: path.clone(), source })?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|source| StoreError::Io { path, source })
}

/// Reads every well-formed line. A malformed or torn final line (a writer
/// crashed mid-append) is silently skipped rather than failing the read.
pub async fn read_all(state_dir: &Path) -> Result<Vec<RunIndexEntry>> {
    let path = index_path(state_dir);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::Io { path, source }),
    };

    let mut entries = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunIndexEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(%err, "skipping malformed run index line");
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rd_core::RunId;
    use tempfile::tempdir;

    fn entry() -> RunIndexEntry {
        RunIndexEntry {
            run_id: RunId::new(),
            created_at: Utc::now(),
            cwd: "/tmp/project".into(),
            relative_dir: "2026/07/abc".into(),
        }
    }

    #[tokio::test]
    async fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let e1 = entry();
        let e2 = entry();
        append(dir.path(), &e1).await.unwrap();
        append(dir.path(), &e2).await.unwrap();
        let read_back = read_all(dir.path()).await.unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].run_id, e1.run_id);
        assert_eq!(read_back[1].run_id, e2.run_id);
    }

    #[tokio::test]
    async fn read_all_skips_a_torn_last_line() {
        let dir = tempdir().unwrap();
        append(dir.path(), &entry()).await.unwrap();
        let path = index_path(dir.path());
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap();
        file.write_all(b"{\"runId\":\"not-json-after-this-poi")
            .await
            .unwrap();
        let read_back = read_all(dir.path()).await.unwrap();
        assert_eq!(read_back.len(), 1);
    }

    #[tokio::test]
    async fn read_all_on_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        assert!(read_all(dir.path()).await.unwrap().is_empty());
    }
}
