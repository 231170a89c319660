//! The daemon's discovery file (spec §3, §4.7). Owned by exactly one
//! process (the child); removal on clean shutdown is best-effort.

use std::path::{Path, PathBuf};

use rd_core::model::DaemonRuntimeDescriptor;

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};

pub fn descriptor_path(state_dir: &Path) -> PathBuf {
    state_dir.join("runtime.json")
}

pub async fn write(state_dir: &Path, descriptor: &DaemonRuntimeDescriptor) -> Result<()> {
    let path = descriptor_path(state_dir);
    let bytes = serde_json::to_vec_pretty(descriptor)
        .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
    write_atomic(&path, &bytes).await
}

pub async fn read(state_dir: &Path) -> Result<Option<DaemonRuntimeDescriptor>> {
    let path = descriptor_path(state_dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io { path, source }),
    }
}

/// Best-effort removal on clean shutdown (spec §4.7); a missing file is not
/// an error.
pub async fn remove(state_dir: &Path) {
    let path = descriptor_path(state_dir);
    if let Err(err) = tokio::fs::remove_file(&path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(?path, %err, "failed to remove daemon runtime descriptor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample() -> DaemonRuntimeDescriptor {
        DaemonRuntimeDescriptor {
            base_url: "http://127.0.0.1:54321".into(),
            listen: "127.0.0.1:54321".into(),
            port: 54321,
            pid: std::process::id(),
            started_at_utc: Utc::now(),
            state_dir: "/tmp/state".into(),
            version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn round_trips_through_write_and_read() {
        let dir = tempdir().unwrap();
        write(dir.path(), &sample()).await.unwrap();
        let read_back = read(dir.path()).await.unwrap().unwrap();
        assert_eq!(read_back.port, 54321);
    }

    #[tokio::test]
    async fn read_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        assert!(read(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_a_no_op_when_file_is_already_gone() {
        let dir = tempdir().unwrap();
        remove(dir.path()).await;
    }
}
