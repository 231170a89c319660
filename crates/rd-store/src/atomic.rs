//! Write-tmp-then-rename helper shared by the identity file, the daemon
//! runtime descriptor, and `run.json` (spec §3, §4.6: all three are
//! rewritten atomically).

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let tmp_path = tmp_path_for(path);
    {
        let mut file =
            tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|source| StoreError::Io {
                    path: tmp_path.clone(),
                    source,
                })?;
        file.write_all(contents)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        file.sync_all().await.map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_atomic_creates_parent_dirs_and_final_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c.json");
        write_atomic(&target, b"{\"x\":1}").await.unwrap();
        let contents = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(contents, "{\"x\":1}");
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("run.json");
        write_atomic(&target, b"{}").await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["run.json".to_string()]);
    }
}
