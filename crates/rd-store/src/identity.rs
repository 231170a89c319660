//! Per-state-directory identity: runner id + bearer token (spec §3).
//! Created lazily on first serve; single writer per state directory is
//! enforced by convention (foreground and daemon use disjoint directories).

use std::path::{Path, PathBuf};

use rd_core::config::generate_token;
use rd_core::model::Identity;
use rd_core::RunnerId;

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};

pub fn identity_path(state_dir: &Path) -> PathBuf {
    state_dir.join("identity.json")
}

/// Loads the identity file if present, otherwise creates and persists a
/// fresh one. This is the only place a new identity is minted.
pub async fn load_or_create(state_dir: &Path) -> Result<Identity> {
    let path = identity_path(state_dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt { path, source })
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            let identity = Identity {
                runner_id: RunnerId::new(),
                token: generate_token(),
            };
            persist(state_dir, &identity).await?;
            Ok(identity)
        }
        Err(source) => Err(StoreError::Io { path, source }),
    }
}

/// Read-only lookup for callers that must not create one, e.g. the client
/// reading a target's identity to resolve its bearer token — the target's
/// state directory is not this process's to write into.
pub async fn read(state_dir: &Path) -> Result<Option<Identity>> {
    let path = identity_path(state_dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            serde_json::from_str(&contents).map(Some).map_err(|source| StoreError::Corrupt { path, source })
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io { path, source }),
    }
}

/// Overrides and persists the token for a state directory (spec §3: "token
/// may be explicitly overridden and persisted").
pub async fn set_token(state_dir: &Path, token: String) -> Result<Identity> {
    let mut identity = load_or_create(state_dir).await?;
    identity.token = token;
    persist(state_dir, &identity).await?;
    Ok(identity)
}

async fn persist(state_dir: &Path, identity: &Identity) -> Result<()> {
    let path = identity_path(state_dir);
    let bytes = serde_json::to_vec_pretty(identity)
        .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
    write_atomic(&path, &bytes).await
}
