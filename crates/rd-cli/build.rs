//! Computes a hash of the workspace's source tree, exposed to `main.rs` as
//! `CODEX_D_SOURCE_HASH` and used as the dev-mode version marker in place of
//! the assembly version (spec §4.7). Hand-rolled with `DefaultHasher` rather
//! than pulling in a checksum crate: this is a narrow, build-time-only
//! concern with no runtime counterpart elsewhere in the workspace.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

fn hash_dir(dir: &Path, hasher: &mut DefaultHasher) {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|entry| entry.ok()).collect(),
        Err(_) => return,
    };
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "target") {
                continue;
            }
            hash_dir(&path, hasher);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            if let Ok(contents) = fs::read(&path) {
                path.to_string_lossy().hash(hasher);
                contents.hash(hasher);
            }
        }
    }
}

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("set by cargo");
    let workspace_root = Path::new(&manifest_dir)
        .parent()
        .and_then(Path::parent)
        .expect("rd-cli lives two levels under the workspace root");

    let mut hasher = DefaultHasher::new();
    hash_dir(&workspace_root.join("crates"), &mut hasher);
    println!("cargo:rustc-env=CODEX_D_SOURCE_HASH={:016x}", hasher.finish());

    println!("cargo:rerun-if-changed={}", workspace_root.join("crates").display());
}
