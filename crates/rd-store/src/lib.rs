//! Filesystem-backed persistence for identity, daemon discovery, and
//! per-run history (spec §4.6, §3).

pub mod atomic;
pub mod error;
pub mod identity;
pub mod index;
pub mod run_dir;
pub mod runtime_descriptor;

pub use error::{Result, StoreError};
