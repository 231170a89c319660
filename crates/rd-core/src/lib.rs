//! Shared data model, error taxonomy, and configuration for the runner
//! workspace. Every other crate depends on this one; this crate depends on
//! nothing in the workspace.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod paths;

pub use error::{ApiError, Error, Result};
pub use ids::{RunId, RunnerId};
