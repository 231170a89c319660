//! Derives a stable, replayable, line-oriented transcript from noisy
//! streaming agent deltas (spec §4.4).

pub mod engine;
pub mod mojibake;
pub mod summaries;

pub use engine::RollupEngine;
pub use summaries::{mine as mine_thinking_summaries, ThinkingSummary};
