//! Per-run event fan-out and SSE replay semantics (spec §4.3, §5).

pub mod broadcaster;
pub mod registry;
pub mod replay;

pub use broadcaster::RunBroadcaster;
pub use registry::BroadcastRegistry;
pub use replay::{replay_stream, validate_tail, ReplayItem, ReplayOptions};
