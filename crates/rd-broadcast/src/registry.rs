//! Process-wide table of per-run broadcasters (spec §4.3, §5).
//!
//! Grounded on `ws/hub.rs`'s `WsHub`: a `DashMap` keyed registry so
//! lookups for unrelated runs never contend with each other, adapted from
//! "one entry per connected user" to "one entry per run".

use std::sync::Arc;

use dashmap::DashMap;
use rd_core::RunId;

use crate::broadcaster::RunBroadcaster;

#[derive(Default)]
pub struct BroadcastRegistry {
    runs: DashMap<RunId, Arc<RunBroadcaster>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the run's broadcaster, creating an empty one if this is the
    /// first time this run has been seen in this process.
    pub fn get_or_create(&self, run_id: RunId) -> Arc<RunBroadcaster> {
        self.runs
            .entry(run_id)
            .or_insert_with(|| Arc::new(RunBroadcaster::default()))
            .clone()
    }

    pub fn get(&self, run_id: RunId) -> Option<Arc<RunBroadcaster>> {
        self.runs.get(&run_id).map(|entry| entry.clone())
    }

    /// Drops the in-memory broadcaster for a run. Safe to call once a run
    /// is terminal and no subscribers remain attached; history still lives
    /// in `events.jsonl`/`rollup.jsonl` on disk.
    pub fn remove(&self, run_id: RunId) {
        self.runs.remove(&run_id);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_broadcaster_for_repeated_lookups() {
        let registry = BroadcastRegistry::new();
        let run_id = RunId::new();
        let a = registry.get_or_create(run_id);
        let b = registry.get_or_create(run_id);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_returns_none_for_an_unknown_run() {
        let registry = BroadcastRegistry::new();
        assert!(registry.get(RunId::new()).is_none());
    }

    #[test]
    fn remove_drops_the_entry() {
        let registry = BroadcastRegistry::new();
        let run_id = RunId::new();
        registry.get_or_create(run_id);
        assert_eq!(registry.len(), 1);
        registry.remove(run_id);
        assert!(registry.is_empty());
    }
}
