//! Immutable per-run result sets and the handle that publishes them.
//!
//! A run never edits the previous result set in place. It builds a complete
//! [`Snapshot`] and [`SnapshotStore::publish`] swaps it in, so readers always
//! see either the old set or the new one.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineConfig, RunSummary};
use crate::types::ChangeResult;

/// The result set of one classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    run_id: String,
    created_at: DateTime<Utc>,
    config: PipelineConfig,
    summary: RunSummary,
    results: Vec<ChangeResult>,
}

impl Snapshot {
    pub fn new(
        run_id: String,
        config: PipelineConfig,
        summary: RunSummary,
        results: Vec<ChangeResult>,
    ) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            config,
            summary,
            results,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn results(&self) -> &[ChangeResult] {
        &self.results
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    /// Results, optionally restricted to one plot, in run order.
    pub fn results_for(&self, plot_id: Option<&str>) -> Vec<&ChangeResult> {
        self.results
            .iter()
            .filter(|r| plot_id.map_or(true, |p| r.plot_id == p))
            .collect()
    }

    /// Distinct plot IDs, sorted.
    pub fn plot_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.results.iter().map(|r| r.plot_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Holds the current snapshot. Cheap to share between threads.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-loaded snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// The snapshot readers should use, if any run has completed.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn publish(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let next = Arc::new(snapshot);
        tracing::info!(
            run_id = next.run_id(),
            results = next.count(),
            "Publishing snapshot"
        );
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_result;

    fn snapshot(run: &str, results: Vec<ChangeResult>) -> Snapshot {
        Snapshot::new(
            run.to_string(),
            PipelineConfig::default(),
            RunSummary::default(),
            results,
        )
    }

    #[test]
    fn test_results_for_plot() {
        let snap = snapshot(
            "run-1",
            vec![
                sample_result("r1", "p2"),
                sample_result("r2", "p1"),
                sample_result("r3", "p2"),
            ],
        );
        assert_eq!(snap.results_for(None).len(), 3);
        let p2: Vec<_> = snap.results_for(Some("p2")).into_iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(p2, vec!["r1", "r3"]);
        assert!(snap.results_for(Some("p9")).is_empty());
        assert_eq!(snap.plot_ids(), vec!["p1", "p2"]);
    }

    #[test]
    fn test_publish_swaps_whole_snapshot() {
        let store = SnapshotStore::new();
        assert!(store.current().is_none());

        store.publish(snapshot("run-1", vec![sample_result("r1", "p1")]));
        let reader = store.current().unwrap();

        let previous = store.publish(snapshot("run-2", Vec::new())).unwrap();
        assert_eq!(previous.run_id(), "run-1");

        // A reader holding the old snapshot still sees it intact.
        assert_eq!(reader.run_id(), "run-1");
        assert_eq!(reader.count(), 1);
        assert_eq!(store.current().unwrap().run_id(), "run-2");
    }
}
