//! Summary statistics over a snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::Serialize;

use crate::classify::NO_CHANGE;
use crate::snapshot::Snapshot;
use crate::types::{Axis, ChangeResult};

/// Default number of inference strings listed per axis.
pub const DEFAULT_TOP_N: usize = 5;

/// How often an inference string occurred on an axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceCount {
    pub inference: String,
    pub count: usize,
}

/// Per-axis aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisReport {
    pub axis: Axis,
    /// Results whose inference is not "No Change".
    pub changed: usize,
    /// Results whose rule evaluated to true.
    pub rule_matches: usize,
    /// Most frequent inferences, count descending then name ascending.
    pub top: Vec<InferenceCount>,
}

/// One line of the per-plot listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotEntry {
    pub request_id: String,
    pub baseline_date: chrono::NaiveDate,
    pub target_date: chrono::NaiveDate,
    pub rules_used: String,
    pub vegetation: String,
    pub construction: String,
    pub flooding: String,
}

impl From<&ChangeResult> for PlotEntry {
    fn from(r: &ChangeResult) -> Self {
        Self {
            request_id: r.request_id.clone(),
            baseline_date: r.matched_baseline_date,
            target_date: r.matched_target_date,
            rules_used: r.rules_used.clone(),
            vegetation: r.vegetation.inference.clone(),
            construction: r.construction.inference.clone(),
            flooding: r.flooding.inference.clone(),
        }
    }
}

/// Aggregate report for one snapshot. Computed from the snapshot alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub total_requests: usize,
    pub total_results: usize,
    pub error_count: usize,
    pub axes: Vec<AxisReport>,
    pub plots: BTreeMap<String, Vec<PlotEntry>>,
}

impl Report {
    /// Build a report over every result in the snapshot.
    pub fn build(snapshot: &Snapshot, top_n: usize) -> Self {
        Self::build_filtered(snapshot, top_n, None)
    }

    /// Build a report, optionally restricted to one plot.
    pub fn build_filtered(snapshot: &Snapshot, top_n: usize, plot_id: Option<&str>) -> Self {
        let results = snapshot.results_for(plot_id);

        let axes = Axis::ALL
            .iter()
            .map(|&axis| axis_report(axis, &results, top_n))
            .collect();

        let mut plots: BTreeMap<String, Vec<PlotEntry>> = BTreeMap::new();
        for r in &results {
            plots
                .entry(r.plot_id.clone())
                .or_default()
                .push(PlotEntry::from(*r));
        }

        let summary = snapshot.summary();
        Self {
            run_id: snapshot.run_id().to_string(),
            created_at: snapshot.created_at(),
            total_requests: summary.total,
            total_results: results.len(),
            error_count: summary.error_count(),
            axes,
            plots,
        }
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisReport> {
        self.axes.iter().find(|a| a.axis == axis)
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {} ({})", self.run_id, self.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(
            out,
            "  Requests: {}  Results: {}  Errors: {}",
            self.total_requests, self.total_results, self.error_count
        );

        for axis in &self.axes {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "  {}: {} changed, {} rule matches",
                axis.axis, axis.changed, axis.rule_matches
            );
            for entry in &axis.top {
                let _ = writeln!(out, "    {:<28} {}", entry.inference, entry.count);
            }
        }

        for (plot, entries) in &self.plots {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Plot {plot}:");
            for e in entries {
                let _ = writeln!(
                    out,
                    "    {} {} -> {} [{}] veg: {} | con: {} | flood: {}",
                    e.request_id,
                    e.baseline_date,
                    e.target_date,
                    e.rules_used,
                    e.vegetation,
                    e.construction,
                    e.flooding
                );
            }
        }

        out
    }
}

fn axis_report(axis: Axis, results: &[&ChangeResult], top_n: usize) -> AxisReport {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut changed = 0;
    let mut rule_matches = 0;

    for r in results {
        let outcome = r.outcome(axis);
        *counts.entry(outcome.inference.as_str()).or_default() += 1;
        if outcome.inference != NO_CHANGE {
            changed += 1;
        }
        if outcome.rule_matched {
            rule_matches += 1;
        }
    }

    let mut top: Vec<InferenceCount> = counts
        .into_iter()
        .map(|(inference, count)| InferenceCount {
            inference: inference.to_string(),
            count,
        })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.inference.cmp(&b.inference)));
    top.truncate(top_n);

    AxisReport {
        axis,
        changed,
        rule_matches,
        top,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, RunSummary};
    use crate::testing::result_with;

    fn snapshot() -> Snapshot {
        let results = vec![
            result_with("r1", "p2", "Deep Change - Increased", "No Change", "No Change"),
            result_with("r2", "p1", "Deep Change - Increased", "Slight Change - Decreased", "No Change"),
            result_with("r3", "p1", "Moderate Change - Decreased", "No Change", "No Change"),
            result_with("r4", "p3", "No Change", "No Change", "Slight Change - Increased"),
        ];
        let summary = RunSummary {
            run_id: "run-1".into(),
            total: 6,
            persisted: 4,
            skipped: 2,
            ..RunSummary::default()
        };
        Snapshot::new("run-1".into(), PipelineConfig::default(), summary, results)
    }

    #[test]
    fn test_changed_counts_per_axis() {
        let report = Report::build(&snapshot(), DEFAULT_TOP_N);
        assert_eq!(report.total_results, 4);
        assert_eq!(report.total_requests, 6);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.axis(Axis::Vegetation).unwrap().changed, 3);
        assert_eq!(report.axis(Axis::Construction).unwrap().changed, 1);
        assert_eq!(report.axis(Axis::Flooding).unwrap().changed, 1);
    }

    #[test]
    fn test_top_n_ordering() {
        let report = Report::build(&snapshot(), 2);
        let veg = report.axis(Axis::Vegetation).unwrap();
        assert_eq!(
            veg.top,
            vec![
                InferenceCount {
                    inference: "Deep Change - Increased".into(),
                    count: 2
                },
                InferenceCount {
                    inference: "Moderate Change - Decreased".into(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_plot_listing() {
        let report = Report::build(&snapshot(), DEFAULT_TOP_N);
        let plots: Vec<_> = report.plots.keys().cloned().collect();
        assert_eq!(plots, vec!["p1", "p2", "p3"]);
        let p1: Vec<_> = report.plots["p1"].iter().map(|e| e.request_id.as_str()).collect();
        assert_eq!(p1, vec!["r2", "r3"]);
    }

    #[test]
    fn test_filtered_by_plot() {
        let report = Report::build_filtered(&snapshot(), DEFAULT_TOP_N, Some("p1"));
        assert_eq!(report.total_results, 2);
        assert_eq!(report.plots.len(), 1);
        assert_eq!(report.axis(Axis::Construction).unwrap().changed, 1);
    }

    #[test]
    fn test_render_text_mentions_axes() {
        let text = Report::build(&snapshot(), DEFAULT_TOP_N).render_text();
        assert!(text.contains("vegetation: 3 changed"));
        assert!(text.contains("Plot p3:"));
    }
}
