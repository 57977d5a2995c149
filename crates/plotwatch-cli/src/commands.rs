//! Output for the subcommands and REPL. Everything renders to a `String` so
//! callers pick stdout or stderr.

use std::fmt::Write as _;
use std::path::Path;

use plotwatch::io::read_rules_file;
use plotwatch::{ChangeResult, Report, RunSummary, Snapshot, ThresholdCatalog};

use crate::error::{CliError, CliResult};

/// Processed-vs-error summary of a run.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {}", summary.run_id);
    let _ = writeln!(out, "  Requests:  {}", summary.total);
    let _ = writeln!(out, "  Persisted: {}", summary.persisted);
    let _ = writeln!(out, "  Skipped:   {}", summary.skipped);
    let _ = writeln!(out, "  Failed:    {}", summary.failed);
    let _ = writeln!(out, "  Rejected:  {}", summary.rejected);
    if !summary.errors.is_empty() {
        let _ = writeln!(out, "  Errors:");
        for e in &summary.errors {
            let _ = writeln!(
                out,
                "    {} (plot {}) at {}: {}",
                e.request_id,
                if e.plot_id.is_empty() { "-" } else { e.plot_id.as_str() },
                e.stage,
                e.reason
            );
        }
    }
    out
}

fn render_result(out: &mut String, r: &ChangeResult) {
    let _ = writeln!(
        out,
        "{} plot {} {} -> {} [{}]",
        r.request_id, r.plot_id, r.matched_baseline_date, r.matched_target_date, r.rules_used
    );
    let _ = writeln!(
        out,
        "    delta ndvi {:+.4}  ndbi {:+.4}  ndwi {:+.4}",
        r.delta.ndvi, r.delta.ndbi, r.delta.ndwi
    );
    let _ = writeln!(out, "    vegetation:   {}", r.vegetation_inference());
    let _ = writeln!(out, "    construction: {}", r.construction_inference());
    let _ = writeln!(out, "    flooding:     {}", r.flood_inference());
}

/// Results of the current snapshot, optionally for one plot.
pub fn render_query(snapshot: &Snapshot, plot_id: Option<&str>) -> String {
    let results = snapshot.results_for(plot_id);
    let mut out = String::new();
    if results.is_empty() {
        match plot_id {
            Some(p) => {
                let _ = writeln!(out, "No results for plot {p}");
            }
            None => {
                let _ = writeln!(out, "Snapshot {} has no results", snapshot.run_id());
            }
        }
        return out;
    }
    for r in results {
        render_result(&mut out, r);
    }
    out
}

pub fn query_json(snapshot: &Snapshot, plot_id: Option<&str>) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(&snapshot.results_for(plot_id))?)
}

pub fn report_json(report: &Report) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Snapshot metadata as JSON.
pub fn info_json(path: &str, snapshot: Option<&Snapshot>) -> CliResult<String> {
    let info = match snapshot {
        Some(s) => serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "snapshot": path,
            "run_id": s.run_id(),
            "created_at": s.created_at(),
            "results": s.count(),
            "plots": s.plot_ids().len(),
            "errors": s.summary().error_count(),
            "config": s.config(),
        }),
        None => serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "snapshot": path,
            "run_id": null,
        }),
    };
    Ok(serde_json::to_string_pretty(&info)?)
}

/// Parse every rule in a rules file and list the ones that fail.
///
/// Returns the rendered listing, or [`CliError::InvalidRules`] after logging
/// each rejected rule.
pub fn validate_rules(path: &Path, default_land_type: &str) -> CliResult<String> {
    let catalog = ThresholdCatalog::with_default(read_rules_file(path)?, default_land_type)?;
    let diagnostics = catalog.diagnostics();

    let mut out = String::new();
    let _ = writeln!(out, "Rules file: {}", path.display());
    let _ = writeln!(out, "  Land types: {}", catalog.len());
    for lt in catalog.land_types() {
        let _ = writeln!(out, "    {lt}");
    }

    if diagnostics.is_empty() {
        let _ = writeln!(out, "  All rules parse.");
        return Ok(out);
    }

    for d in &diagnostics {
        tracing::error!("{} / {}: '{}': {}", d.land_type, d.axis, d.rule, d.error);
    }
    Err(CliError::InvalidRules {
        count: diagnostics.len(),
    })
}
