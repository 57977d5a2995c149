//! Builders shared by unit tests.

use chrono::NaiveDate;

use crate::types::{AxisOutcome, ChangeResult, IndexDelta, Observation};

pub(crate) fn sample_result(request_id: &str, plot_id: &str) -> ChangeResult {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let obs = Observation {
        plot_id: plot_id.to_string(),
        date,
        ndvi: 0.5,
        ndbi: 0.1,
        ndwi: 0.0,
    };
    let outcome = AxisOutcome {
        inference: "No Change".to_string(),
        rule_matched: false,
    };
    ChangeResult {
        request_id: request_id.to_string(),
        plot_id: plot_id.to_string(),
        matched_baseline_date: date,
        matched_target_date: date,
        baseline: obs.clone(),
        target: obs,
        delta: IndexDelta::default(),
        rules_used: "Grassland".to_string(),
        vegetation: outcome.clone(),
        construction: outcome.clone(),
        flooding: outcome,
    }
}

/// A result with the given inference on every axis.
pub(crate) fn result_with(
    request_id: &str,
    plot_id: &str,
    vegetation: &str,
    construction: &str,
    flooding: &str,
) -> ChangeResult {
    let mut r = sample_result(request_id, plot_id);
    r.vegetation.inference = vegetation.to_string();
    r.construction.inference = construction.to_string();
    r.flooding.inference = flooding.to_string();
    r
}
