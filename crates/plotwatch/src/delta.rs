//! Index deltas between two matched observations.

use crate::types::{IndexDelta, Observation};

/// Compute baseline minus target for every index.
///
/// A positive delta means the index was higher at baseline than at target.
pub fn compute_delta(baseline: &Observation, target: &Observation) -> IndexDelta {
    IndexDelta {
        ndvi: baseline.ndvi - target.ndvi,
        ndbi: baseline.ndbi - target.ndbi,
        ndwi: baseline.ndwi - target.ndwi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(ndvi: f64, ndbi: f64, ndwi: f64) -> Observation {
        Observation {
            plot_id: "p1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ndvi,
            ndbi,
            ndwi,
        }
    }

    #[test]
    fn test_baseline_minus_target() {
        let delta = compute_delta(&obs(0.60, 0.10, -0.30), &obs(0.25, 0.40, -0.30));
        assert!((delta.ndvi - 0.35).abs() < 1e-12);
        assert!((delta.ndbi + 0.30).abs() < 1e-12);
        assert_eq!(delta.ndwi, 0.0);
    }

    #[test]
    fn test_identical_observations() {
        let a = obs(0.42, -0.1, 0.05);
        assert_eq!(compute_delta(&a, &a), IndexDelta::default());
    }
}
